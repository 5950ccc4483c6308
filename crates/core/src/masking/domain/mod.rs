pub mod convex_hull;
pub mod face_mask;
mod gaussian;
