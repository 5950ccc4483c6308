pub mod alignment_error;
pub mod color_correction;
pub mod frame_aligner;
pub mod frame_warper;
pub mod reference_state;
pub mod similarity_transform;
