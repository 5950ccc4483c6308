pub mod alignment;
pub mod config;
pub mod dedup;
pub mod detection;
pub mod io;
pub mod masking;
pub mod pipeline;
pub mod selection;
pub mod shared;
