pub mod align_executor;
pub mod align_frames_use_case;
pub mod infrastructure;
pub mod pipeline_logger;
pub mod select_frames_use_case;
