pub mod threaded_align_executor;
