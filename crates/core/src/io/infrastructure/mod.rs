pub mod file_list;
pub mod image_file_reader;
pub mod image_file_writer;
pub mod input_files;
pub mod reference_landmarks;
