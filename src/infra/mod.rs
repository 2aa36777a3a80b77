pub mod fs_resource_store;
pub mod json_file_emitter;
