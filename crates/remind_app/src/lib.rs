pub mod app;
pub mod file_store;
pub mod host;
