pub mod api;
pub mod discussion;
pub mod render;
pub mod segmenter;
pub mod thread;
pub mod workspace;
