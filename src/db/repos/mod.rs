pub mod column;
pub mod file;
pub mod poll;
pub mod project;
pub mod task;
pub mod thread;
