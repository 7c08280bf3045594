pub mod local_loader;
pub mod storage_manager;

pub use local_loader::*;
pub use storage_manager::*;
