pub mod app_config;
pub mod datasets;

pub use app_config::*;
pub use datasets::*;
