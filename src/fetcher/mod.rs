pub mod downloader;
pub mod open_data_client;

pub use downloader::*;
pub use open_data_client::*;
