//! Samarth: a chat assistant answering rainfall and crop production
//! questions from India's open-data portal and local crop snapshots.

pub mod actions;
pub mod chat;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod nlu;
pub mod processor;
pub mod server;
pub mod storage;
