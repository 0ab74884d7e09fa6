pub mod analytics;
pub mod codec;
pub mod config;
pub mod models;
pub mod pagination;
pub mod storage;
