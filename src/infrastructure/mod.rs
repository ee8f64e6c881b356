pub mod config;
pub mod defaults;
pub mod error;
pub mod resolver;
pub mod sinks;
pub mod source_client;
pub mod storage;
pub mod store;
