pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod http;
pub mod observability;
pub mod server;
pub mod storage;
pub mod worker;
