pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod logging;
pub mod metrics_push;
pub mod pipeline;
pub mod publisher;
pub mod storage;
pub mod types;
