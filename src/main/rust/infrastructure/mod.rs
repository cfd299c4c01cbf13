pub mod engine;
pub mod host;
pub mod http;
pub mod metrics;
pub mod network;
