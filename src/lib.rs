pub mod cache;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod enrichment;
pub mod error;
pub mod extract;
pub mod isbn;
pub mod logging;
pub mod resolver;
pub mod server;
pub mod staleness;
pub mod store;
pub mod webhook;
