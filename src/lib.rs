pub mod config;
pub mod countdown;
pub mod handler;
pub mod http;
pub mod model;
pub mod server;
pub mod store;
