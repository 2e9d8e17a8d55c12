pub mod compactor;
pub mod config;
pub mod engine;
pub mod http;
pub mod legacy;
pub mod limits;
pub mod model;
pub mod observability;
pub mod password;
pub mod service;
pub mod wal;
