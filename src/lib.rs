//! Library crate for scan-console-rs: request building, the scan job
//! lifecycle state machine, and its async driver over the scanner HTTP API.
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod log;
pub mod machine;
pub mod ports;
pub mod report;
pub mod request;
pub mod types;
pub mod view;
