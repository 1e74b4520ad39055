pub mod types;
pub mod sha;
pub mod wire;
pub mod cl_kernels;
pub mod compute;
pub mod gpu;
pub mod cpu;
pub mod connection;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod error_handling;
pub mod orchestrator;
