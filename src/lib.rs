// src/lib.rs

pub mod config;
pub mod constants;
pub mod error;
pub mod error_tracking; // Tolerated-failure bookkeeping (client topology)
pub mod index; // Post-run index aggregation
pub mod keygen;
pub mod metrics;
pub mod pool; // Bounded worker pool, the injection engine
pub mod request;
pub mod results;
pub mod size_parser;
pub mod transport;
pub mod workload;

pub use error::InjectError;
