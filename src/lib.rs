//! Vantage - Response-processing pipeline for web security scanning
//!
//! Captured HTTP transactions are dispatched to registered response-processor
//! modules, which inspect them read-only and raise alerts into a sink.

pub mod app;
pub mod error;
pub mod http;
pub mod scanner;

pub use error::*;
