//! HTTP capture types
//!
//! Requests, responses and the immutable transactions that pair them
//! for the response-processing pipeline.

mod request;
mod response;
mod transaction;

pub use request::Request;
pub use response::Response;
pub use transaction::{read_transactions, Transaction};
