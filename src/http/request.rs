//! HTTP request types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Captured HTTP request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method
    pub method: String,

    /// Request URI exactly as captured
    pub url: String,

    /// Request headers
    pub headers: HashMap<String, String>,

    /// Request body
    pub body: Option<String>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            headers: HashMap::new(),
            body: None,
        }
    }
}

impl Request {
    /// Create a new request
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_method() {
        let request = Request::new("post", "https://example.com/login");
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://example.com/login");
        assert!(request.headers.is_empty());
        assert!(request.body.is_none());
    }
}
