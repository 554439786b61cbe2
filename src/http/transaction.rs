//! Captured request/response transactions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use uuid::Uuid;

use super::{Request, Response};

/// An immutable request/response pair handed to scan modules
///
/// Shared between modules as `Arc<Transaction>`; there are no mutating accessors.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: Uuid,
    request: Request,
    response: Response,
}

impl Transaction {
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            response,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Request URI exactly as captured
    pub fn uri(&self) -> &str {
        &self.request.url
    }

    /// Host of the request URI, with the port when one is given
    pub fn host(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.request.url).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}

/// One line of a capture file
#[derive(Debug, Serialize, Deserialize)]
struct CapturedExchange {
    request: CapturedRequest,
    #[serde(default)]
    response: CapturedResponse,
}

#[derive(Debug, Serialize, Deserialize)]
struct CapturedRequest {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CapturedResponse {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl From<CapturedExchange> for Transaction {
    fn from(exchange: CapturedExchange) -> Self {
        let mut request = Request::new(&exchange.request.method, &exchange.request.url);
        request.headers = exchange.request.headers;
        request.body = exchange.request.body;

        let response = Response {
            status: exchange.response.status,
            status_text: exchange.response.status_text,
            headers: exchange.response.headers,
            body: exchange.response.body.map(String::into_bytes).unwrap_or_default(),
        };

        Transaction::new(request, response)
    }
}

/// Read captured transactions, one JSON object per line
///
/// Blank lines are ignored. Lines that fail to parse are logged and skipped.
pub fn read_transactions<R: BufRead>(reader: R) -> std::io::Result<Vec<Transaction>> {
    let mut transactions = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<CapturedExchange>(trimmed) {
            Ok(exchange) => transactions.push(Transaction::from(exchange)),
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping malformed capture line");
            }
        }
    }

    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_transactions_skips_bad_lines() {
        let input = concat!(
            r#"{"request":{"method":"get","url":"https://example.com/"},"#,
            r#""response":{"status":200,"body":"<html></html>"}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"request":{"url":"https://example.com/empty"}}"#,
            "\n",
        );

        let transactions = read_transactions(Cursor::new(input)).unwrap();
        assert_eq!(transactions.len(), 2);

        assert_eq!(transactions[0].request().method, "GET");
        assert_eq!(transactions[0].uri(), "https://example.com/");
        assert_eq!(transactions[0].response().body_text(), "<html></html>");

        assert_eq!(transactions[1].uri(), "https://example.com/empty");
        assert!(!transactions[1].response().has_body());
    }

    #[test]
    fn test_host_keeps_explicit_port() {
        let host = |url: &str| {
            Transaction::new(Request::new("GET", url), Response::default()).host()
        };

        assert_eq!(host("https://Example.com/a?b=c").as_deref(), Some("example.com"));
        assert_eq!(host("http://10.0.0.5:8080/").as_deref(), Some("10.0.0.5:8080"));
        assert!(host("/relative").is_none());
    }

    #[test]
    fn test_transactions_get_distinct_ids() {
        let a = Transaction::new(Request::new("GET", "/a"), Response::default());
        let b = Transaction::new(Request::new("GET", "/a"), Response::default());
        assert_ne!(a.id(), b.id());
    }
}
