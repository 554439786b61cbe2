//! Scan alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::http::Transaction;

/// Severity level for alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

/// An alert raised by a scan module
///
/// Built by the module, then handed to an alert sink. Once built there is no
/// way to modify it.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    id: Uuid,
    source_module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    severity: Severity,
    resource: String,
    fields: BTreeMap<String, String>,
    transaction_id: Uuid,
    #[serde(skip)]
    transaction: Arc<Transaction>,
    timestamp: DateTime<Utc>,
}

impl Alert {
    /// Start building an alert for a transaction
    ///
    /// The resource defaults to the transaction's request URI.
    pub fn builder(source_module: &str, transaction: &Arc<Transaction>) -> AlertBuilder {
        AlertBuilder {
            source_module: source_module.to_string(),
            key: None,
            severity: Severity::Informational,
            resource: transaction.uri().to_string(),
            fields: BTreeMap::new(),
            transaction: Arc::clone(transaction),
        }
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    /// Deduplication key; a `DedupeSink` keeps only the first alert per key
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    /// The originating transaction, for drill-down
    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }
}

/// Builder for [`Alert`]
#[derive(Debug)]
pub struct AlertBuilder {
    source_module: String,
    key: Option<String>,
    severity: Severity,
    resource: String,
    fields: BTreeMap<String, String>,
    transaction: Arc<Transaction>,
}

impl AlertBuilder {
    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn message(self, message: impl Into<String>) -> Self {
        self.field("message", message)
    }

    pub fn build(self) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            source_module: self.source_module,
            key: self.key,
            severity: self.severity,
            resource: self.resource,
            fields: self.fields,
            transaction_id: self.transaction.id(),
            transaction: self.transaction,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};

    fn transaction() -> Arc<Transaction> {
        Arc::new(Transaction::new(
            Request::new("GET", "https://example.com/about?x=1"),
            Response::new(200, "<html></html>"),
        ))
    }

    #[test]
    fn test_builder_defaults_resource_to_request_uri() {
        let tx = transaction();
        let alert = Alert::builder("vinfo-metatags", &tx)
            .field("output", "<meta name=\"author\" content=\"x\">\n")
            .build();

        assert_eq!(alert.resource(), "https://example.com/about?x=1");
        assert_eq!(alert.transaction_id(), tx.id());
        assert!(Arc::ptr_eq(alert.transaction(), &tx));
        assert_eq!(alert.severity(), Severity::Informational);
        assert!(alert.field("output").is_some());
    }

    #[test]
    fn test_serialized_alert_omits_transaction_body() {
        let tx = transaction();
        let alert = Alert::builder("vinfo-metatags", &tx).message("hello").build();
        let json = serde_json::to_value(&alert).unwrap();

        assert_eq!(json["source_module"], "vinfo-metatags");
        assert_eq!(json["fields"]["message"], "hello");
        assert_eq!(json["transaction_id"], tx.id().to_string());
        assert!(json.get("transaction").is_none());
        assert!(json.get("key").is_none());
    }
}
