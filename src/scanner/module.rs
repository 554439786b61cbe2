//! Scan module contract

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use super::alerts::Alert;
use super::sink::AlertSink;
use crate::error::ModuleError;
use crate::http::Transaction;

/// Category a module is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Runs once for every captured response
    ResponseProcessor,
    /// Per-path injection module, driven by the crawler rather than response dispatch
    Basic,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::ResponseProcessor => "response-processor",
            ModuleKind::Basic => "basic",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry metadata for a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module name, also used as the alert source
    pub name: String,

    /// Human readable title
    pub title: String,

    /// Module category
    #[serde(rename = "type")]
    pub kind: ModuleKind,
}

impl ModuleDescriptor {
    pub fn new(name: &str, title: &str, kind: ModuleKind) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            kind,
        }
    }

    pub fn response_processor(name: &str, title: &str) -> Self {
        Self::new(name, title, ModuleKind::ResponseProcessor)
    }
}

/// A unit of scan logic invoked by the dispatcher
///
/// Implementations must not keep per-transaction state on `self`: the same
/// instance may run for different transactions on several workers at once.
pub trait ScanModule: Send + Sync {
    /// Module metadata
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Inspect one transaction, publishing alerts through the context
    fn run(&self, ctx: &ModuleContext<'_>) -> Result<(), ModuleError>;
}

/// Everything a module sees during one invocation
pub struct ModuleContext<'a> {
    module: &'a str,
    transaction: &'a Arc<Transaction>,
    sink: &'a dyn AlertSink,
    published: Cell<usize>,
}

impl<'a> ModuleContext<'a> {
    pub fn new(
        module: &'a str,
        transaction: &'a Arc<Transaction>,
        sink: &'a dyn AlertSink,
    ) -> Self {
        Self {
            module,
            transaction,
            sink,
            published: Cell::new(0),
        }
    }

    /// Name of the module being run
    pub fn module_name(&self) -> &str {
        self.module
    }

    pub fn transaction(&self) -> &Arc<Transaction> {
        self.transaction
    }

    /// Hand an alert to the sink
    ///
    /// Sink failures are logged here and never reach the module.
    pub fn publish_alert(&self, alert: Alert) {
        tracing::debug!(
            module = self.module,
            resource = alert.resource(),
            "Publishing alert"
        );

        match self.sink.record(alert) {
            Ok(()) => self.published.set(self.published.get() + 1),
            Err(e) => tracing::error!(
                module = self.module,
                transaction = %self.transaction.id(),
                error = %e,
                "Alert sink rejected alert"
            ),
        }
    }

    /// Number of alerts accepted by the sink so far
    pub fn alerts_published(&self) -> usize {
        self.published.get()
    }
}
