//! Response-processor dispatch
//!
//! Runs every enabled response processor against a captured transaction.
//! A module that errors or panics is logged and recorded in the report; the
//! remaining modules still run.

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::module::{ModuleContext, ModuleKind};
use super::registry::ModuleRegistry;
use super::sink::AlertSink;
use crate::error::ModuleError;
use crate::http::Transaction;

/// How a single module invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    Completed,
    Failed(String),
    Panicked(String),
}

/// Outcome of one module for one transaction
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    pub module: String,
    pub status: ModuleStatus,
    pub elapsed: Duration,
    pub alerts: usize,
    pub over_budget: bool,
}

/// Everything that happened while dispatching one transaction
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub transaction_id: uuid::Uuid,
    pub outcomes: Vec<ModuleOutcome>,
}

impl DispatchReport {
    pub fn alerts(&self) -> usize {
        self.outcomes.iter().map(|o| o.alerts).sum()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status != ModuleStatus::Completed)
            .count()
    }
}

/// Routes transactions to response processors and their alerts to the sink
pub struct Dispatcher {
    registry: Arc<RwLock<ModuleRegistry>>,
    sink: Arc<dyn AlertSink>,
    module_budget: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RwLock<ModuleRegistry>>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            registry,
            sink,
            module_budget: None,
        }
    }

    /// Flag module invocations that run longer than `budget`
    pub fn with_module_budget(mut self, budget: Option<Duration>) -> Self {
        self.module_budget = budget;
        self
    }

    pub fn registry(&self) -> &Arc<RwLock<ModuleRegistry>> {
        &self.registry
    }

    /// Run every enabled response processor against `transaction`, in registration order
    pub fn dispatch(&self, transaction: &Arc<Transaction>) -> DispatchReport {
        // Registry lock is not held while modules run
        let modules = self.registry.read().modules_of_kind(ModuleKind::ResponseProcessor);

        let mut outcomes = Vec::with_capacity(modules.len());

        for module in modules {
            let name = module.descriptor().name.as_str();
            let ctx = ModuleContext::new(name, transaction, self.sink.as_ref());

            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| module.run(&ctx)));
            let elapsed = started.elapsed();

            let status = match result {
                Ok(Ok(())) => ModuleStatus::Completed,
                Ok(Err(e)) => {
                    tracing::warn!(
                        module = name,
                        transaction = %transaction.id(),
                        error = %e,
                        "Error running module"
                    );
                    ModuleStatus::Failed(e.to_string())
                }
                Err(payload) => {
                    let err = ModuleError::Panicked {
                        module: name.to_string(),
                        message: panic_message(payload.as_ref()),
                    };
                    tracing::error!(
                        module = name,
                        transaction = %transaction.id(),
                        error = %err,
                        "Module panicked"
                    );
                    ModuleStatus::Panicked(err.to_string())
                }
            };

            let over_budget = self.module_budget.map(|b| elapsed > b).unwrap_or(false);
            if over_budget {
                tracing::warn!(
                    module = name,
                    transaction = %transaction.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Module exceeded its time budget"
                );
            }

            outcomes.push(ModuleOutcome {
                module: name.to_string(),
                status,
                elapsed,
                alerts: ctx.alerts_published(),
                over_budget,
            });
        }

        tracing::trace!(
            transaction = %transaction.id(),
            resource = transaction.uri(),
            modules = outcomes.len(),
            "Dispatched transaction"
        );

        DispatchReport {
            transaction_id: transaction.id(),
            outcomes,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
