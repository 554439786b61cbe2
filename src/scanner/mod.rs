//! Response-processing scanner
//!
//! Scan modules are registered in a [`ModuleRegistry`]; the [`Dispatcher`]
//! runs every enabled response processor against each captured transaction
//! and routes the alerts they raise to an [`AlertSink`].

mod alerts;
mod dispatcher;
mod engine;
mod module;
mod registry;
pub mod modules;
pub mod sink;

pub use alerts::{Alert, AlertBuilder, Severity};
pub use dispatcher::{DispatchReport, Dispatcher, ModuleOutcome, ModuleStatus};
pub use engine::{ScanEngine, ScanProgress, ScanState};
pub use module::{ModuleContext, ModuleDescriptor, ModuleKind, ScanModule};
pub use registry::ModuleRegistry;
pub use sink::{AlertSink, ChannelSink, DedupeSink, JsonLinesSink, MemorySink};
