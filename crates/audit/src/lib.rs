//! Audit trail for the commerce engine.
//!
//! Services describe what happened as an [`AuditRecord`] and hand it to an
//! [`AuditDispatcher`], which forwards it to an [`AuditSink`] on a background
//! task. Emitting never blocks and never fails the caller.

pub mod dispatcher;
pub mod error;
pub mod record;
pub mod sink;

pub use dispatcher::AuditDispatcher;
pub use error::{AuditError, Result};
pub use record::{AuditAction, AuditRecord};
pub use sink::{AuditSink, InMemoryAuditLog, TracingAuditSink};
