//! Durable delivery of structured log records to a remote collector.
//!
//! Attach a [`SpoolMakeWriter`] to a JSON `tracing_subscriber` layer; every
//! formatted record is handed to a [`LogSpooler`] task, which POSTs it to the
//! collector and parks anything undeliverable in a local spool file until
//! the collector comes back.

mod spool;
mod writer;

pub use spool::{LogSpooler, SpoolConfig, SpoolError, SpoolHandle};
pub use writer::SpoolMakeWriter;
