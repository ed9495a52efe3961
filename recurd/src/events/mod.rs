//! Loop outcome reporting
//!
//! Every loop cycle produces an [`IterationRecord`] that is handed to an
//! injectable [`OutcomeSink`]. Sinks can log through tracing, append to a JSONL
//! file, collect in memory, or fan out to several of these.

mod logger;
mod sink;
mod types;

pub use logger::{JsonlSink, read_records};
pub use sink::{FanoutSink, MemorySink, OutcomeSink, TracingSink};
pub use types::{IterationRecord, Outcome};
