//! Size- and day-bounded rotating log sink with background retention.
//!
//! - [`writer`]: [`RotatingWriter`]: append, rotate, close
//! - [`namer`]: collision-free backup names
//! - [`retention`]: scan, classify, and apply retention
//! - [`compaction`]: single-flight background pass scheduler
//! - [`compress`]: gzip / xz / external compressors
//! - [`make_writer`]: `tracing_subscriber` adapters

pub mod compaction;
pub mod compress;
mod error;
pub mod make_writer;
pub mod namer;
pub mod retention;
pub mod writer;

pub use compaction::CompactionWorker;
pub use compress::{compressor_for, CommandCompressor, Compressor, GzipCompressor, XzCompressor};
pub use error::RotateError;
pub use make_writer::LevelSplitWriter;
pub use namer::Namer;
pub use retention::{run_pass, BackupRecord, RetentionPlan, RetentionReport};
pub use writer::{RotatingWriter, RotatingWriterBuilder};
