//! `tracing_subscriber` integration.
//!
//! ```ignore
//! let writer = RotatingWriter::new(config)?;
//! tracing_subscriber::fmt().with_writer(writer).init();
//! ```

use std::sync::Arc;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

use crate::writer::RotatingWriter;

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = &'a RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

/// Routes `DEBUG` and `TRACE` events to a separate rotating file, everything
/// else to the main one. Each side keeps its own size, day, and retention.
#[derive(Clone)]
pub struct LevelSplitWriter {
    main: Arc<RotatingWriter>,
    debug: Arc<RotatingWriter>,
}

impl LevelSplitWriter {
    pub fn new(main: Arc<RotatingWriter>, debug: Arc<RotatingWriter>) -> Self {
        Self { main, debug }
    }

    pub fn main(&self) -> &RotatingWriter {
        &self.main
    }

    pub fn debug(&self) -> &RotatingWriter {
        &self.debug
    }

    fn route(&self, level: &Level) -> &RotatingWriter {
        if *level == Level::DEBUG || *level == Level::TRACE {
            &self.debug
        } else {
            &self.main
        }
    }
}

impl<'a> MakeWriter<'a> for LevelSplitWriter {
    type Writer = &'a RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        &self.main
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.route(meta.level())
    }
}
