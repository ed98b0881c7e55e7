//! Session scoped logging.
//!
//! Components do not log through the global facade directly; they receive an
//! [`EventLog`] that owns the sink and the target every record is tagged with. The
//! binary hands out one backed by [`GlobalSink`], tests plug in their own [`log::Log`].
use std::{fmt, sync::Arc};

use log::{Level, Log, Metadata, Record};

/// Forwards records to whatever logger is installed behind the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalSink;

impl Log for GlobalSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn Log>,
    target: String,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl EventLog {
    pub fn new(sink: Arc<dyn Log>, agency: u8) -> Self {
        Self {
            sink,
            target: format!("tombola::agency-{agency}"),
        }
    }

    /// Log backed by the process-wide logger.
    pub fn global(agency: u8) -> Self {
        Self::new(Arc::new(GlobalSink), agency)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder()
            .level(level)
            .target(&self.target)
            .build();
        if !self.sink.enabled(&metadata) {
            return;
        }

        self.sink.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path(Some(module_path!()))
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args)
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }

    pub fn flush(&self) {
        self.sink.flush()
    }
}
