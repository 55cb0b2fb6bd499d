//! Logging backends for the engine.
//!
//! The engine itself only emits records through the `log` crate facade. Two
//! backends are provided for hosts to install:
//!
//! - [`TermLogger`] - writes records to stderr, suitable for demo binaries
//!   and local debugging.
//! - [`ChannelLogger`] - forwards records over a crossbeam channel so a test
//!   (or a UI thread) can inspect diagnostics after the fact.

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{Level, LevelFilter, Metadata, Record};

/// A minimal stderr logger with a static level filter.
pub struct TermLogger {
    level: LevelFilter,
}

impl TermLogger {
    /// Install a `TermLogger` as the global logger. Safe to call more than
    /// once; only the first call wins.
    pub fn init(level: LevelFilter) {
        if log::set_boxed_logger(Box::new(TermLogger { level })).is_ok() {
            log::set_max_level(level);
        }
    }
}

impl log::Log for TermLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:5} [{}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// A captured log record.
#[derive(Debug)]
pub struct LogMessage {
    pub level: Level,
    pub message: String,
}

/// A logger that forwards records over a channel instead of writing them.
///
/// The receiving side decides what to do with the messages; if the channel
/// backs up, records are dropped rather than blocking the logging thread.
pub struct ChannelLogger {
    sender: Sender<LogMessage>,
    capture: Level,
}

impl ChannelLogger {
    pub fn new(sender: Sender<LogMessage>, capture: Level) -> Self {
        Self { sender, capture }
    }

    /// Create a logger capturing up to `Debug` together with the receiver
    /// for its records.
    pub fn with_receiver() -> (Self, Receiver<LogMessage>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender, Level::Debug), receiver)
    }
}

impl log::Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.capture
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = self.sender.try_send(LogMessage {
                level: record.metadata().level(),
                message: format!("{}", record.args()),
            });
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn channel_logger_forwards_records() {
        // Given
        let (logger, receiver) = ChannelLogger::with_receiver();

        // When
        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("entity pool exhausted"))
                .build(),
        );

        // Then
        let message = receiver.try_recv().unwrap();
        assert_eq!(message.level, Level::Warn);
        assert_eq!(message.message, "entity pool exhausted");
    }

    #[test]
    fn channel_logger_filters_trace() {
        // Given
        let (logger, receiver) = ChannelLogger::with_receiver();

        // When
        logger.log(
            &Record::builder()
                .level(Level::Trace)
                .args(format_args!("noise"))
                .build(),
        );

        // Then - Trace is below the capture threshold
        assert!(receiver.try_recv().is_err());
    }
}
