//! Build output
//!
//! Human-readable progress and tool output of a build run goes to an
//! [`OutputSink`]. Several artifact tasks write to the same sink
//! concurrently; every implementation keeps each line atomic.

use colored::{Color, Colorize};
use slipway_core::{LogEntry, LogLevel};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination of build output lines
pub trait OutputSink: Send + Sync {
    /// Writes one entry
    ///
    /// # Arguments
    /// * `entry` - A single line; implementations never split or merge entries
    fn emit(&self, entry: LogEntry);
}

/// Writes colored lines to stdout, one locked write per line
pub struct ConsoleSink {
    colors: bool,
}

const SOURCE_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Magenta,
    Color::Blue,
    Color::Yellow,
    Color::Green,
    Color::BrightCyan,
];

impl ConsoleSink {
    pub fn new() -> Self {
        Self { colors: true }
    }

    /// Disables ANSI colors (e.g., when output is not a terminal)
    pub fn plain() -> Self {
        Self { colors: false }
    }

    fn format(&self, entry: &LogEntry) -> String {
        if !self.colors {
            return format!("[{}] {}", entry.source, entry.message);
        }

        let color = source_color(&entry.source);
        let prefix = format!("[{}]", entry.source).color(color);
        let message = match entry.level {
            LogLevel::Debug => entry.message.dimmed(),
            LogLevel::Info => entry.message.normal(),
            LogLevel::Warning => entry.message.yellow(),
            LogLevel::Error => entry.message.red().bold(),
        };

        format!("{} {}", prefix, message)
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn emit(&self, entry: LogEntry) {
        let line = self.format(&entry);
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
    }
}

/// Stable color per source so interleaved artifacts stay readable
fn source_color(source: &str) -> Color {
    let hash = source
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    SOURCE_COLORS[hash % SOURCE_COLORS.len()]
}

/// In-memory sink
///
/// Uses Arc<Mutex<Vec<LogEntry>>> for thread-safe access across tasks.
#[derive(Clone, Default)]
pub struct InMemorySink {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all buffered entries and clears the buffer
    pub fn drain(&self) -> Vec<LogEntry> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.drain(..).collect()
    }

    /// Messages currently buffered, in emission order
    pub fn messages(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        buffer.iter().map(|e| e.message.clone()).collect()
    }
}

impl OutputSink for InMemorySink {
    fn emit(&self, entry: LogEntry) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push(entry);
    }
}

/// Output handle of one build, tagging every line with its source
#[derive(Clone)]
pub struct BuildLog {
    sink: Arc<dyn OutputSink>,
    source: String,
}

impl BuildLog {
    /// Creates a handle writing to `sink` as `source`
    ///
    /// # Arguments
    /// * `sink` - Shared output sink
    /// * `source` - Prefix of every line, usually the image name
    pub fn new(sink: Arc<dyn OutputSink>, source: impl Into<String>) -> Self {
        Self {
            sink,
            source: source.into(),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message);
    }

    /// A line of external tool or executor output
    pub fn output(&self, line: impl Into<String>) {
        self.emit(LogLevel::Info, line);
    }

    fn emit(&self, level: LogLevel, message: impl Into<String>) {
        self.sink
            .emit(LogEntry::new(level, self.source.clone(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sink_drain() {
        let sink = InMemorySink::new();
        let log = BuildLog::new(Arc::new(sink.clone()), "app");

        log.info("Building");
        log.error("failed");

        assert_eq!(sink.messages(), vec!["Building", "failed"]);

        let entries = sink.drain();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "app");
        assert_eq!(entries[1].level, LogLevel::Error);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn test_concurrent_writers_keep_lines_whole() {
        let sink = InMemorySink::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = BuildLog::new(Arc::new(sink.clone()), format!("task-{}", i));
                std::thread::spawn(move || {
                    for n in 0..50 {
                        log.output(format!("line {}", n));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let entries = sink.drain();
        assert_eq!(entries.len(), 200);
        assert!(entries.iter().all(|e| e.message.starts_with("line ")));
    }

    #[test]
    fn test_plain_console_format() {
        let sink = ConsoleSink::plain();
        let entry = LogEntry::new(LogLevel::Info, "app", "done");
        assert_eq!(sink.format(&entry), "[app] done");
    }
}
