use std::{
    io::Write,
    sync::{Mutex, PoisonError},
};

use log::Log;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[cfg(test)]
use mockall::automock;

/// Longest line written to the console, newline included
pub const LINE_MAX: usize = 512 - 4;

/// Where log lines end up (UART0 on the board)
#[cfg_attr(test, automock)]
pub trait ConsoleSink: Send {
    fn write_line(&mut self, line: &[u8]);
}

/// Writes to the process stdout, which ESP-IDF routes to UART0
#[derive(Default)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write_line(&mut self, line: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        // Nowhere to report a failed log write
        let _ = stdout.write_all(line).and_then(|_| stdout.flush());
    }
}

/// Formats a record and clamps it into a single console line
pub fn format_line(now: OffsetDateTime, record: &log::Record) -> String {
    let timestamp = now.format(&Rfc3339).unwrap_or_default();
    let mut line = format!(
        "{} [{}:{}] {}",
        timestamp,
        record.level(),
        record.target(),
        record.args()
    );
    truncate_line(&mut line);
    line
}

fn truncate_line(line: &mut String) {
    while line.ends_with('\n') {
        line.pop();
    }
    if line.len() > LINE_MAX - 1 {
        let mut end = LINE_MAX - 1;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        line.truncate(end);
    }
    line.push('\n');
}

/// Normalises a raw buffer handed over by the system log service. Buffers
/// shorter than two bytes carry no message.
pub fn normalize_line(buffer: &str) -> Option<String> {
    if buffer.len() < 2 {
        return None;
    }
    let mut line = buffer.to_string();
    truncate_line(&mut line);
    Some(line)
}

/// `log` backend writing one line per record. Lines from concurrent tasks
/// are never interleaved.
pub struct ConsoleLogger<S: ConsoleSink> {
    sink: Mutex<S>,
    level: log::LevelFilter,
}

impl<S: ConsoleSink> ConsoleLogger<S> {
    pub fn new(sink: S, level: log::LevelFilter) -> Self {
        Self {
            sink: Mutex::new(sink),
            level,
        }
    }

    /// Entry point for an external log service (HiLog) that formats its own
    /// lines and only needs them clamped and serialised with ours
    pub fn write_raw(&self, buffer: &str) {
        if let Some(line) = normalize_line(buffer) {
            self.write(line.as_bytes());
        }
    }

    fn write(&self, line: &[u8]) {
        // A task that panicked mid-write must not silence everyone else
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_line(line);
    }
}

impl ConsoleLogger<StdoutSink> {
    /// Installs a stdout logger as the global `log` backend
    pub fn install(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(Self::new(StdoutSink, level)))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl<S: ConsoleSink> Log for ConsoleLogger<S> {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(OffsetDateTime::now_utc(), record);
        self.write(line.as_bytes());
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;

    fn record_line(msg: &str) -> String {
        format_line(
            datetime!(2022-06-01 12:00 UTC),
            &log::Record::builder()
                .level(log::Level::Info)
                .target("watchdog")
                .args(format_args!("{}", msg))
                .build(),
        )
    }

    #[test]
    fn formats_records() {
        assert_eq!(
            record_line("started"),
            "2022-06-01T12:00:00Z [INFO:watchdog] started\n"
        );
    }

    #[test]
    fn long_records_are_truncated() {
        let line = record_line(&"x".repeat(1000));
        assert_eq!(line.len(), LINE_MAX);
        assert!(line.ends_with("x\n"));
    }

    #[test]
    fn truncates_on_char_boundaries() {
        let line = record_line(&"ñ".repeat(600));
        assert!(line.len() <= LINE_MAX);
        assert!(line.ends_with("ñ\n"));
    }

    #[test]
    fn normalizes_raw_lines() {
        assert_eq!(normalize_line(""), None);
        assert_eq!(normalize_line("x"), None);
        assert_eq!(normalize_line("ok"), Some("ok\n".to_string()));
        assert_eq!(normalize_line("ok\n\n"), Some("ok\n".to_string()));
    }

    #[test]
    fn filters_by_level() {
        let mut sink = MockConsoleSink::new();
        sink.expect_write_line()
            .withf(|line: &[u8]| line.ends_with(b"[WARN:board] low battery\n"))
            .once()
            .return_const(());

        let logger = ConsoleLogger::new(sink, log::LevelFilter::Warn);
        logger.log(
            &log::Record::builder()
                .level(log::Level::Info)
                .target("board")
                .args(format_args!("ignored"))
                .build(),
        );
        logger.log(
            &log::Record::builder()
                .level(log::Level::Warn)
                .target("board")
                .args(format_args!("low battery"))
                .build(),
        );
    }

    #[test]
    fn raw_writes_go_through_the_sink() {
        let mut sink = MockConsoleSink::new();
        sink.expect_write_line()
            .with(function(|line: &[u8]| line == b"hilog\n"))
            .once()
            .return_const(());

        let logger = ConsoleLogger::new(sink, log::LevelFilter::Info);
        logger.write_raw("hilog");
        logger.write_raw("");
    }

    struct SharedSink(Arc<Mutex<Vec<String>>>);

    impl ConsoleSink for SharedSink {
        fn write_line(&mut self, line: &[u8]) {
            self.0
                .lock()
                .unwrap()
                .push(String::from_utf8(line.to_vec()).unwrap());
        }
    }

    #[test]
    fn lines_from_threads_do_not_interleave() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = Arc::new(ConsoleLogger::new(
            SharedSink(lines.clone()),
            log::LevelFilter::Info,
        ));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        logger.write_raw(&format!("thread {t} line {i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| l.starts_with("thread ") && l.ends_with('\n')));
    }
}
