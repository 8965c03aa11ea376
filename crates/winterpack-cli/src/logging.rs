//! Subscriber setup: stderr for warnings, a compact line-per-event log file
//! under the data directory, and a filter the `debugEnabled` setting can
//! raise at runtime.
//!
//! The data directory is only known after probing, so file entries emitted
//! before [`LogFile::attach`] are held in memory and flushed on attach.
//! Once the file grows past its size cap it is moved to `launcher.log.1`,
//! replacing the previous generation.

use anyhow::Context as _;
use std::collections::VecDeque;
use std::fmt::{Debug, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber, warn};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

pub const LOG_DIR_NAME: &str = "logs";
pub const LOG_FILE_NAME: &str = "launcher.log";
/// Size at which `launcher.log` is rotated.
pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const PENDING_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    pub target: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// `HH:MM:SS LEVEL target message | k=v ...`, extra fields sorted by
    /// name.
    pub fn format_compact(&self) -> String {
        let mut message = "";
        let mut extras: Vec<&(String, String)> = Vec::new();
        for field in &self.fields {
            if field.0 == "message" {
                message = &field.1;
            } else {
                extras.push(field);
            }
        }
        extras.sort_by(|a, b| a.0.cmp(&b.0));

        let mut line = format!(
            "{} {:<5} {} {}",
            self.timestamp, self.level, self.target, message
        );
        for (index, (name, value)) in extras.into_iter().enumerate() {
            let separator = if index == 0 { " | " } else { " " };
            let _ = write!(line, "{separator}{name}={value}");
        }
        line
    }
}

struct LogSink {
    file: Option<File>,
    path: Option<PathBuf>,
    written: u64,
    max_bytes: u64,
    pending: VecDeque<String>,
}

impl LogSink {
    fn append(&mut self, line: &str) -> anyhow::Result<()> {
        let len = line.len() as u64 + 1;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        writeln!(file, "{line}").context("write log file")?;
        self.written += len;
        Ok(())
    }

    fn rotate(&mut self) -> anyhow::Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        self.file = None;
        fs::rename(&path, rotated_path(&path))
            .with_context(|| format!("rotate log file {}", path.display()))?;
        self.file = Some(open_log(&path)?);
        self.written = 0;
        Ok(())
    }
}

fn open_log(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

/// `launcher.log` -> `launcher.log.1`.
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".1");
    path.with_file_name(name)
}

/// Shared handle to the launcher log file.
#[derive(Clone)]
pub struct LogFile {
    sink: Arc<Mutex<LogSink>>,
}

impl Default for LogFile {
    fn default() -> Self {
        Self::with_max_bytes(MAX_LOG_BYTES)
    }
}

impl LogFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            sink: Arc::new(Mutex::new(LogSink {
                file: None,
                path: None,
                written: 0,
                max_bytes,
                pending: VecDeque::new(),
            })),
        }
    }

    /// Starts appending to `<data_dir>/logs/launcher.log` and flushes what
    /// was logged so far. A file already past the cap is rotated first.
    pub fn attach(&self, data_dir: &Path) -> anyhow::Result<PathBuf> {
        let dir = data_dir.join(LOG_DIR_NAME);
        fs::create_dir_all(&dir).context("create log directory")?;
        let path = dir.join(LOG_FILE_NAME);

        let mut sink = self
            .sink
            .lock()
            .map_err(|_| anyhow::anyhow!("log sink poisoned"))?;
        sink.path = Some(path.clone());
        sink.written = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
        if sink.written >= sink.max_bytes {
            sink.rotate()?;
        } else {
            sink.file = Some(open_log(&path)?);
        }
        let pending: Vec<String> = sink.pending.drain(..).collect();
        for line in pending {
            sink.append(&line)?;
        }
        Ok(path)
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.sink.lock().ok().and_then(|sink| sink.path.clone())
    }

    fn write_line(&self, line: String) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        if sink.file.is_some() {
            let _ = sink.append(&line);
        } else {
            sink.pending.push_back(line);
            while sink.pending.len() > PENDING_LIMIT {
                sink.pending.pop_front();
            }
        }
    }
}

#[derive(Clone)]
pub struct FileLayer {
    file: LogFile,
}

impl FileLayer {
    pub fn new(file: LogFile) -> Self {
        Self { file }
    }
}

impl<S> Layer<S> for FileLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LogVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let entry = LogEntry {
            timestamp: format_timestamp(OffsetDateTime::now_utc()),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            fields: visitor.fields,
        };
        self.file.write_line(entry.format_compact());
    }
}

#[derive(Default)]
struct LogVisitor {
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for LogVisitor {
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn Debug) {
        self.fields.push((field.name().to_string(), format!("{value:?}")));
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    time::format_description::parse("[hour repr:24]:[minute]:[second]")
        .ok()
        .and_then(|format| timestamp.format(&format).ok())
        .unwrap_or_else(|| timestamp.unix_timestamp().to_string())
}

pub struct Logging {
    filter: reload::Handle<EnvFilter, Registry>,
    file: LogFile,
    env_override: bool,
}

impl Logging {
    pub fn file(&self) -> &LogFile {
        &self.file
    }

    /// Raises verbosity to debug unless `RUST_LOG` already decided it.
    pub fn enable_debug(&self) {
        if self.env_override {
            return;
        }
        if let Err(err) = self.filter.modify(|filter| *filter = EnvFilter::new("debug")) {
            warn!(error = %err, "could not raise log level");
        }
    }
}

/// Installs the global subscriber. Call once, first thing in `main`.
pub fn init() -> Logging {
    let env_override = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    let stderr_level = if env_override {
        LevelFilter::TRACE
    } else {
        LevelFilter::WARN
    };
    let file = LogFile::new();
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(stderr_level),
        )
        .with(FileLayer::new(file.clone()))
        .init();
    Logging {
        filter: handle,
        file,
        env_override,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(fields: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            timestamp: "12:34:56".to_string(),
            level: Level::INFO,
            target: "winterpack::update".to_string(),
            fields: fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    #[test]
    fn format_compact_sorts_extra_fields() {
        let formatted = entry(&[
            ("message", "update applied"),
            ("version", "1.3.0"),
            ("attempt", "2"),
        ])
        .format_compact();
        assert_eq!(
            formatted,
            "12:34:56 INFO  winterpack::update update applied | attempt=2 version=1.3.0"
        );
    }

    #[test]
    fn format_compact_without_fields_has_no_separator() {
        let formatted = entry(&[("message", "ready")]).format_compact();
        assert!(formatted.ends_with("ready"));
        assert!(!formatted.contains('|'));
    }

    #[test]
    fn pending_lines_are_flushed_on_attach() {
        let tmp = TempDir::new().unwrap();
        let file = LogFile::new();
        file.write_line("before attach".to_string());
        let path = file.attach(tmp.path()).unwrap();
        file.write_line("after attach".to_string());

        assert_eq!(path, tmp.path().join(LOG_DIR_NAME).join(LOG_FILE_NAME));
        assert_eq!(file.path(), Some(path.clone()));
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "before attach\nafter attach\n");
    }

    #[test]
    fn log_is_rotated_past_the_size_cap() {
        let tmp = TempDir::new().unwrap();
        let file = LogFile::with_max_bytes(32);
        let path = file.attach(tmp.path()).unwrap();
        for index in 0..10 {
            file.write_line(format!("line number {index}"));
        }

        let current = fs::read_to_string(&path).unwrap();
        let previous = fs::read_to_string(rotated_path(&path)).unwrap();
        assert!(current.len() <= 32);
        assert!(previous.len() <= 32);
        assert!(current.ends_with("line number 9\n"));
        assert!(!tmp.path().join(LOG_DIR_NAME).join("launcher.log.2").exists());
    }

    #[test]
    fn oversized_log_is_rotated_on_attach() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(LOG_DIR_NAME);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(LOG_FILE_NAME);
        fs::write(&path, "x".repeat(64)).unwrap();
        fs::write(rotated_path(&path), "older").unwrap();

        let file = LogFile::with_max_bytes(32);
        file.write_line("fresh".to_string());
        file.attach(tmp.path()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
        assert_eq!(fs::read_to_string(rotated_path(&path)).unwrap(), "x".repeat(64));
    }

    #[test]
    fn pending_buffer_is_bounded() {
        let file = LogFile::new();
        for index in 0..(PENDING_LIMIT + 10) {
            file.write_line(format!("line {index}"));
        }
        let sink = file.sink.lock().unwrap();
        assert_eq!(sink.pending.len(), PENDING_LIMIT);
        assert_eq!(sink.pending.front().map(String::as_str), Some("line 10"));
    }
}
