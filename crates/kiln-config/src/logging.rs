use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt, TestWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// `[logging]` section.
///
/// ```toml
/// [logging]
/// level = "info"
/// json = false
/// file = "build/kiln.log"
///
/// [logging.targets]
/// "kiln.build" = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level, or a full `EnvFilter` directive string such as
    /// `kiln.deps=trace,warn`.
    pub level: String,
    /// Per-target level overrides, applied after `level`.
    pub targets: BTreeMap<String, String>,
    pub json: bool,
    pub stderr: bool,
    /// Log file opened in append mode. An unopenable file disables only the
    /// file sink.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            targets: BTreeMap::new(),
            json: false,
            stderr: true,
            file: None,
        }
    }
}

/// Maps level synonyms onto `tracing` names; anything else is passed through
/// as a directive.
pub(crate) fn normalize_level(input: &str) -> String {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => "info".to_owned(),
        "warning" => "warn".to_owned(),
        level @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => level.to_owned(),
        _ => trimmed.to_owned(),
    }
}

impl LoggingConfig {
    /// Directive string built from `level` and `targets`.
    pub fn directives(&self) -> String {
        std::iter::once(normalize_level(&self.level))
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={}", normalize_level(level))),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Effective filter: the configured directives followed by `RUST_LOG`, so
    /// the environment wins on conflicts. Unparseable input falls back to the
    /// next best source and finally to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = self.directives();
        let from_env = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let mut candidates = Vec::new();
        if let Some(env) = &from_env {
            candidates.push(format!("{configured},{env}"));
            candidates.push(env.clone());
        }
        candidates.push(configured);

        candidates
            .into_iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

/// Serialises writes from every subscriber thread into one log file.
#[derive(Clone)]
struct SharedFile(Arc<Mutex<File>>);

struct SharedFileGuard<'a>(MutexGuard<'a, File>);

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard(self.0.lock())
    }
}

impl Write for SharedFileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn open_log_file(path: &Path) -> io::Result<SharedFile> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(SharedFile(Arc::new(Mutex::new(file))))
}

/// Combined writer for every configured sink, plus the log file error if the
/// file could not be opened.
fn sinks(config: &LoggingConfig) -> (BoxMakeWriter, Option<io::Error>) {
    let mut writer = BoxMakeWriter::new(io::sink);
    if config.stderr {
        // Under `cargo test` only `eprint!` output is captured per test.
        writer = if cfg!(debug_assertions) {
            BoxMakeWriter::new(writer.and(TestWriter::with_stderr))
        } else {
            BoxMakeWriter::new(writer.and(io::stderr))
        };
    }

    let mut file_error = None;
    if let Some(path) = &config.file {
        match open_log_file(path) {
            Ok(file) => writer = BoxMakeWriter::new(writer.and(file)),
            Err(err) => file_error = Some(err),
        }
    }
    (writer, file_error)
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber described by `config`.
///
/// Only the first call in a process has an effect, and an already installed
/// global subscriber is left alone.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let (writer, file_error) = sinks(config);
        let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return;
        }
        if let (Some(path), Some(err)) = (&config.file, file_error) {
            tracing::warn!(
                target = "kiln.config",
                path = %path.display(),
                error = %err,
                "failed to open log file; file logging disabled"
            );
        }
    });
}
