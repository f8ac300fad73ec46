//! `tracing-subscriber` setup for the CLI.
//!
//! Level comes from the `-v` count unless `RUST_LOG` is set.

use clap::ValueEnum;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    /// 0 → info, 1 → debug, 2+ → trace.
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self { level, format: LogFormat::default(), with_ansi: true, log_file: None }
    }
}

pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let level = config.level.as_str().to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,sparcup={level},sparcup_core={level}")));

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = Arc::new(Mutex::new(file));
            install(config, filter, move || SharedWriter(writer.clone()), false);
        }
        None => install(config, filter, io::stderr, config.with_ansi),
    }
    Ok(())
}

fn install<W>(config: &LogConfig, filter: EnvFilter, writer: W, ansi: bool)
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).init(),
        LogFormat::Compact => {
            registry.with(fmt::layer().compact().without_time().with_ansi(ansi).with_writer(writer)).init()
        }
        LogFormat::Pretty => {
            registry.with(fmt::layer().without_time().with_target(false).with_ansi(ansi).with_writer(writer)).init()
        }
    }
}

struct SharedWriter(Arc<Mutex<std::fs::File>>);

impl io::Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut f = self.0.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        f.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut f = self.0.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        f.flush()
    }
}
