//! Logging setup of a node process.
use std::fmt;
use std::panic::Location;
use std::panic::PanicInfo;

use backtrace::Backtrace;
use serde::Deserialize;
use serde::Serialize;
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::filter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::error::Error;

/// Verbosity of the stderr log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// protocol steps
    Debug,
    /// joins and links
    #[default]
    Info,
    /// dropped messages and dead peers
    Warn,
    /// failed maintenance
    Error,
    /// everything
    Trace,
}

impl From<LogLevel> for Level {
    fn from(val: LogLevel) -> Self {
        match val {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            x => Err(Error::InvalidLoggingLevel(x.to_string())),
        }
    }
}

/// Panic location
#[derive(Debug, Clone)]
pub struct PanicLocation {
    file: String,
    line: u32,
    column: u32,
}

impl<'a> From<&Location<'a>> for PanicLocation {
    fn from(lo: &Location<'a>) -> Self {
        Self {
            file: lo.file().to_string(),
            line: lo.line(),
            column: lo.column(),
        }
    }
}

/// Necessary information for recording panic
#[derive(Debug)]
pub struct PanicData<'a> {
    message: &'a PanicInfo<'a>,
    backtrace: String,
    location: Option<PanicLocation>,
}

impl<'a> From<&'a PanicInfo<'a>> for PanicData<'a> {
    fn from(panic: &'a PanicInfo<'a>) -> PanicData<'a> {
        let backtrace = format!("{:?}", Backtrace::new());
        let location = panic.location().map(PanicLocation::from);
        PanicData {
            message: panic,
            backtrace,
            location,
        }
    }
}

impl fmt::Display for PanicLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl<'a> fmt::Display for PanicData<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(l) => write!(f, "{}, {} \n\n {}", self.message, l, self.backtrace),
            None => write!(f, "{} \n\n {}", self.message, self.backtrace),
        }
    }
}

fn log_panic(panic: &PanicInfo) {
    let data: PanicData = panic.into();
    tracing::error!("{}", data)
}

/// Record panics as `ERROR` events, within the span they occurred in.
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        log_panic(panic);
    }));
}

/// Log to stderr at `level`, bridging `log` records into `tracing`.
/// Calling it again keeps the first subscriber.
pub fn init_logging(level: LogLevel) {
    set_panic_hook();

    let subscriber = Registry::default();
    let level_filter = filter::LevelFilter::from_level(level.into());

    // Stderr
    let subscriber = subscriber.with(
        tracing_fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(level_filter),
    );
    // Errors only mean a logger was installed already.
    let _ = LogTracer::init();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
