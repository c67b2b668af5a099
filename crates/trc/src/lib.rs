//! Structured error propagation and tracing setup shared by every crate in
//! the workspace. The rest of the workspace depends on this crate the way
//! the teacher's services depend on its own `trc`: a single `Result` type,
//! a `location!()` macro to tag the call site, and a `.caused_by(..)`
//! combinator to build a chain of context without losing the original
//! error. Unlike the teacher's lock-free multi-subscriber event collector,
//! logging itself is delegated straight to `tracing`/`tracing-subscriber`.

use std::fmt;

pub use tracing;

/// Error taxonomy from the system's error handling design: each kind maps
/// to how the SMTP/webhook boundaries are expected to react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Validation,
    NotFound,
    Inactive,
    Transient,
    Parse,
    Capacity,
    Fatal,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Validation => "validation",
            Kind::NotFound => "not-found",
            Kind::Inactive => "inactive",
            Kind::Transient => "transient",
            Kind::Parse => "parse",
            Kind::Capacity => "capacity",
            Kind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Where an error was raised or annotated; captured via [`location!`].
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[macro_export]
macro_rules! location {
    () => {
        $crate::Location {
            file: file!(),
            line: line!(),
        }
    };
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    message: String,
    context: Vec<String>,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Kind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, message)
    }

    pub fn inactive(message: impl Into<String>) -> Self {
        Self::new(Kind::Inactive, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(Kind::Transient, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(Kind::Parse, message)
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(Kind::Capacity, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Kind::Fatal, message)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for ctx in &self.context {
            write!(f, "\n  caused by: {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Mirrors the teacher's `AddContext` trait: attach a call-site location
/// (or a free-form reason) to an error as it propagates, without changing
/// its kind.
pub trait AddContext<T> {
    fn caused_by(self, location: Location) -> Result<T>;
    fn context(self, reason: impl Into<String>) -> Result<T>;
}

impl<T> AddContext<T> for Result<T> {
    fn caused_by(self, location: Location) -> Result<T> {
        self.map_err(|mut err| {
            err.context.push(location.to_string());
            err
        })
    }

    fn context(self, reason: impl Into<String>) -> Result<T> {
        self.map_err(|mut err| {
            err.context.push(reason.into());
            err
        })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::transient(err.to_string())
    }
}

/// Installs a `tracing-subscriber` formatter honoring `RUST_LOG`, falling
/// back to `info` for this crate's own events. Call once from `main`.
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
