//! Common error types for bockos.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`BockOsError`].
pub type BockOsResult<T> = Result<T, BockOsError>;

/// Errors shared by the bockos crates.
///
/// Library code always returns these; only the boot entry points decide
/// whether an error stops the process or is logged and skipped.
#[derive(Error, Diagnostic, Debug)]
pub enum BockOsError {
    /// A configuration document exists but cannot be parsed.
    #[error("Failed to parse configuration {path}: {message}")]
    #[diagnostic(
        code(bockos::config::parse),
        help("Fix or remove the file; boot falls back to built-in defaults")
    )]
    ConfigParse {
        /// The offending document.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(bockos::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// A declarative container field could not be translated.
    #[error("Invalid {field} '{value}' in container {id}: {reason}")]
    #[diagnostic(code(bockos::spec::parse))]
    SpecParse {
        /// Container id of the spec being converted.
        id: String,
        /// Field kind (port, device, restart, ...).
        field: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The container engine rejected a request.
    #[error("Engine {operation} failed: {message}")]
    #[diagnostic(code(bockos::engine::api))]
    Engine {
        /// Operation that failed.
        operation: String,
        /// Status and body returned by the engine.
        message: String,
    },

    /// The engine socket is not answering.
    #[error("Engine not reachable at {socket}")]
    #[diagnostic(
        code(bockos::engine::unavailable),
        help("Check that the engine process is running and the socket path is correct")
    )]
    EngineUnavailable {
        /// Socket path that was tried.
        socket: String,
    },

    /// A requested service is not defined anywhere.
    #[error("Service not found: {name}")]
    #[diagnostic(code(bockos::service::not_found))]
    ServiceNotFound {
        /// Service name.
        name: String,
    },

    /// A boot init function failed; remaining functions were not run.
    #[error("Init function '{name}' failed: {source}")]
    #[diagnostic(code(bockos::init::phase))]
    InitFunc {
        /// Name of the failed function.
        name: String,
        /// Underlying failure.
        #[source]
        source: Box<BockOsError>,
    },

    /// Process image replacement failed.
    #[error("Failed to exec {program}: {source}")]
    #[diagnostic(code(bockos::exec))]
    Exec {
        /// Program that could not be executed.
        program: String,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// Wrong command-line usage.
    #[error("Usage: {message}")]
    #[diagnostic(code(bockos::usage))]
    Usage {
        /// What was expected.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(bockos::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(bockos::serialization))]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(bockos::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl BockOsError {
    /// Build an [`BockOsError::Engine`] error.
    pub fn engine(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Build a [`BockOsError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BockOsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for BockOsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
