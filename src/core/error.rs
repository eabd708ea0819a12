//! Error handling for the framework core.
//!
//! Every fallible operation returns [`Result`]. Errors are never recovered
//! inside the core: they travel up to the driver, which reports them and
//! aborts the run.

use thiserror::Error;

/// Broad category of a [`FrameworkError`], used by the executable to pick
/// the report banner and exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or ambiguous configuration, or modules wired so that a
    /// single-bound input receives two messages in one event
    Configuration,
    /// Module type could not be resolved
    Library,
    /// Failure while processing events
    Runtime,
    /// Contract violation by a module or by the caller
    Logic,
}

/// Lifecycle phase in which a module raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Construction,
    Init,
    InitializeThread,
    Run,
    FinalizeThread,
    Finalize,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Construction => "construction",
            Phase::Init => "init",
            Phase::InitializeThread => "thread initialization",
            Phase::Run => "run",
            Phase::FinalizeThread => "thread finalization",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FrameworkError {
    // Configuration errors
    #[error("could not parse line {line} in file '{file}'")]
    ConfigParse { file: String, line: usize },

    #[error("key '{key}' in section '{section}' does not exist")]
    MissingKey { section: String, key: String },

    #[error("value '{value}' of key '{key}' in section '{section}' is not valid: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("module {module} is instantiated more than once with the same priority for '{detector}'")]
    AmbiguousInstantiation { module: String, detector: String },

    #[error("detector '{0}' is not defined")]
    DetectorNotFound(String),

    #[error("no detectors of type '{0}' are defined")]
    DetectorTypeNotFound(String),

    #[error("detector '{0}' is defined more than once")]
    DuplicateDetector(String),

    #[error("modules {modules:?} are not thread-safe but multithreading was requested")]
    ThreadUnsafeModules { modules: Vec<String> },

    // Library errors
    #[error("module library '{0}' could not be found in the registry")]
    ModuleNotFound(String),

    #[error("module '{0}' is registered more than once")]
    DuplicateModule(String),

    #[error("module collection '{0}' is not known")]
    CollectionNotFound(String),

    // Messenger errors
    #[error("message of type {message_type} dispatched twice to single-bound module {module} in event {event}")]
    MessageOverwrite {
        module: String,
        message_type: &'static str,
        event: u64,
    },

    // Runtime and logic errors
    #[error("module {module} failed during {phase}: {source}")]
    Module {
        module: String,
        phase: Phase,
        #[source]
        source: Box<FrameworkError>,
    },

    #[error("{0}")]
    Runtime(String),

    #[error("{0}")]
    Logic(String),

    #[error("run aborted after a failure in another event")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameworkError {
    /// Shorthand for a runtime failure raised by module code
    pub fn runtime(message: impl Into<String>) -> Self {
        FrameworkError::Runtime(message.into())
    }

    /// Shorthand for a contract violation
    pub fn logic(message: impl Into<String>) -> Self {
        FrameworkError::Logic(message.into())
    }

    /// Attach the identity of the failing module instance
    pub fn in_module(self, module: impl Into<String>, phase: Phase) -> Self {
        FrameworkError::Module {
            module: module.into(),
            phase,
            source: Box::new(self),
        }
    }

    /// Category of the error; module wrappers report the kind of their cause
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameworkError::ConfigParse { .. }
            | FrameworkError::MissingKey { .. }
            | FrameworkError::InvalidValue { .. }
            | FrameworkError::AmbiguousInstantiation { .. }
            | FrameworkError::DetectorNotFound(_)
            | FrameworkError::DetectorTypeNotFound(_)
            | FrameworkError::DuplicateDetector(_)
            | FrameworkError::ThreadUnsafeModules { .. }
            | FrameworkError::MessageOverwrite { .. } => ErrorKind::Configuration,
            FrameworkError::ModuleNotFound(_)
            | FrameworkError::DuplicateModule(_)
            | FrameworkError::CollectionNotFound(_) => ErrorKind::Library,
            FrameworkError::Runtime(_)
            | FrameworkError::Aborted
            | FrameworkError::Io(_) => ErrorKind::Runtime,
            FrameworkError::Logic(_) => ErrorKind::Logic,
            FrameworkError::Module { source, .. } => source.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameworkError::AmbiguousInstantiation {
            module: "Foo".to_string(),
            detector: "dut".to_string(),
        };
        assert!(err.to_string().contains("Foo"));
        assert!(err.to_string().contains("dut"));
    }

    #[test]
    fn test_module_wrapper_keeps_kind() {
        let err = FrameworkError::MissingKey {
            section: "Foo".to_string(),
            key: "bar".to_string(),
        }
        .in_module("Foo:dut", Phase::Init);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Foo:dut"));
        assert!(err.to_string().contains("init"));
    }

    #[test]
    fn test_overwrite_is_configuration_error() {
        let err = FrameworkError::MessageOverwrite {
            module: "Digitizer:dut".to_string(),
            message_type: "Charges",
            event: 4,
        }
        .in_module("Deposition", Phase::Run);
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_runtime_kind() {
        assert_eq!(FrameworkError::runtime("boom").kind(), ErrorKind::Runtime);
        assert_eq!(FrameworkError::logic("bad").kind(), ErrorKind::Logic);
        assert_eq!(
            FrameworkError::ModuleNotFound("X".to_string()).kind(),
            ErrorKind::Library
        );
    }
}
