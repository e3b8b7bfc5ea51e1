//! Error types for the extension bridge
//!
//! Libc-style failures never show up here: those are sentinels plus errno
//! inside the sandbox. What remains are control-flow faults that unwind a
//! module call, memory traps, and load/host errors reported to the embedder.

use thiserror::Error;

/// Result type for bridge operations seen by the embedder
pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// A fault unwinding module execution back to the adapter boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// `exit()` family
    #[error("extension exited with status {0}")]
    Exit(i32),

    /// `abort()` or a failed assertion
    #[error("extension aborted")]
    Abort,

    /// Out-of-bounds access or a trap raised by the engine
    #[error("trap: {0}")]
    Trap(String),
}

impl Fault {
    /// Exit status recorded when this fault tears the adapter down
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Fault::Exit(code) => Some(*code),
            Fault::Abort => Some(1),
            Fault::Trap(_) => None,
        }
    }
}

/// Checked linear memory access failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory access out of bounds: address {address} + size {size} > memory size {memory_size}")]
    OutOfBounds {
        address: u32,
        size: u32,
        memory_size: u32,
    },

    #[error("string at {address} is not terminated before end of memory")]
    Unterminated { address: u32 },
}

impl From<MemoryError> for Fault {
    fn from(err: MemoryError) -> Self {
        Fault::Trap(err.to_string())
    }
}

/// Structural problems in module bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("module too small")]
    TooSmall,

    #[error("invalid magic number")]
    BadMagic,

    #[error("unsupported WebAssembly version")]
    BadVersion,

    #[error("invalid LEB128")]
    InvalidLeb128,

    #[error("{0} extends past end of module")]
    Truncated(&'static str),

    #[error("missing {kind} export '{name}'")]
    MissingExport {
        name: &'static str,
        kind: &'static str,
    },
}

/// Stage of the load pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    TypeQuery,
    Stats,
    ByteFetch,
    Validate,
    Instantiation,
    Initializer,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadStage::TypeQuery => "type query",
            LoadStage::Stats => "stats query",
            LoadStage::ByteFetch => "byte fetch",
            LoadStage::Validate => "validation",
            LoadStage::Instantiation => "instantiation",
            LoadStage::Initializer => "initializer",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while loading an extension
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load extension '{name}' during {stage}: {reason}")]
pub struct LoadError {
    pub name: String,
    pub stage: LoadStage,
    pub reason: String,
}

impl LoadError {
    pub fn new(name: &str, stage: LoadStage, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            stage,
            reason: reason.into(),
        }
    }
}

/// Errors reported to code driving an extension from the host side
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("extension adapter has been destroyed")]
    Destroyed,

    #[error("unknown context {0:#x}")]
    UnknownContext(u32),

    #[error("'{0}' is not allowed")]
    NotAllowed(String),

    #[error("extension '{0}' is already open")]
    AlreadyOpen(String),

    #[error("extension '{0}' is not open")]
    NotOpen(String),

    #[error("no route for '{0}'")]
    NoRoute(String),

    #[error("host bus error: {0}")]
    Bus(String),

    #[error("invalid options: {0}")]
    Options(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_exit_status() {
        assert_eq!(Fault::Exit(3).exit_status(), Some(3));
        assert_eq!(Fault::Abort.exit_status(), Some(1));
        assert_eq!(Fault::Trap("oob".into()).exit_status(), None);
    }

    #[test]
    fn test_memory_error_becomes_trap() {
        let fault: Fault = MemoryError::OutOfBounds {
            address: 70000,
            size: 4,
            memory_size: 65536,
        }
        .into();
        assert!(matches!(fault, Fault::Trap(ref msg) if msg.contains("70000")));
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::new("echo", LoadStage::ByteFetch, "404");
        assert_eq!(
            err.to_string(),
            "failed to load extension 'echo' during byte fetch: 404"
        );
    }
}
