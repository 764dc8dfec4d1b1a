use thiserror::Error;

use std::path::PathBuf;

macro_rules! script_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Script {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Script {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into a handful of classes which the callers treat differently:
///
/// ## Startup errors (abort the whole run)
/// - [`Error::MissingModule`] - A required module image does not exist
/// - [`Error::InvalidModule`] - A module image could not be decoded
/// - [`Error::VersionMarkerMissing`] - The target has not been prepared for patching
/// - [`Error::FileError`] - Filesystem I/O errors, also used for write-back failures
///
/// ## Resolution misses (skip the enclosing patch entry)
/// - [`Error::SymbolNotFound`] - No type, method or field satisfied a predicate set
///
/// ## Shape drift (skip the enclosing patch entry)
/// - [`Error::ShapeNotFound`] - The Pattern Finder located nothing
/// - [`Error::AmbiguousShape`] - The Pattern Finder located more sites than expected
/// - [`Error::ShapeMismatch`] - A structural match failed at a given instruction
///
/// ## Script errors (skip the enclosing patch entry)
/// - [`Error::Script`] - Malformed patch declaration
/// - [`Error::UnknownOpcode`] - Opcode name not part of the instruction set
/// - [`Error::OperandMismatch`] - Operand does not fit the opcode's operand kind
/// - [`Error::Xml`] - The script document itself is not well-formed
///
/// ## Splice errors (skip the enclosing patch entry)
/// - [`Error::IndexOutOfRange`], [`Error::NotABranch`], [`Error::NoBody`],
///   [`Error::ForeignInstruction`]
///
/// # Examples
///
/// ```rust
/// use cilhook::{Error, patch::OpcodePattern, assembly::OpCode, metadata::MethodBody};
///
/// let body = MethodBody::new();
/// let pattern = OpcodePattern::exactly_once(&[OpCode::Switch, OpCode::Br]);
///
/// match pattern.locate(&body) {
///     Err(Error::ShapeNotFound { .. }) => println!("the tool may be outdated"),
///     Err(e) => println!("other error: {e}"),
///     Ok(index) => println!("found at {index}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Startup
    /// A module image required for the run is missing on disk.
    #[error("Unable to locate {role} module at {}", path.display())]
    MissingModule {
        /// What the module is used for (target, runtime, dispatcher)
        role: String,
        /// Where the module was expected
        path: PathBuf,
    },

    /// A module image exists but cannot be decoded.
    #[error("Module {name} is invalid - {message}")]
    InvalidModule {
        /// The module file name or logical name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// The target module does not contain the expected marker type.
    ///
    /// Targets have to be prepared (e.g. deobfuscated) by an earlier tool, which
    /// leaves a marker type behind. Patching an unprepared module would fail in
    /// confusing ways later on.
    #[error("{module} needs to be prepared first - marker type {marker} is missing")]
    VersionMarkerMissing {
        /// The name of the target module
        module: String,
        /// The marker type that was expected
        marker: String,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Module image (de)serialization error.
    #[error("{0}")]
    Serialization(#[from] serde_json::Error),

    // Resolution
    /// No symbol satisfied a mandatory predicate set.
    #[error("Unable to find {what} matching [{predicates}]")]
    SymbolNotFound {
        /// The kind and scope of the symbol, e.g. `method in ChunkCluster`
        what: String,
        /// The labels of the predicates that were ANDed together
        predicates: String,
    },

    // Shape drift
    /// The Pattern Finder did not find the expected opcode shape.
    #[error("{context} has no {pattern} (the tool may be outdated for this binary version)")]
    ShapeNotFound {
        /// Where the shape was searched
        context: String,
        /// The searched pattern
        pattern: String,
    },

    /// The Pattern Finder found more sites than expected.
    #[error(
        "{context} has {found} occurrences of {pattern}, expected {expected} (the tool may be outdated for this binary version)"
    )]
    AmbiguousShape {
        /// Where the shape was searched
        context: String,
        /// The searched pattern
        pattern: String,
        /// How many matches were expected
        expected: String,
        /// How many matches were found
        found: usize,
    },

    /// A structural match failed.
    #[error("{context} does not have the expected shape at {index}: {reason} (the tool may be outdated for this binary version)")]
    ShapeMismatch {
        /// The checked method
        context: String,
        /// Instruction index of the first mismatch (relative to the checked base)
        index: isize,
        /// Why it did not match
        reason: String,
    },

    // Script
    /// A patch declaration is malformed.
    #[error("Script - {file}:{line}: {message}")]
    Script {
        /// The message to be printed for the Script error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An opcode name is not part of the instruction set.
    #[error("Unknown opcode - {0}")]
    UnknownOpcode(String),

    /// An operand does not fit the operand kind of its opcode.
    #[error("Opcode {opcode} expects a {expected} operand, got {actual}")]
    OperandMismatch {
        /// The mnemonic of the opcode
        opcode: &'static str,
        /// The operand kind the opcode takes
        expected: &'static str,
        /// A description of the supplied operand
        actual: String,
    },

    /// The script document is not well-formed XML.
    #[error("Xml - {0}")]
    Xml(String),

    // Splicing
    /// An insertion index lies past the end of the body.
    #[error("Index {index} is out of range for a body of {len} instructions")]
    IndexOutOfRange {
        /// The requested index
        index: usize,
        /// The body length
        len: usize,
    },

    /// The instruction cannot be retargeted because it does not branch.
    #[error("Instruction {0} is not a branch")]
    NotABranch(String),

    /// The method has no body (abstract or external).
    #[error("Method {0} has no body")]
    NoBody(String),

    /// An instruction handle does not belong to the body it was used with, or
    /// is already part of its instruction stream.
    #[error("Instruction handle {0} cannot be used here")]
    ForeignInstruction(String),
}

impl Error {
    /// Returns `true` for errors which must abort the whole run instead of a single patch entry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingModule { .. }
                | Error::InvalidModule { .. }
                | Error::VersionMarkerMissing { .. }
                | Error::FileError(_)
                | Error::Serialization(_)
        )
    }

    /// Returns `true` for errors caused by the target binary no longer having the expected shape.
    #[must_use]
    pub fn is_shape_drift(&self) -> bool {
        matches!(
            self,
            Error::ShapeNotFound { .. } | Error::AmbiguousShape { .. } | Error::ShapeMismatch { .. }
        )
    }
}
