use thiserror::Error;

/// Error taxonomy shared by the IR builder and the compiler passes.
///
/// Every variant carries the path of the offending module/aggregate/field so
/// the front end can report it to a human. Errors are raised synchronously at
/// the call that detected them and compiling the same input reproduces the
/// same error deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdlError {
    #[error("Parse error in {path}: {msg}")]
    ParseError { path: String, msg: String },

    #[error("Resolution error in {path}: {msg}")]
    ResolutionError { path: String, msg: String },

    #[error("Invariant violation in {path}: {msg}")]
    InvariantViolation { path: String, msg: String },

    #[error("Version error in {path}: {msg}")]
    VersionError { path: String, msg: String },
}
