//! Error definitions for StrataDB

use thiserror::Error;

pub type StrataResult<T> = Result<T, StrataError>;

/// Errors raised by the engine.
///
/// Every variant maps onto one [`ErrorKind`]; callers that only care about
/// the category should match on [`StrataError::kind`].
///
/// # Example
/// ```rust
/// use strata_core::{ErrorKind, StrataError};
///
/// let err = StrataError::Constraint("key already exists".into());
/// assert_eq!(err.kind(), ErrorKind::Constraint);
/// assert_eq!(err.kind().name(), "ConstraintError");
/// ```
#[derive(Error, Debug)]
pub enum StrataError {
	#[error("Data error: {0}")]
	Data(String),

	#[error("Constraint error: {0}")]
	Constraint(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Invalid state: {0}")]
	InvalidState(String),

	#[error("Invalid access: {0}")]
	InvalidAccess(String),

	#[error("Version error: {0}")]
	Version(String),

	#[error("Type error: {0}")]
	Type(String),

	#[error("Syntax error: {0}")]
	Syntax(String),

	#[error("Read-only transaction: {0}")]
	ReadOnly(String),

	#[error("Aborted: {0}")]
	Abort(String),

	#[error("Blocked: {0}")]
	Blocked(String),

	#[error("Operation timed out: {0}")]
	Timeout(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Storage error: {0}")]
	Storage(String),

	#[error("Serialization error: {0}")]
	Serialization(String),
}

/// Error category without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	Data,
	Constraint,
	NotFound,
	InvalidState,
	InvalidAccess,
	Version,
	Type,
	Syntax,
	ReadOnly,
	Abort,
	Blocked,
	Timeout,
	Io,
	Storage,
	Serialization,
}

impl ErrorKind {
	/// Conventional DOM-style exception name.
	pub fn name(&self) -> &'static str {
		match self {
			ErrorKind::Data => "DataError",
			ErrorKind::Constraint => "ConstraintError",
			ErrorKind::NotFound => "NotFoundError",
			ErrorKind::InvalidState => "InvalidStateError",
			ErrorKind::InvalidAccess => "InvalidAccessError",
			ErrorKind::Version => "VersionError",
			ErrorKind::Type => "TypeError",
			ErrorKind::Syntax => "SyntaxError",
			ErrorKind::ReadOnly => "ReadOnlyError",
			ErrorKind::Abort => "AbortError",
			ErrorKind::Blocked => "BlockedError",
			ErrorKind::Timeout => "TimeoutError",
			ErrorKind::Io => "IoError",
			ErrorKind::Storage => "StorageError",
			ErrorKind::Serialization => "SerializationError",
		}
	}
}

impl StrataError {
	/// Get the inner message without the type prefix.
	pub fn message(&self) -> String {
		match self {
			StrataError::Io(err) => err.to_string(),
			StrataError::Data(msg)
			| StrataError::Constraint(msg)
			| StrataError::NotFound(msg)
			| StrataError::InvalidState(msg)
			| StrataError::InvalidAccess(msg)
			| StrataError::Version(msg)
			| StrataError::Type(msg)
			| StrataError::Syntax(msg)
			| StrataError::ReadOnly(msg)
			| StrataError::Abort(msg)
			| StrataError::Blocked(msg)
			| StrataError::Timeout(msg)
			| StrataError::Storage(msg)
			| StrataError::Serialization(msg) => msg.clone(),
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			StrataError::Data(_) => ErrorKind::Data,
			StrataError::Constraint(_) => ErrorKind::Constraint,
			StrataError::NotFound(_) => ErrorKind::NotFound,
			StrataError::InvalidState(_) => ErrorKind::InvalidState,
			StrataError::InvalidAccess(_) => ErrorKind::InvalidAccess,
			StrataError::Version(_) => ErrorKind::Version,
			StrataError::Type(_) => ErrorKind::Type,
			StrataError::Syntax(_) => ErrorKind::Syntax,
			StrataError::ReadOnly(_) => ErrorKind::ReadOnly,
			StrataError::Abort(_) => ErrorKind::Abort,
			StrataError::Blocked(_) => ErrorKind::Blocked,
			StrataError::Timeout(_) => ErrorKind::Timeout,
			StrataError::Io(_) => ErrorKind::Io,
			StrataError::Storage(_) => ErrorKind::Storage,
			StrataError::Serialization(_) => ErrorKind::Serialization,
		}
	}
}

impl From<bincode::Error> for StrataError {
	fn from(err: bincode::Error) -> Self {
		StrataError::Serialization(err.to_string())
	}
}
