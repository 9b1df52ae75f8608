//! Error types for the snapshot persistence adapter.

use std::fmt;

#[derive(Debug)]
pub enum Error {
	/// Database operation error
	Db(String),

	/// I/O error
	Io(String),

	/// Serialization error
	Serialization(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Db(msg) => write!(f, "database error: {msg}"),
			Error::Io(msg) => write!(f, "I/O error: {msg}"),
			Error::Serialization(msg) => write!(f, "serialization error: {msg}"),
		}
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}

impl From<Error> for notebook_types::Error {
	fn from(err: Error) -> Self {
		notebook_types::Error::Storage(err.to_string())
	}
}

// vim: ts=4
