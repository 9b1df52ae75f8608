//! Small newtypes shared across the coordinator, gateway and client.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::SystemTime;

// NotebookId //
//************//

/// Opaque notebook identifier; routing key for coordinators (spec §2 Gateway,
/// §4.3 `notebookId` path segment).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NotebookId(pub Box<str>);

impl NotebookId {
	pub fn new(id: impl Into<Box<str>>) -> Self {
		NotebookId(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for NotebookId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for NotebookId {
	fn from(s: String) -> Self {
		NotebookId(s.into())
	}
}

impl Serialize for NotebookId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for NotebookId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(NotebookId(String::deserialize(deserializer)?.into()))
	}
}

// Timestamp //
//***********//

/// Unix-seconds timestamp, used for awareness heartbeats and snapshot metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let secs = SystemTime::now()
			.duration_since(SystemTime::UNIX_EPOCH)
			.unwrap_or_default()
			.as_secs();
		Timestamp(secs as i64)
	}

	/// Whole seconds elapsed since this timestamp, saturating at 0.
	pub fn elapsed_secs(&self, now: Timestamp) -> i64 {
		(now.0 - self.0).max(0)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// vim: ts=4
