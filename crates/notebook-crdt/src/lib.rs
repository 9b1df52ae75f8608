//! CRDT document model and wire protocol for notebook synchronization.
//!
//! Built on [`yrs`], the Rust port of Yjs. A notebook is one `yrs::Doc`
//! carrying a collaborative `title` and an ordered `cells` array; peers
//! exchange [`protocol::Frame`]s over a single websocket binary channel for
//! both CRDT sync and ephemeral presence ("awareness").

pub mod awareness;
pub mod doc;
pub mod protocol;
pub mod sanitize;
mod varint;

pub use awareness::{AwarenessDelta, AwarenessRegistry, AwarenessState};
pub use doc::{CellType, CellView, NotebookDoc};
pub use protocol::Frame;
pub use sanitize::{SanitizeReport, sanitize};

// vim: ts=4
