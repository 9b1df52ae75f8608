pub use crate::AppState;
pub use notebook_types::prelude::*;

// vim: ts=4
