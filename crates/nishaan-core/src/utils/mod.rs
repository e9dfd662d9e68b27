//! Small helpers shared across modules.

pub mod format;
pub mod race;

pub use format::{pending_label, pluralize};
pub use race::{detached, first_to_settle};
