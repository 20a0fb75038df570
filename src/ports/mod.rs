//! Port traits for the collaborators the engine reads from or writes to.

pub mod calendar_port;
pub mod config_port;
pub mod price_port;
pub mod report_port;
pub mod universe_port;
