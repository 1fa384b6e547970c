pub mod errors;
pub mod types;

mod launcher;
mod table;

pub use launcher::{Job, ToolConfig};
pub use table::{JobTable, PollOutcome};
