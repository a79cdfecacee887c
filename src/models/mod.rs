pub mod query;

pub use query::{ListDirection, QueryRecord, QueryState, TerminalOutcome};
