pub mod config;
pub mod consistency;
pub mod decision;
pub mod dedup;
pub mod drain;
pub mod error;
pub mod export;
pub mod link;
pub mod progress;
pub mod scanner;
pub mod transport;

pub use config::AppConfig;
pub use consistency::{Category, ConsistencyEngine, ConsistencyReport, DuplicatePolicy};
pub use decision::{Decider, Decision};
pub use drain::{DrainConfig, DrainReport, Drainer};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
