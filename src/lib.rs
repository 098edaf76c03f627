pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod report;
pub mod util;

pub use checkpoint::{Checkpoint, CheckpointManager};
pub use error::{Error, Result};
