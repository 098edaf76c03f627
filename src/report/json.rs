//! JSON output for checkpoints.
//!
//! Uses the same shape as the sidecar files so output can be piped into
//! other tools.

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};

pub fn render_list(checkpoints: &[Checkpoint]) -> Result<String> {
    serde_json::to_string_pretty(checkpoints).map_err(Error::metadata("failed to render checkpoints"))
}

pub fn render_info(checkpoint: &Checkpoint) -> Result<String> {
    serde_json::to_string_pretty(checkpoint).map_err(Error::metadata("failed to render checkpoint"))
}
