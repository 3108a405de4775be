//! Checkpoints for resumable batch generation.
//!
//! Provides:
//! - `CheckpointState`: status of every variant of a batch
//! - `CheckpointManager`: persistence and loading of checkpoint state

mod state;

pub use state::*;
