//! Debug loop over model responses.
//!
//! [`DebugController`] repeatedly requests code from a
//! [`crate::conversation::Converser`], runs it in the sandbox and answers
//! each fault with a corrective message, within the attempt and iteration
//! limits of a [`LoopConfig`].

pub mod config;
pub mod controller;
pub mod prompts;

pub use config::LoopConfig;
pub use controller::{
    DebugController, DebugError, DebugOutcome, LoopState, LoopStatus, RoundOutcome, RoundRecord,
    INITIAL_SNAPSHOT,
};
