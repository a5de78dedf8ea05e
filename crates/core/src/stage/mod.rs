//! Stage building blocks: classified errors, progress windows and fallback
//! chains.

mod error;
mod fallback;
mod progress;

pub use error::{Disposition, ErrorKind, StageError, StageOutcome};
pub use fallback::{AdvancePolicy, AttemptOutcome, FallbackChain, Tier, TierAttempt};
pub use progress::{
    map_progress, status_line, InvalidWindow, NoopSink, PhaseTag, ProgressSink, ProgressWindow,
    Reporter, StageKind,
};
