mod controller;
mod state;
mod worker;

pub use controller::FocusSession;
pub use state::{FrameCounters, LiveStats, SessionPhase, SessionState, SessionStats};

pub(crate) use state::round2;
