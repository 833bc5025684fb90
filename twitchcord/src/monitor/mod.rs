//! Twitch live-status monitoring.

mod app_token;
mod state;
mod status;
mod tracker;

pub use app_token::AppTokenCache;
pub use state::{LiveState, LiveStateMap, Transition};
pub use status::{StreamStatusApi, TwitchStreamStatus};
pub use tracker::{CycleReport, LiveStatusTracker, TrackerHandle};
