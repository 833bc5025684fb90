use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persisted live state of one watched channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    pub live: bool,
    #[serde(rename = "lastStreamId", alias = "lastId", default)]
    pub last_stream_id: Option<String>,
}

/// Channel login (lowercase) to its state.
pub type LiveStateMap = BTreeMap<String, LiveState>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    WentLive,
    /// Still live under a new stream id.
    Restarted { previous: Option<String> },
    StillLive,
    WentOffline,
    StillOffline,
}

impl Transition {
    pub fn notifies(&self) -> bool {
        matches!(self, Self::WentLive | Self::Restarted { .. })
    }
}

impl LiveState {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn live(stream_id: Option<&str>) -> Self {
        Self {
            live: true,
            last_stream_id: stream_id.filter(|id| !id.is_empty()).map(str::to_string),
        }
    }

    /// Apply one poll result (`None` = offline) and return the transition and the next state.
    pub fn observe(&self, stream_id: Option<Option<&str>>) -> (Transition, LiveState) {
        match stream_id {
            None if self.live => (Transition::WentOffline, Self::offline()),
            None => (Transition::StillOffline, Self::offline()),
            Some(id) => {
                let next = Self::live(id);
                let transition = if !self.live {
                    Transition::WentLive
                } else if self.last_stream_id == next.last_stream_id {
                    Transition::StillLive
                } else {
                    Transition::Restarted {
                        previous: self.last_stream_id.clone(),
                    }
                };
                (transition, next)
            }
        }
    }
}
