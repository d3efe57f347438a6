use serde::{Deserialize, Serialize};

/// Sustain-window state for one (device, rule) pair. One continuous
/// violation episode produces exactly one trigger; any compliant sample
/// ends the episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EpisodeState {
    Idle,
    Pending { since_ms: i64 },
    Triggered { since_ms: i64 },
    Cleared { at_ms: i64 },
}

impl EpisodeState {
    pub fn transition(self, violating: bool, now_ms: i64, sustain_ms: i64) -> Self {
        if !violating {
            return match self {
                Self::Triggered { .. } => Self::Cleared { at_ms: now_ms },
                _ => Self::Idle,
            };
        }

        match self {
            Self::Pending { since_ms } if now_ms - since_ms >= sustain_ms => {
                Self::Triggered { since_ms }
            }
            Self::Pending { .. } | Self::Triggered { .. } => self,
            // Idle and Cleared both start a fresh episode here.
            _ => Self::start(now_ms, sustain_ms),
        }
    }

    fn start(now_ms: i64, sustain_ms: i64) -> Self {
        if sustain_ms == 0 {
            Self::Triggered { since_ms: now_ms }
        } else {
            Self::Pending { since_ms: now_ms }
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self, Self::Triggered { .. })
    }

    pub fn just_cleared(&self) -> bool {
        matches!(self, Self::Cleared { .. })
    }
}
