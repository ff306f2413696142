use serde::{Deserialize, Serialize};

/// Measurement session lifecycle.
///
/// State transitions:
/// ```text
/// idle → processing → draining_tail → closed
/// ```
/// `Closed` is terminal; a new session needs a new supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Processing = 1,
    DrainingTail = 2,
    Closed = 3,
}

impl LifecycleState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Capture has stopped; lanes only finish what is already queued.
    pub fn is_draining(&self) -> bool {
        matches!(self, Self::DrainingTail | Self::Closed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether `next` is the single legal successor of this state.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Processing)
                | (Self::Processing, Self::DrainingTail)
                | (Self::DrainingTail, Self::Closed)
        )
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Processing,
            2 => Self::DrainingTail,
            _ => Self::Closed,
        }
    }
}
