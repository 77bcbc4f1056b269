//! Coordinator lifecycle states.

/// Lifecycle state of the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoordinatorState {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Scan window open, collecting advertisements.
    Scanning,
    /// Connect request issued for the selected device.
    AwaitingConnect,
    /// Peripheral connected.
    Connected,
    /// Walking services and characteristics.
    Discovering,
    /// Target characteristic found and acquisition requested.
    Streaming,
    /// Peripheral went away; returns to `Idle` immediately.
    Disconnected,
}

impl CoordinatorState {
    /// Check if a peripheral is currently held.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Discovering | Self::Streaming)
    }

    /// Check if a connect request is outstanding.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::AwaitingConnect)
    }
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::AwaitingConnect => write!(f, "Awaiting connect"),
            Self::Connected => write!(f, "Connected"),
            Self::Discovering => write!(f, "Discovering"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}
