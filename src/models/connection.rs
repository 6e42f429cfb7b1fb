use std::fmt;

/// Lifecycle of the serial connection as seen by the UI.
///
/// ```text
/// Idle -> Opening -> Open -> Closing -> Closed
///            \-------------------------^   (open failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Opening,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Opening)
                | (Idle, Closed)
                | (Opening, Open)
                | (Opening, Closed)
                | (Opening, Closing)
                | (Open, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Opening => "Opening",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn test_happy_path() {
        assert!(Idle.can_transition_to(Opening));
        assert!(Opening.can_transition_to(Open));
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
    }

    #[test]
    fn test_open_failure_skips_open() {
        assert!(Opening.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Closed));
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [Idle, Opening, Open, Closing, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
        assert!(Closed.is_terminal());
    }
}
