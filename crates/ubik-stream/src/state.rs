// Connection state machine
//
// Idle -> Connecting -> Open -> Closed -> Connecting (retry) -> ...
// Stopped is terminal and only reached through teardown.

use serde::Serialize;

/// Lifecycle phase of a log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not connected and not scheduled to connect
    #[default]
    Idle,
    /// Fetching a token or opening the socket
    Connecting,
    /// Socket open, events flowing
    Open,
    /// Socket closed, reconnect scheduled
    Closed,
    /// Torn down; no further transitions
    Stopped,
}

/// Inputs that drive phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Explicit start (or restart) requested by the consumer
    Start,
    /// Token exchange failed
    TokenFailed,
    /// Socket handshake completed
    Opened,
    /// Socket closed, or the handshake failed
    Closed,
    /// Reconnect delay elapsed
    RetryElapsed,
    /// Teardown requested
    Stop,
}

impl Phase {
    /// Next phase for `signal`, or `None` when the transition is not allowed
    pub fn on(self, signal: Signal) -> Option<Phase> {
        use Phase::*;

        match (self, signal) {
            (Stopped, _) => None,
            (_, Signal::Stop) => Some(Stopped),
            (_, Signal::Start) => Some(Connecting),
            (Connecting, Signal::TokenFailed) => Some(Idle),
            (Connecting, Signal::Opened) => Some(Open),
            (Connecting | Open, Signal::Closed) => Some(Closed),
            (Closed, Signal::RetryElapsed) => Some(Connecting),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == Phase::Open
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHASES: [Phase; 5] = [
        Phase::Idle,
        Phase::Connecting,
        Phase::Open,
        Phase::Closed,
        Phase::Stopped,
    ];

    const SIGNALS: [Signal; 6] = [
        Signal::Start,
        Signal::TokenFailed,
        Signal::Opened,
        Signal::Closed,
        Signal::RetryElapsed,
        Signal::Stop,
    ];

    #[test]
    fn test_happy_path_with_retry() {
        let mut phase = Phase::Idle;
        for (signal, expected) in [
            (Signal::Start, Phase::Connecting),
            (Signal::Opened, Phase::Open),
            (Signal::Closed, Phase::Closed),
            (Signal::RetryElapsed, Phase::Connecting),
            (Signal::Opened, Phase::Open),
            (Signal::Stop, Phase::Stopped),
        ] {
            phase = phase.on(signal).unwrap();
            assert_eq!(phase, expected);
        }
    }

    #[test]
    fn test_token_failure_parks_in_idle() {
        assert_eq!(Phase::Connecting.on(Signal::TokenFailed), Some(Phase::Idle));
        assert_eq!(Phase::Idle.on(Signal::RetryElapsed), None);
    }

    #[test]
    fn test_failed_handshake_schedules_retry() {
        assert_eq!(Phase::Connecting.on(Signal::Closed), Some(Phase::Closed));
    }

    #[test]
    fn test_start_is_accepted_from_every_live_phase() {
        for phase in [Phase::Idle, Phase::Connecting, Phase::Open, Phase::Closed] {
            assert_eq!(phase.on(Signal::Start), Some(Phase::Connecting));
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        for signal in SIGNALS {
            assert_eq!(Phase::Stopped.on(signal), None);
        }
        for phase in PHASES.into_iter().filter(|p| !p.is_terminal()) {
            assert_eq!(phase.on(Signal::Stop), Some(Phase::Stopped));
        }
    }

    #[test]
    fn test_only_open_is_connected() {
        let connected: Vec<_> = PHASES.into_iter().filter(|p| p.is_connected()).collect();
        assert_eq!(connected, vec![Phase::Open]);
    }

    #[test]
    fn test_rejected_transitions() {
        assert_eq!(Phase::Idle.on(Signal::Opened), None);
        assert_eq!(Phase::Open.on(Signal::Opened), None);
        assert_eq!(Phase::Closed.on(Signal::Closed), None);
        assert_eq!(Phase::Open.on(Signal::RetryElapsed), None);
    }
}
