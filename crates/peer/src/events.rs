use std::time::Duration;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    RemoteTeam {
        name: String,
    },
    RoundStarted {
        round: u32,
        seed: u32,
        input_delay: u32,
    },
    RoundFinished {
        round: u32,
        frames: u32,
        winner: Option<usize>,
    },
    SyncLost {
        frame: u32,
    },
    RoundTrip {
        id: u32,
        rtt: Duration,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Finished,
    RemoteClosed,
    Aborted,
    Reset,
    Failed,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Finished => "finished",
            DisconnectReason::RemoteClosed => "closed by remote side",
            DisconnectReason::Aborted => "aborted",
            DisconnectReason::Reset => "reset",
            DisconnectReason::Failed => "failed",
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, DisconnectReason::Finished)
    }
}
