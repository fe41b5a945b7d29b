use crate::packet::{AbortReason, ResetReason};

/// Something the remote side did, or something the connection concluded,
/// that the game layer has to react to.
///
/// `player` fields are local player slots, already translated from the
/// sender's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// Both sides exchanged Init and the connection entered setup.
    Connected,
    RemoteFleetShip {
        player: usize,
        index: u8,
        ship: u8,
    },
    RemoteTeamName {
        player: usize,
        name: String,
    },
    /// The local confirmation was withdrawn because the remote side changed
    /// the setup.
    ConfirmationCancelled,
    HandshakeComplete,
    RandomSeed {
        seed: u32,
    },
    RemoteInputDelay {
        delay: u32,
    },
    RemoteShipSelected {
        ship: u16,
    },
    RemoteFrameCount {
        frame_count: u32,
    },
    AckReceived {
        id: u32,
    },
    ResetStarted {
        by_remote: bool,
        reason: ResetReason,
    },
    Aborted {
        by_remote: bool,
        reason: AbortReason,
    },
    /// Checksums for `frame` differ; the simulations have diverged.
    Desync {
        frame: u32,
        local: u32,
        remote: u32,
    },
}
