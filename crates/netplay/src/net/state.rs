use std::fmt;

/// Lifecycle of a connection, in the order states are normally visited.
///
/// ```text
/// Unconnected -> Connecting -> Init -> InSetup -> PreBattle
///     -> (SelectShip <-> InterBattle) -> InBattle -> EndingBattle
///     -> EndingBattle2 -> InterBattle (next round) | Unconnected (closed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetState {
    Unconnected,
    Connecting,
    /// Exchanging protocol and application versions.
    Init,
    /// Negotiating fleets and team names.
    InSetup,
    /// Agreeing on the random seed and input delay.
    PreBattle,
    InterBattle,
    SelectShip,
    InBattle,
    EndingBattle,
    EndingBattle2,
}

impl NetState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Init => "init",
            Self::InSetup => "inSetup",
            Self::PreBattle => "preBattle",
            Self::InterBattle => "interBattle",
            Self::SelectShip => "selectShip",
            Self::InBattle => "inBattle",
            Self::EndingBattle => "endingBattle",
            Self::EndingBattle2 => "endingBattle2",
        }
    }

    /// The confirmation handshake is only used to finalise the fleet setup.
    pub fn handshake_meaningful(self) -> bool {
        self == Self::InSetup
    }

    pub fn ready_meaningful(self) -> bool {
        matches!(
            self,
            Self::Init
                | Self::PreBattle
                | Self::InterBattle
                | Self::SelectShip
                | Self::InBattle
                | Self::EndingBattle
                | Self::EndingBattle2
        )
    }

    /// Frames are being simulated and battle input flows.
    pub fn battle_active(self) -> bool {
        matches!(
            self,
            Self::InBattle | Self::EndingBattle | Self::EndingBattle2
        )
    }

    /// States in which a reset has to unwind game state, not just the connection.
    pub fn game_in_progress(self) -> bool {
        self >= Self::PreBattle
    }

    pub fn past_init(self) -> bool {
        self > Self::Init
    }
}

impl fmt::Display for NetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_only_in_setup() {
        assert!(NetState::InSetup.handshake_meaningful());
        assert!(!NetState::PreBattle.handshake_meaningful());
        assert!(!NetState::InSetup.ready_meaningful());
    }

    #[test]
    fn battle_states() {
        assert!(NetState::EndingBattle2.battle_active());
        assert!(!NetState::SelectShip.battle_active());
        assert!(NetState::SelectShip.game_in_progress());
        assert!(!NetState::InSetup.game_in_progress());
    }
}
