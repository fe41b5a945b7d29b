use bitflags::bitflags;

bitflags! {
    /// Parameters both sides of a connection have agreed on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Agreement: u8 {
        const RANDOM_SEED = 1 << 0;
    }
}

/// Transport-level status. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    NeverConnected,
    Connected,
    Disconnected,
}

/// Local half of the confirmation handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalConfirm {
    #[default]
    Idle,
    Confirmed,
    /// A HandshakeCancel is waiting for its acknowledgement.
    Canceling,
    /// Confirmed again while the cancel is still unacknowledged; the proposal
    /// goes out once the acknowledgement arrives.
    CancelingReconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandshakeFlags {
    local: LocalConfirm,
    remote_ok: bool,
}

impl HandshakeFlags {
    pub fn local(&self) -> LocalConfirm {
        self.local
    }

    pub fn local_ok(&self) -> bool {
        matches!(
            self.local,
            LocalConfirm::Confirmed | LocalConfirm::CancelingReconfirmed
        )
    }

    pub fn remote_ok(&self) -> bool {
        self.remote_ok
    }

    pub fn canceling(&self) -> bool {
        matches!(
            self.local,
            LocalConfirm::Canceling | LocalConfirm::CancelingReconfirmed
        )
    }

    pub(crate) fn set_local_ok(&mut self, ok: bool) {
        self.local = Self::compose(ok, self.canceling());
    }

    pub(crate) fn set_canceling(&mut self, canceling: bool) {
        self.local = Self::compose(self.local_ok(), canceling);
    }

    pub(crate) fn set_remote_ok(&mut self, ok: bool) {
        self.remote_ok = ok;
    }

    fn compose(ok: bool, canceling: bool) -> LocalConfirm {
        match (ok, canceling) {
            (false, false) => LocalConfirm::Idle,
            (true, false) => LocalConfirm::Confirmed,
            (false, true) => LocalConfirm::Canceling,
            (true, true) => LocalConfirm::CancelingReconfirmed,
        }
    }
}

/// Ready barrier. Both sides being ready at once is never stored: the
/// barrier completes and returns to `Idle` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyFlags {
    #[default]
    Idle,
    LocalReady,
    RemoteReady,
}

impl ReadyFlags {
    pub fn local_ready(&self) -> bool {
        *self == Self::LocalReady
    }

    pub fn remote_ready(&self) -> bool {
        *self == Self::RemoteReady
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetFlags {
    #[default]
    Idle,
    LocalOnly,
    RemoteOnly,
    /// Initiated and confirmed; waits for a reset callback to complete.
    Both,
}

impl ResetFlags {
    pub fn local_reset(&self) -> bool {
        matches!(self, Self::LocalOnly | Self::Both)
    }

    pub fn remote_reset(&self) -> bool {
        matches!(self, Self::RemoteOnly | Self::Both)
    }

    pub fn any(&self) -> bool {
        *self != Self::Idle
    }

    pub(crate) fn mark_local(&mut self) {
        *self = if self.remote_reset() {
            Self::Both
        } else {
            Self::LocalOnly
        };
    }

    pub(crate) fn mark_remote(&mut self) {
        *self = if self.local_reset() {
            Self::Both
        } else {
            Self::RemoteOnly
        };
    }
}

#[derive(Debug, Clone)]
pub struct StateFlags {
    pub link: LinkStatus,
    /// Opposite on the two ends of one connection; fixed once connected.
    pub discriminant: bool,
    pub handshake: HandshakeFlags,
    pub ready: ReadyFlags,
    pub reset: ResetFlags,
    pub agreement: Agreement,
    /// Value proposed by the remote side, not necessarily the delay in force.
    pub input_delay: u32,
    pub checksum_interval: u32,
}

impl StateFlags {
    pub fn new(checksum_interval: u32) -> Self {
        Self {
            link: LinkStatus::NeverConnected,
            discriminant: false,
            handshake: HandshakeFlags::default(),
            ready: ReadyFlags::default(),
            reset: ResetFlags::default(),
            agreement: Agreement::empty(),
            input_delay: 0,
            checksum_interval,
        }
    }

    pub fn connected(&self) -> bool {
        self.link == LinkStatus::Connected
    }

    pub fn disconnected(&self) -> bool {
        self.link == LinkStatus::Disconnected
    }
}
