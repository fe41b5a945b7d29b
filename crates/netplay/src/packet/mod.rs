//! Wire packets exchanged between the two sides of a netplay connection.
//!
//! Every packet starts with a 4-byte header: a 16-bit total length (header
//! included) followed by a 16-bit type tag, both in network byte order.
//! Packet lengths are always a multiple of 4.

mod codec;

use std::fmt;

use crate::config::{AppVersion, NetplayConfig, ProtocolVersion};

pub use codec::peek_header;

pub const HEADER_LEN: usize = 4;
pub const PACKET_TYPE_COUNT: usize = 18;
/// `SelectShip` value requesting a random pick from the remaining fleet.
pub const RANDOM_SHIP: u16 = 0xFFFF;

/// Largest packet length the u16 length field can carry while staying 4-aligned.
const MAX_PACKET_LEN: usize = u16::MAX as usize & !0x03;
/// Longest team name, in bytes, that still fits one packet.
pub const MAX_WIRE_NAME_LEN: usize = MAX_PACKET_LEN - (HEADER_LEN + 2) - 1;
/// Most fleet entries that fit one packet.
pub const MAX_WIRE_FLEET_ENTRIES: usize = (MAX_PACKET_LEN - (HEADER_LEN + 4)) / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    Init = 0,
    Ping = 1,
    Ack = 2,
    Ready = 3,
    Fleet = 4,
    TeamName = 5,
    Handshake0 = 6,
    Handshake1 = 7,
    HandshakeCancel = 8,
    HandshakeCancelAck = 9,
    SeedRandom = 10,
    InputDelay = 11,
    SelectShip = 12,
    BattleInput = 13,
    FrameCount = 14,
    Checksum = 15,
    Abort = 16,
    Reset = 17,
}

impl PacketType {
    pub const ALL: [PacketType; PACKET_TYPE_COUNT] = [
        Self::Init,
        Self::Ping,
        Self::Ack,
        Self::Ready,
        Self::Fleet,
        Self::TeamName,
        Self::Handshake0,
        Self::Handshake1,
        Self::HandshakeCancel,
        Self::HandshakeCancelAck,
        Self::SeedRandom,
        Self::InputDelay,
        Self::SelectShip,
        Self::BattleInput,
        Self::FrameCount,
        Self::Checksum,
        Self::Abort,
        Self::Reset,
    ];

    pub fn from_u16(tag: u16) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Smallest valid wire length, header included.
    pub fn min_len(self) -> usize {
        match self {
            Self::Ready
            | Self::Handshake0
            | Self::Handshake1
            | Self::HandshakeCancel
            | Self::HandshakeCancelAck => HEADER_LEN,
            Self::TeamName => HEADER_LEN + 2,
            Self::Init | Self::Checksum => HEADER_LEN + 8,
            Self::Ping
            | Self::Ack
            | Self::Fleet
            | Self::SeedRandom
            | Self::InputDelay
            | Self::SelectShip
            | Self::BattleInput
            | Self::FrameCount
            | Self::Abort
            | Self::Reset => HEADER_LEN + 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Ping => "Ping",
            Self::Ack => "Ack",
            Self::Ready => "Ready",
            Self::Fleet => "Fleet",
            Self::TeamName => "TeamName",
            Self::Handshake0 => "Handshake0",
            Self::Handshake1 => "Handshake1",
            Self::HandshakeCancel => "HandshakeCancel",
            Self::HandshakeCancelAck => "HandshakeCancelAck",
            Self::SeedRandom => "SeedRandom",
            Self::InputDelay => "InputDelay",
            Self::SelectShip => "SelectShip",
            Self::BattleInput => "BattleInput",
            Self::FrameCount => "FrameCount",
            Self::Checksum => "Checksum",
            Self::Abort => "Abort",
            Self::Reset => "Reset",
        }
    }

    /// Packets that stay meaningful while a reset is in progress.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Ping | Self::Ack | Self::Abort | Self::Reset)
    }

    /// Sent every frame; kept out of per-packet debug output.
    pub fn is_chatty(self) -> bool {
        matches!(self, Self::BattleInput | Self::Checksum)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which player a Fleet or TeamName packet refers to, from the sender's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetplaySide {
    Local = 0,
    Remote = 1,
}

impl NetplaySide {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Local),
            1 => Some(Self::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetEntry {
    pub index: u8,
    pub ship: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Unspecified = 0,
    VersionMismatch = 1,
    InvalidHash = 2,
    ProtocolError = 3,
}

impl AbortReason {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::VersionMismatch,
            2 => Self::InvalidHash,
            3 => Self::ProtocolError,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::VersionMismatch => "version mismatch",
            Self::InvalidHash => "invalid hash",
            Self::ProtocolError => "protocol error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Unspecified = 0,
    SyncLoss = 1,
    ManualReset = 2,
}

impl ResetReason {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::SyncLoss,
            2 => Self::ManualReset,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::SyncLoss => "sync loss",
            Self::ManualReset => "manual reset",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Init {
        protocol: ProtocolVersion,
        app: AppVersion,
    },
    Ping {
        id: u32,
    },
    Ack {
        id: u32,
    },
    Ready,
    Fleet {
        side: NetplaySide,
        ships: Vec<FleetEntry>,
    },
    TeamName {
        side: NetplaySide,
        name: String,
    },
    Handshake0,
    Handshake1,
    HandshakeCancel,
    HandshakeCancelAck,
    SeedRandom {
        seed: u32,
    },
    InputDelay {
        delay: u32,
    },
    SelectShip {
        ship: u16,
    },
    BattleInput {
        state: u8,
    },
    FrameCount {
        frame_count: u32,
    },
    Checksum {
        frame_nr: u32,
        checksum: u32,
    },
    Abort {
        reason: AbortReason,
    },
    Reset {
        reason: ResetReason,
    },
}

impl Packet {
    pub fn init(config: &NetplayConfig) -> Self {
        Self::Init {
            protocol: config.protocol_version,
            app: config.app_version,
        }
    }

    /// A fleet update listing `ships` in slot order, starting at slot 0.
    ///
    /// Slot numbers are a single byte, so ships past slot 255 are left out.
    pub fn fleet(side: NetplaySide, ships: &[u8]) -> Self {
        Self::Fleet {
            side,
            ships: ships
                .iter()
                .take(usize::from(u8::MAX) + 1)
                .enumerate()
                .map(|(index, &ship)| FleetEntry {
                    index: index as u8,
                    ship,
                })
                .collect(),
        }
    }

    pub fn fleet_ship(side: NetplaySide, index: u8, ship: u8) -> Self {
        Self::Fleet {
            side,
            ships: vec![FleetEntry { index, ship }],
        }
    }

    pub fn kind(&self) -> PacketType {
        match self {
            Self::Init { .. } => PacketType::Init,
            Self::Ping { .. } => PacketType::Ping,
            Self::Ack { .. } => PacketType::Ack,
            Self::Ready => PacketType::Ready,
            Self::Fleet { .. } => PacketType::Fleet,
            Self::TeamName { .. } => PacketType::TeamName,
            Self::Handshake0 => PacketType::Handshake0,
            Self::Handshake1 => PacketType::Handshake1,
            Self::HandshakeCancel => PacketType::HandshakeCancel,
            Self::HandshakeCancelAck => PacketType::HandshakeCancelAck,
            Self::SeedRandom { .. } => PacketType::SeedRandom,
            Self::InputDelay { .. } => PacketType::InputDelay,
            Self::SelectShip { .. } => PacketType::SelectShip,
            Self::BattleInput { .. } => PacketType::BattleInput,
            Self::FrameCount { .. } => PacketType::FrameCount,
            Self::Checksum { .. } => PacketType::Checksum,
            Self::Abort { .. } => PacketType::Abort,
            Self::Reset { .. } => PacketType::Reset,
        }
    }

    /// Total wire length including header and padding.
    pub fn encoded_len(&self) -> usize {
        let min = self.kind().min_len();
        match self {
            Self::Fleet { ships, .. } => min + pad4(wire_fleet(ships).len() * 2),
            Self::TeamName { name, .. } => pad4(min + wire_name(name).len() + 1),
            _ => min,
        }
    }
}

/// The part of a team name that goes on the wire: everything before the
/// first NUL, cut to [`MAX_WIRE_NAME_LEN`] bytes.
pub(crate) fn wire_name(name: &str) -> &[u8] {
    let bytes = name.as_bytes();
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len())
        .min(MAX_WIRE_NAME_LEN);
    &bytes[..end]
}

pub(crate) fn wire_fleet(ships: &[FleetEntry]) -> &[FleetEntry] {
    &ships[..ships.len().min(MAX_WIRE_FLEET_ENTRIES)]
}

#[inline]
pub(crate) fn pad4(len: usize) -> usize {
    (len + 3) & !0x03
}
