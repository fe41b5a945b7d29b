//! Netplay connection engine for two-player lockstep ship battles.
//!
//! A [`Connection`] owns the stream to one remote peer. It frames and
//! validates incoming packets, drives the connection state machine and the
//! confirm, ready and reset protocols, and reports remote changes as
//! [`NetEvent`]s. The caller feeds it readable data with
//! [`Connection::data_ready`] and writes queued packets with
//! [`Connection::flush`] once per tick.

pub mod battle;
pub mod config;
pub mod error;
pub mod event;
pub mod net;
pub mod packet;
mod proto;

pub use battle::{BattleSync, ChecksumBuffer, ChecksumVerdict, StateHasher};
pub use config::{
    AppVersion, DEFAULT_PORT, NetplayConfig, PROTOCOL_VERSION, PeerOptions, PeerRole,
    ProtocolVersion,
};
pub use error::{ErrorCode, NetplayError, Result};
pub use event::NetEvent;
pub use net::{Connection, FlushStatus, LoopbackTransport, NetState, Transport};
pub use packet::{AbortReason, NetplaySide, Packet, PacketType, RANDOM_SHIP, ResetReason};
