use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    AbortReason, FleetEntry, HEADER_LEN, NetplaySide, Packet, PacketType, ResetReason, pad4,
    wire_fleet, wire_name,
};
use crate::config::{AppVersion, ProtocolVersion};
use crate::error::{NetplayError, Result};

/// Inspects the header at the front of `data`.
///
/// Returns `Ok(None)` while fewer than `HEADER_LEN` bytes are available. A bad
/// type tag or a length below the type's minimum is an error even if the
/// rest of the packet has not arrived yet.
pub fn peek_header(data: &[u8]) -> Result<Option<(PacketType, usize)>> {
    if data.len() < HEADER_LEN {
        return Ok(None);
    }
    let mut header = &data[..HEADER_LEN];
    let len = header.get_u16() as usize;
    let tag = header.get_u16();

    let kind = PacketType::from_u16(tag).ok_or(NetplayError::InvalidType(tag))?;
    if len < kind.min_len() {
        return Err(NetplayError::BadLength { kind, len });
    }
    Ok(Some((kind, len)))
}

impl Packet {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let len = self.encoded_len();
        buf.put_u16(len as u16);
        buf.put_u16(self.kind().tag());

        match self {
            Self::Init { protocol, app } => {
                buf.put_u8(protocol.major);
                buf.put_u8(protocol.minor);
                buf.put_u16(0);
                buf.put_u8(app.major);
                buf.put_u8(app.minor);
                buf.put_u8(app.patch);
                buf.put_u8(0);
            }
            Self::Ping { id } | Self::Ack { id } => buf.put_u32(*id),
            Self::Ready
            | Self::Handshake0
            | Self::Handshake1
            | Self::HandshakeCancel
            | Self::HandshakeCancelAck => {}
            Self::Fleet { side, ships } => {
                let ships = wire_fleet(ships);
                buf.put_u8(*side as u8);
                buf.put_u8(0);
                buf.put_u16(ships.len() as u16);
                for entry in ships {
                    buf.put_u8(entry.index);
                    buf.put_u8(entry.ship);
                }
                let body = ships.len() * 2;
                buf.put_bytes(0, pad4(body) - body);
            }
            Self::TeamName { side, name } => {
                buf.put_u8(*side as u8);
                buf.put_u8(0);
                let name = wire_name(name);
                buf.put_slice(name);
                // Terminating NUL plus padding.
                buf.put_bytes(0, len - PacketType::TeamName.min_len() - name.len());
            }
            Self::SeedRandom { seed } => buf.put_u32(*seed),
            Self::InputDelay { delay } => buf.put_u32(*delay),
            Self::SelectShip { ship } => {
                buf.put_u16(*ship);
                buf.put_u16(0);
            }
            Self::BattleInput { state } => {
                buf.put_u8(*state);
                buf.put_u8(0);
                buf.put_u16(0);
            }
            Self::FrameCount { frame_count } => buf.put_u32(*frame_count),
            Self::Checksum { frame_nr, checksum } => {
                buf.put_u32(*frame_nr);
                buf.put_u32(*checksum);
            }
            Self::Abort { reason } => {
                buf.put_u16(*reason as u16);
                buf.put_u16(0);
            }
            Self::Reset { reason } => {
                buf.put_u16(*reason as u16);
                buf.put_u16(0);
            }
        }
    }

    /// Decodes the packet at the front of `data`, which must hold the complete packet.
    /// Trailing bytes past the declared length are left alone.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (kind, len) = peek_header(data)?.ok_or(NetplayError::Malformed {
            kind: PacketType::Init,
            reason: "truncated header",
        })?;
        if data.len() < len {
            return Err(NetplayError::Malformed {
                kind,
                reason: "truncated packet",
            });
        }
        let mut body = &data[HEADER_LEN..len];

        let packet = match kind {
            PacketType::Init => {
                let protocol = ProtocolVersion {
                    major: body.get_u8(),
                    minor: body.get_u8(),
                };
                body.advance(2);
                let app = AppVersion {
                    major: body.get_u8(),
                    minor: body.get_u8(),
                    patch: body.get_u8(),
                };
                Self::Init { protocol, app }
            }
            PacketType::Ping => Self::Ping { id: body.get_u32() },
            PacketType::Ack => Self::Ack { id: body.get_u32() },
            PacketType::Ready => Self::Ready,
            PacketType::Fleet => {
                let side = decode_side(kind, body.get_u8())?;
                body.advance(1);
                let count = body.get_u16() as usize;
                if body.remaining() < count * 2 {
                    return Err(NetplayError::Malformed {
                        kind,
                        reason: "ship count exceeds packet length",
                    });
                }
                let ships = (0..count)
                    .map(|_| FleetEntry {
                        index: body.get_u8(),
                        ship: body.get_u8(),
                    })
                    .collect();
                Self::Fleet { side, ships }
            }
            PacketType::TeamName => {
                let side = decode_side(kind, body.get_u8())?;
                body.advance(1);
                let end = body.iter().position(|&b| b == 0).ok_or(NetplayError::Malformed {
                    kind,
                    reason: "team name is not NUL-terminated",
                })?;
                let name = String::from_utf8_lossy(&body[..end]).into_owned();
                Self::TeamName { side, name }
            }
            PacketType::Handshake0 => Self::Handshake0,
            PacketType::Handshake1 => Self::Handshake1,
            PacketType::HandshakeCancel => Self::HandshakeCancel,
            PacketType::HandshakeCancelAck => Self::HandshakeCancelAck,
            PacketType::SeedRandom => Self::SeedRandom {
                seed: body.get_u32(),
            },
            PacketType::InputDelay => Self::InputDelay {
                delay: body.get_u32(),
            },
            PacketType::SelectShip => Self::SelectShip {
                ship: body.get_u16(),
            },
            PacketType::BattleInput => Self::BattleInput {
                state: body.get_u8(),
            },
            PacketType::FrameCount => Self::FrameCount {
                frame_count: body.get_u32(),
            },
            PacketType::Checksum => Self::Checksum {
                frame_nr: body.get_u32(),
                checksum: body.get_u32(),
            },
            PacketType::Abort => Self::Abort {
                reason: AbortReason::from_u16(body.get_u16()),
            },
            PacketType::Reset => Self::Reset {
                reason: ResetReason::from_u16(body.get_u16()),
            },
        };
        Ok(packet)
    }
}

fn decode_side(kind: PacketType, value: u8) -> Result<NetplaySide> {
    NetplaySide::from_u8(value).ok_or(NetplayError::Malformed {
        kind,
        reason: "invalid side",
    })
}
