use super::connection::Connection;
use super::flags::Agreement;
use super::state::NetState;
use crate::battle::check_remote_frame;
use crate::config::{AppVersion, ProtocolVersion};
use crate::error::{NetplayError, Result};
use crate::event::NetEvent;
use crate::packet::{AbortReason, FleetEntry, NetplaySide, Packet, PacketType, RANDOM_SHIP};

impl Connection {
    /// Applies one received packet. An `Err` means the connection has to be
    /// torn down.
    pub(crate) fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        let kind = packet.kind();
        if !kind.is_control() {
            // Until the reset completes, the remote side may still be sending
            // packets it queued before it saw our Reset. A remote Reset always
            // marks the local side too, so this covers both directions.
            if self.flags.reset.any() {
                log::debug!(
                    "NETPLAY: [{}]     Ignoring {} packet during reset",
                    self.player(),
                    kind
                );
                return Ok(());
            }
        }

        match packet {
            Packet::Init { protocol, app } => self.handle_init(protocol, app),
            Packet::Ping { id } => {
                self.expect_state(kind, self.state.past_init())?;
                self.queue_packet(Packet::Ack { id });
                Ok(())
            }
            Packet::Ack { id } => {
                self.expect_state(kind, self.state.past_init())?;
                self.events.push(NetEvent::AckReceived { id });
                Ok(())
            }
            Packet::Ready => {
                self.expect_state(
                    kind,
                    self.state.ready_meaningful() && !self.flags.ready.remote_ready(),
                )?;
                self.remote_ready();
                Ok(())
            }
            Packet::Fleet { side, ships } => self.handle_fleet(side, &ships),
            Packet::TeamName { side, name } => self.handle_team_name(side, name),
            Packet::Handshake0 => {
                self.expect_state(
                    kind,
                    self.state.handshake_meaningful() && !self.flags.handshake.remote_ok(),
                )?;
                self.remote_handshake0();
                Ok(())
            }
            Packet::Handshake1 => {
                let handshake = &self.flags.handshake;
                self.expect_state(
                    kind,
                    self.state.handshake_meaningful()
                        && (handshake.local_ok() || handshake.canceling()),
                )?;
                self.remote_handshake1();
                Ok(())
            }
            Packet::HandshakeCancel => {
                self.expect_state(
                    kind,
                    self.state.handshake_meaningful() && self.flags.handshake.remote_ok(),
                )?;
                self.remote_handshake_cancel();
                Ok(())
            }
            Packet::HandshakeCancelAck => {
                self.expect_state(
                    kind,
                    self.state.handshake_meaningful() && self.flags.handshake.canceling(),
                )?;
                self.remote_handshake_cancel_ack();
                Ok(())
            }
            Packet::SeedRandom { seed } => {
                // Only the side without the discriminant receives the seed.
                self.expect_state(
                    kind,
                    self.state == NetState::PreBattle && !self.flags.discriminant,
                )?;
                self.flags.agreement.insert(Agreement::RANDOM_SEED);
                self.events.push(NetEvent::RandomSeed { seed });
                Ok(())
            }
            Packet::InputDelay { delay } => {
                self.expect_state(kind, self.state == NetState::PreBattle)?;
                if delay > self.config.max_input_delay {
                    log::error!(
                        "NETPLAY: [{}]     Received absurdly large input delay value ({})",
                        self.player(),
                        delay
                    );
                    return Err(NetplayError::InputDelay(delay));
                }
                self.flags.input_delay = delay;
                self.events.push(NetEvent::RemoteInputDelay { delay });
                Ok(())
            }
            Packet::SelectShip { ship } => {
                self.expect_state(kind, self.state == NetState::SelectShip)?;
                if ship != RANDOM_SHIP && usize::from(ship) >= self.config.fleet_size {
                    return Err(NetplayError::Malformed {
                        kind,
                        reason: "selected ship is not in the fleet",
                    });
                }
                self.events.push(NetEvent::RemoteShipSelected { ship });
                Ok(())
            }
            Packet::BattleInput { state } => {
                self.expect_state(kind, self.state.battle_active())?;
                self.battle.remote_input.push(state)
            }
            Packet::FrameCount { frame_count } => {
                self.expect_state(
                    kind,
                    self.state == NetState::EndingBattle && !self.flags.ready.remote_ready(),
                )?;
                log::debug!(
                    "NETPLAY: [{}] <== Received battle frame count {}",
                    self.player(),
                    frame_count
                );
                self.battle.end_frame_count = self.battle.end_frame_count.max(frame_count);
                self.events.push(NetEvent::RemoteFrameCount { frame_count });
                self.remote_ready();
                Ok(())
            }
            Packet::Checksum { frame_nr, checksum } => {
                self.expect_state(kind, self.state.battle_active())?;
                self.handle_checksum(frame_nr, checksum);
                Ok(())
            }
            Packet::Abort { reason } => {
                self.events.push(NetEvent::Aborted {
                    by_remote: true,
                    reason,
                });
                Err(NetplayError::RemoteAbort(reason))
            }
            Packet::Reset { reason } => {
                self.expect_state(kind, !self.flags.reset.remote_reset())?;
                self.remote_reset(reason);
                Ok(())
            }
        }
    }

    fn expect_state(&self, kind: PacketType, legal: bool) -> Result<()> {
        if legal {
            Ok(())
        } else {
            Err(NetplayError::WrongState {
                kind,
                state: self.state,
            })
        }
    }

    fn handle_init(&mut self, protocol: ProtocolVersion, app: AppVersion) -> Result<()> {
        self.expect_state(
            PacketType::Init,
            self.state == NetState::Init && !self.flags.ready.remote_ready(),
        )?;

        if protocol != self.config.protocol_version {
            self.send_abort(AbortReason::VersionMismatch);
            return Err(NetplayError::ProtocolVersion {
                major: protocol.major,
                minor: protocol.minor,
            });
        }
        if app < self.config.min_app_version {
            self.send_abort(AbortReason::VersionMismatch);
            return Err(NetplayError::AppVersion {
                remote: app.to_string(),
                required: self.config.min_app_version.to_string(),
            });
        }

        self.remote_ready();
        Ok(())
    }

    fn handle_fleet(&mut self, side: NetplaySide, ships: &[FleetEntry]) -> Result<()> {
        let kind = PacketType::Fleet;
        self.expect_state(kind, self.state == NetState::InSetup)?;

        for entry in ships {
            if entry.ship >= self.config.ship_type_count {
                log::warn!(
                    "NETPLAY: [{}] Invalid ship type number {} (max = {})",
                    self.player(),
                    entry.ship,
                    self.config.ship_type_count - 1
                );
                return Err(NetplayError::Malformed {
                    kind,
                    reason: "invalid ship type",
                });
            }
            if usize::from(entry.index) >= self.config.fleet_size {
                log::warn!(
                    "NETPLAY: [{}] Invalid ship position number {} (max = {})",
                    self.player(),
                    entry.index,
                    self.config.fleet_size - 1
                );
                return Err(NetplayError::Malformed {
                    kind,
                    reason: "invalid fleet position",
                });
            }
        }

        self.withdraw_confirmation()?;
        let player = self.player_for_side(side);
        for entry in ships {
            self.events.push(NetEvent::RemoteFleetShip {
                player,
                index: entry.index,
                ship: entry.ship,
            });
        }
        Ok(())
    }

    fn handle_team_name(&mut self, side: NetplaySide, mut name: String) -> Result<()> {
        self.expect_state(PacketType::TeamName, self.state == NetState::InSetup)?;

        self.withdraw_confirmation()?;
        truncate_at_boundary(&mut name, self.config.max_team_chars);
        let player = self.player_for_side(side);
        self.events.push(NetEvent::RemoteTeamName { player, name });
        Ok(())
    }

    /// A remote setup change invalidates what we confirmed.
    fn withdraw_confirmation(&mut self) -> Result<()> {
        if self.flags.handshake.local_ok() {
            self.cancel_confirmation()?;
            self.events.push(NetEvent::ConfirmationCancelled);
        }
        Ok(())
    }

    fn handle_checksum(&mut self, frame: u32, checksum: u32) {
        let delay = self.battle.input_delay;
        let current = self.battle.frame;
        if let Err(discard) =
            check_remote_frame(frame, current, delay, self.flags.checksum_interval)
        {
            log::warn!(
                "NETPLAY: [{}] <== Received checksum for frame {} ({}; current is {}, input delay is {}) -- discarding",
                self.player(),
                frame,
                discard,
                current,
                delay
            );
            return;
        }
        self.battle.remote_checksums.insert(frame, checksum);
    }

}

pub(crate) fn truncate_at_boundary(name: &mut String, max: usize) {
    if name.len() <= max {
        return;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
}
