use super::connection::Connection;
use super::flags::Agreement;
use super::handlers::truncate_at_boundary;
use super::state::NetState;
use crate::error::{NetplayError, Result};
use crate::packet::{FleetEntry, Packet};

impl Connection {
    fn check_send(&self, op: &'static str, legal: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(NetplayError::NotConnected);
        }
        if !legal {
            return Err(NetplayError::InvalidOperation {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Fleet and team name changes are only allowed while nothing is confirmed.
    fn check_setup_change(&self, op: &'static str) -> Result<()> {
        self.check_send(
            op,
            self.state == NetState::InSetup && !self.flags.handshake.local_ok(),
        )
    }

    /// Rejects ship types and slots the remote side would treat as malformed.
    fn check_fleet_entry(&self, op: &'static str, index: usize, ship: u8) -> Result<()> {
        if index >= self.config.fleet_size || ship >= self.config.ship_type_count {
            return Err(NetplayError::InvalidOperation {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    pub fn send_init(&mut self) -> Result<()> {
        self.check_send("send_init", self.state == NetState::Init)?;
        self.queue_packet(Packet::init(&self.config));
        Ok(())
    }

    pub fn send_ping(&mut self, id: u32) -> Result<()> {
        self.check_send("send_ping", self.state.past_init())?;
        self.queue_packet(Packet::Ping { id });
        Ok(())
    }

    /// Announces the team name of local player slot `player`.
    pub fn send_team_name(&mut self, player: usize, name: &str) -> Result<()> {
        self.check_setup_change("send_team_name")?;
        // The receiver stops reading at the first NUL.
        let mut name = name.split('\0').next().unwrap_or_default().to_string();
        truncate_at_boundary(&mut name, self.config.max_team_chars);
        let side = self.side_for_player(player);
        self.queue_packet(Packet::TeamName { side, name });
        Ok(())
    }

    /// Announces the complete fleet of local player slot `player`.
    pub fn send_fleet(&mut self, player: usize, ships: &[u8]) -> Result<()> {
        self.check_setup_change("send_fleet")?;
        if ships.len() > self.config.fleet_size {
            return Err(NetplayError::InvalidOperation {
                op: "send_fleet",
                state: self.state,
            });
        }
        for (index, &ship) in ships.iter().enumerate() {
            self.check_fleet_entry("send_fleet", index, ship)?;
        }
        let side = self.side_for_player(player);
        self.queue_packet(Packet::fleet(side, ships));
        Ok(())
    }

    /// Announces a change to a single fleet slot.
    pub fn send_fleet_ship(&mut self, player: usize, index: u8, ship: u8) -> Result<()> {
        self.check_setup_change("send_fleet_ship")?;
        self.check_fleet_entry("send_fleet_ship", usize::from(index), ship)?;
        let side = self.side_for_player(player);
        self.queue_packet(Packet::Fleet {
            side,
            ships: vec![FleetEntry { index, ship }],
        });
        Ok(())
    }

    /// Sends the battle seed. Only the side holding the discriminant does this.
    pub fn send_seed_random(&mut self, seed: u32) -> Result<()> {
        self.check_send(
            "send_seed_random",
            self.state == NetState::PreBattle && self.flags.discriminant,
        )?;
        self.queue_packet(Packet::SeedRandom { seed });
        self.flags.agreement.insert(Agreement::RANDOM_SEED);
        Ok(())
    }

    pub fn send_input_delay(&mut self, delay: u32) -> Result<()> {
        self.check_send("send_input_delay", self.state == NetState::PreBattle)?;
        if delay > self.config.max_input_delay {
            return Err(NetplayError::InputDelay(delay));
        }
        self.queue_packet(Packet::InputDelay { delay });
        Ok(())
    }

    pub fn send_ship_selected(&mut self, ship: u16) -> Result<()> {
        self.check_send("send_ship_selected", self.state == NetState::SelectShip)?;
        self.queue_packet(Packet::SelectShip { ship });
        Ok(())
    }

    pub fn send_battle_input(&mut self, state: u8) -> Result<()> {
        self.check_send("send_battle_input", self.state.battle_active())?;
        self.queue_packet(Packet::BattleInput { state });
        Ok(())
    }

    /// Announces the frame the local side wants to end the battle on.
    pub fn send_frame_count(&mut self, frame_count: u32) -> Result<()> {
        self.check_send("send_frame_count", self.state == NetState::EndingBattle)?;
        self.battle.end_frame_count = self.battle.end_frame_count.max(frame_count);
        self.queue_packet(Packet::FrameCount { frame_count });
        Ok(())
    }

    /// Records the local checksum for `frame` and sends it.
    pub fn send_checksum(&mut self, frame: u32, checksum: u32) -> Result<()> {
        self.check_send("send_checksum", self.state.battle_active())?;
        if !self.battle.local_checksums.insert(frame, checksum) {
            return Err(NetplayError::InvalidOperation {
                op: "send_checksum",
                state: self.state,
            });
        }
        self.queue_packet(Packet::Checksum {
            frame_nr: frame,
            checksum,
        });
        Ok(())
    }
}
