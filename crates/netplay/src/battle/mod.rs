//! Lockstep battle bookkeeping: buffered remote input and checksums used to
//! detect when the two simulations have diverged.

mod checksum;
mod input;

pub use checksum::{
    ChecksumBuffer, ChecksumDiscard, ChecksumEntry, StateHasher, check_remote_frame,
};
pub use input::BattleInputBuffer;

use crate::error::{NetplayError, Result};
use crate::event::NetEvent;
use crate::net::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumVerdict {
    Match,
    Mismatch { local: u32, remote: u32 },
    /// One of the two checksums for the frame is not (or no longer) known.
    Missing,
}

#[derive(Debug, Clone)]
pub struct BattleSync {
    pub input_delay: u32,
    /// Frame currently being simulated.
    pub frame: u32,
    /// Highest frame count announced by either side when the battle ends.
    pub end_frame_count: u32,
    pub remote_input: BattleInputBuffer,
    pub local_checksums: ChecksumBuffer,
    pub remote_checksums: ChecksumBuffer,
}

impl BattleSync {
    pub fn new(input_delay: u32, checksum_interval: u32) -> Self {
        Self {
            input_delay,
            frame: 0,
            end_frame_count: 0,
            remote_input: BattleInputBuffer::new(input_delay),
            local_checksums: ChecksumBuffer::new(input_delay, checksum_interval),
            remote_checksums: ChecksumBuffer::new(input_delay, checksum_interval),
        }
    }
}

impl Connection {
    /// Resets battle bookkeeping for a battle run with `input_delay`.
    pub fn start_battle(&mut self, input_delay: u32) -> Result<()> {
        if input_delay > self.config.max_input_delay {
            return Err(NetplayError::InputDelay(input_delay));
        }
        self.battle = BattleSync::new(input_delay, self.flags.checksum_interval);
        log::debug!(
            "NETPLAY: [{}] battle started, input delay {}, checksum interval {}",
            self.player(),
            input_delay,
            self.flags.checksum_interval
        );
        Ok(())
    }

    pub fn frame(&self) -> u32 {
        self.battle.frame
    }

    pub fn set_frame(&mut self, frame: u32) {
        self.battle.frame = frame;
    }

    pub fn advance_frame(&mut self) -> u32 {
        self.battle.frame = self.battle.frame.wrapping_add(1);
        self.battle.frame
    }

    /// Next remote input sample, if one has arrived.
    pub fn pop_remote_input(&mut self) -> Option<u8> {
        self.battle.remote_input.pop()
    }

    pub fn end_frame_count(&self) -> u32 {
        self.battle.end_frame_count
    }

    /// Compares local and remote checksums for `frame`.
    ///
    /// A mismatch is reported through a [`NetEvent::Desync`] but leaves the
    /// connection open; what to do about it is up to the game.
    pub fn verify_checksum(&mut self, frame: u32) -> ChecksumVerdict {
        let local = self.battle.local_checksums.get(frame);
        let remote = self.battle.remote_checksums.get(frame);
        match (local, remote) {
            (Some(local), Some(remote)) if local == remote => ChecksumVerdict::Match,
            (Some(local), Some(remote)) => {
                log::warn!(
                    "NETPLAY: [{}] Checksums do not match for frame {} (local {:08x}, remote {:08x})",
                    self.player(),
                    frame,
                    local,
                    remote
                );
                self.events.push(NetEvent::Desync {
                    frame,
                    local,
                    remote,
                });
                ChecksumVerdict::Mismatch { local, remote }
            }
            _ => ChecksumVerdict::Missing,
        }
    }
}
