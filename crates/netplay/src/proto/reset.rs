use crate::error::{NetplayError, Result};
use crate::event::NetEvent;
use crate::net::{Connection, ResetFlags};
use crate::packet::{AbortReason, Packet, ResetReason};

// Either side may start a reset by sending Reset; the other side echoes it.
// The reset completes when both Resets have been seen and the game has armed
// a reset callback, which may happen in any order. Both sides resetting at
// the same time needs no echo.

impl Connection {
    pub fn local_reset(&mut self, reason: ResetReason) -> Result<()> {
        if !self.is_connected() {
            return Err(NetplayError::NotConnected);
        }
        if self.flags.reset.local_reset() {
            return Err(NetplayError::InvalidOperation {
                op: "local_reset",
                state: self.state,
            });
        }

        self.flags.reset.mark_local();
        if self.flags.reset.remote_reset() {
            self.try_complete_reset();
            return Ok(());
        }

        self.queue_packet(Packet::Reset { reason });
        if self.state.game_in_progress() {
            self.events.push(NetEvent::ResetStarted {
                by_remote: false,
                reason,
            });
        }
        Ok(())
    }

    pub(crate) fn remote_reset(&mut self, reason: ResetReason) {
        log::info!(
            "NETPLAY: [{}] Remote side requested a reset ({})",
            self.player(),
            reason
        );
        self.flags.reset.mark_remote();
        if !self.flags.reset.local_reset() {
            self.queue_packet(Packet::Reset { reason });
            self.flags.reset.mark_local();
            if self.state.game_in_progress() {
                self.events.push(NetEvent::ResetStarted {
                    by_remote: true,
                    reason,
                });
            }
        }
        self.try_complete_reset();
    }

    /// Arms the callback that finishes a reset. Runs it right away if both
    /// Resets have already been seen.
    pub fn set_reset_callback(&mut self, callback: impl FnOnce(&mut Connection) + 'static) {
        self.reset_callback = Some(Box::new(callback));
        self.try_complete_reset();
    }

    pub fn clear_reset_callback(&mut self) {
        self.reset_callback = None;
    }

    fn try_complete_reset(&mut self) {
        let both = self.flags.reset.local_reset() && self.flags.reset.remote_reset();
        if !both || self.reset_callback.is_none() {
            return;
        }
        self.flags.reset = ResetFlags::Idle;
        if let Some(callback) = self.reset_callback.take() {
            callback(self);
        }
    }

    /// Sends Abort and closes the connection. The Abort is flushed on a
    /// best-effort basis only.
    pub fn abort(&mut self, reason: AbortReason) -> Result<()> {
        if !self.is_connected() {
            return Err(NetplayError::NotConnected);
        }
        self.send_abort(reason);
        self.disconnect();
        Ok(())
    }

    pub(crate) fn send_abort(&mut self, reason: AbortReason) {
        log::warn!("NETPLAY: [{}] Aborting connection: {}", self.player(), reason);
        self.queue_packet(Packet::Abort { reason });
        self.aborting = true;
        self.events.push(NetEvent::Aborted {
            by_remote: false,
            reason,
        });
    }
}
