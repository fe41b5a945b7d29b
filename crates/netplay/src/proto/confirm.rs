use crate::error::{NetplayError, Result};
use crate::event::NetEvent;
use crate::net::{Connection, NetState};
use crate::packet::Packet;

// Handshake0 proposes, Handshake1 commits. A side that sends Handshake1 has
// seen the other side's proposal. HandshakeCancel withdraws a proposal and
// stays outstanding until HandshakeCancelAck arrives; a confirm made in the
// meantime is only sent once the ack is in.

impl Connection {
    /// Proposes to finish the setup with the current fleets.
    pub fn confirm(&mut self) -> Result<()> {
        if !self.state.handshake_meaningful() || self.flags.handshake.local_ok() {
            return Err(NetplayError::InvalidOperation {
                op: "confirm",
                state: self.state,
            });
        }

        self.flags.handshake.set_local_ok(true);
        if self.flags.handshake.canceling() {
            return Ok(());
        }
        if self.flags.handshake.remote_ok() {
            self.queue_packet(Packet::Handshake1);
        } else {
            self.queue_packet(Packet::Handshake0);
        }
        Ok(())
    }

    /// Withdraws an earlier [`confirm`](Self::confirm).
    pub fn cancel_confirmation(&mut self) -> Result<()> {
        if !self.state.handshake_meaningful() || !self.flags.handshake.local_ok() {
            return Err(NetplayError::InvalidOperation {
                op: "cancel_confirmation",
                state: self.state,
            });
        }

        self.flags.handshake.set_local_ok(false);
        if self.flags.handshake.canceling() {
            return Ok(());
        }
        self.queue_packet(Packet::HandshakeCancel);
        self.flags.handshake.set_canceling(true);
        Ok(())
    }

    pub(crate) fn remote_handshake0(&mut self) {
        let handshake = &mut self.flags.handshake;
        handshake.set_remote_ok(true);
        if handshake.local_ok() && !handshake.canceling() {
            self.queue_packet(Packet::Handshake1);
        }
    }

    pub(crate) fn remote_handshake1(&mut self) {
        let handshake = &mut self.flags.handshake;
        if handshake.canceling() {
            handshake.set_remote_ok(true);
            return;
        }

        let remote_was_ok = handshake.remote_ok();
        handshake.set_local_ok(false);
        handshake.set_remote_ok(false);
        if !remote_was_ok {
            // Handshake1 without a prior Handshake0 implies one; it still
            // needs our Handshake1 in return.
            self.queue_packet(Packet::Handshake1);
        }

        self.set_state(NetState::PreBattle);
        self.events.push(NetEvent::HandshakeComplete);
    }

    pub(crate) fn remote_handshake_cancel(&mut self) {
        self.flags.handshake.set_remote_ok(false);
        self.queue_packet(Packet::HandshakeCancelAck);
    }

    pub(crate) fn remote_handshake_cancel_ack(&mut self) {
        let handshake = &mut self.flags.handshake;
        handshake.set_canceling(false);
        if handshake.local_ok() {
            let packet = if handshake.remote_ok() {
                Packet::Handshake1
            } else {
                Packet::Handshake0
            };
            self.queue_packet(packet);
        }
    }
}
