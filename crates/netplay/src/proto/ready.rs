use crate::error::{NetplayError, Result};
use crate::net::{Connection, ReadyFlags};
use crate::packet::Packet;

impl Connection {
    /// Declares the local side ready and arms `callback` to run once the
    /// remote side is ready too.
    ///
    /// With `notify_remote` unset no Ready packet is sent, for barriers where
    /// another packet (Init, FrameCount) already tells the remote side.
    /// Returns whether the barrier completed immediately.
    pub fn local_ready(
        &mut self,
        callback: impl FnOnce(&mut Connection) + 'static,
        notify_remote: bool,
    ) -> Result<bool> {
        if !self.state.ready_meaningful() || self.flags.ready.local_ready() {
            return Err(NetplayError::InvalidOperation {
                op: "local_ready",
                state: self.state,
            });
        }

        self.ready_callback = Some(Box::new(callback));
        if notify_remote {
            self.queue_packet(Packet::Ready);
        }
        if !self.flags.ready.remote_ready() {
            self.flags.ready = ReadyFlags::LocalReady;
            return Ok(false);
        }

        self.flags.ready = ReadyFlags::Idle;
        self.both_ready();
        Ok(true)
    }

    pub(crate) fn remote_ready(&mut self) -> bool {
        if !self.flags.ready.local_ready() {
            self.flags.ready = ReadyFlags::RemoteReady;
            return false;
        }

        self.flags.ready = ReadyFlags::Idle;
        self.both_ready();
        true
    }

    fn both_ready(&mut self) {
        // Taken out first so the callback can arm the next barrier.
        if let Some(callback) = self.ready_callback.take() {
            callback(self);
        }
    }
}
