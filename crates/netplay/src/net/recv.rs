use std::io;

use bytes::Buf;

use super::connection::Connection;
use crate::error::{NetplayError, Result};
use crate::packet::{Packet, peek_header};

impl Connection {
    /// Reads everything the transport has and processes complete packets.
    ///
    /// Returns `Ok` once the transport would block. End of stream and every
    /// error close the connection before being returned.
    pub fn data_ready(&mut self) -> Result<()> {
        let chunk = self.config.read_chunk.max(1);
        loop {
            let Some(transport) = self.transport.as_deref_mut() else {
                return Err(NetplayError::NotConnected);
            };
            // Read straight into the tail of the read buffer.
            let start = self.read_buf.len();
            self.read_buf.resize(start + chunk, 0);
            let received = transport.recv(&mut self.read_buf[start..]);
            let filled = match &received {
                Ok(n) => *n,
                Err(_) => 0,
            };
            self.read_buf.truncate(start + filled);

            match received {
                Ok(0) => {
                    log::info!("NETPLAY: [{}] Connection closed by remote side", self.player());
                    self.disconnect();
                    return Err(NetplayError::RemoteClosed);
                }
                Ok(n) => {
                    self.stats.bytes_received += n as u64;
                    self.process_read_buffer()?;
                    if !self.is_connected() {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.fail(e.into())),
            }
        }
    }

    /// Feeds bytes that arrived through some other channel than the transport.
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(NetplayError::NotConnected);
        }
        self.stats.bytes_received += data.len() as u64;
        self.read_buf.extend_from_slice(data);
        self.process_read_buffer()
    }

    /// Handles every complete packet in the read buffer, then drops the
    /// consumed bytes from its front.
    fn process_read_buffer(&mut self) -> Result<()> {
        let mut consumed = 0;
        let result = loop {
            match self.process_packet(consumed) {
                Ok(Some(len)) => {
                    consumed += len;
                    // A callback may have closed the connection.
                    if !self.is_connected() {
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let consumed = consumed.min(self.read_buf.len());
        self.read_buf.advance(consumed);
        result.map_err(|e| self.fail(e))
    }

    /// Handles the packet starting at `offset`, returning its length, or
    /// `None` if it has not fully arrived yet.
    fn process_packet(&mut self, offset: usize) -> Result<Option<usize>> {
        let data = &self.read_buf[offset..];
        let Some((kind, len)) = peek_header(data)? else {
            return Ok(None);
        };
        if data.len() < len {
            return Ok(None);
        }
        let packet = Packet::decode(&data[..len])?;

        self.stats.record_received(kind);
        self.trace_packet("<== Received", kind);
        self.handle_packet(packet)?;
        Ok(Some(len))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{NetplayConfig, PeerOptions};
    use crate::net::{Connection, LoopbackTransport, Transport};
    use crate::packet::Packet;

    #[test]
    fn partial_reads_leave_only_received_bytes() {
        let (a, mut b) = LoopbackTransport::pair();
        let mut conn = Connection::new(0, PeerOptions::default(), NetplayConfig::default());
        conn.establish(Box::new(a), false).unwrap();

        let init = Packet::init(&NetplayConfig::default()).encode();
        b.send(&init[..5]).unwrap();
        conn.data_ready().unwrap();
        assert_eq!(conn.read_buf.len(), 5);

        b.send(&init[5..]).unwrap();
        conn.data_ready().unwrap();
        assert!(conn.read_buf.is_empty());
        assert_eq!(conn.stats().bytes_received, init.len() as u64);
    }
}
