use std::collections::VecDeque;
use std::io;

use bytes::Bytes;

use super::stats::NetworkStats;
use super::transport::Transport;
use crate::packet::{Packet, PacketType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Every queued byte was written.
    Drained,
    /// The transport cannot take more right now; the rest stays queued.
    WouldBlock,
}

#[derive(Debug, Clone)]
struct QueuedPacket {
    kind: PacketType,
    data: Bytes,
}

/// Outbound packets, encoded at queue time and written strictly in order.
///
/// A packet leaves the queue only once its last byte has been accepted by the
/// transport; `head_sent` remembers how far a partial write got.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: VecDeque<QueuedPacket>,
    head_sent: usize,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, packet: &Packet) {
        self.packets.push_back(QueuedPacket {
            kind: packet.kind(),
            data: packet.encode(),
        });
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Types of the queued packets, oldest first.
    pub fn kinds(&self) -> impl Iterator<Item = PacketType> + '_ {
        self.packets.iter().map(|p| p.kind)
    }

    pub fn pending_bytes(&self) -> usize {
        self.packets.iter().map(|p| p.data.len()).sum::<usize>() - self.head_sent
    }

    pub fn clear(&mut self) {
        self.packets.clear();
        self.head_sent = 0;
    }

    pub(crate) fn flush(
        &mut self,
        transport: &mut dyn Transport,
        stats: &mut NetworkStats,
    ) -> io::Result<FlushStatus> {
        while let Some(head) = self.packets.front() {
            match transport.send(&head.data[self.head_sent..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    stats.bytes_sent += n as u64;
                    self.head_sent += n;
                    if self.head_sent == head.data.len() {
                        self.packets.pop_front();
                        self.head_sent = 0;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushStatus::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(FlushStatus::Drained)
    }
}
