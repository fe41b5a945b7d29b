use crate::packet::{PACKET_TYPE_COUNT, PacketType};

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    sent_by_type: [u64; PACKET_TYPE_COUNT],
    received_by_type: [u64; PACKET_TYPE_COUNT],
}

impl NetworkStats {
    /// Counted when the packet is queued, not when its last byte leaves.
    pub(crate) fn record_sent(&mut self, kind: PacketType) {
        self.packets_sent += 1;
        self.sent_by_type[kind.index()] += 1;
    }

    pub(crate) fn record_received(&mut self, kind: PacketType) {
        self.packets_received += 1;
        self.received_by_type[kind.index()] += 1;
    }

    pub fn sent(&self, kind: PacketType) -> u64 {
        self.sent_by_type[kind.index()]
    }

    pub fn received(&self, kind: PacketType) -> u64 {
        self.received_by_type[kind.index()]
    }

    /// Per-type counts of packets sent and received, skipping unused types.
    pub fn by_type(&self) -> impl Iterator<Item = (PacketType, u64, u64)> + '_ {
        PacketType::ALL
            .into_iter()
            .map(|kind| (kind, self.sent(kind), self.received(kind)))
            .filter(|&(_, sent, received)| sent > 0 || received > 0)
    }
}
