use std::collections::VecDeque;

use super::types::NetEvent;

#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<NetEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: NetEvent) {
        self.pending.push_back(event);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = NetEvent> + '_ {
        self.pending.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetEvent> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order() {
        let mut queue = EventQueue::new();
        queue.push(NetEvent::Connected);
        queue.push(NetEvent::AckReceived { id: 3 });

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![NetEvent::Connected, NetEvent::AckReceived { id: 3 }]
        );
        assert!(queue.is_empty());
    }
}
