use std::any::Any;
use std::fmt;
use std::io::{self, Write};

use bytes::BytesMut;

use super::flags::{LinkStatus, StateFlags};
use super::queue::{FlushStatus, PacketQueue};
use super::state::NetState;
use super::stats::NetworkStats;
use super::transport::Transport;
use crate::battle::BattleSync;
use crate::config::{NetplayConfig, PeerOptions};
use crate::error::{NetplayError, Result};
use crate::event::{EventQueue, NetEvent};
use crate::packet::{NetplaySide, Packet, PacketType};

pub type LifecycleCallback = Box<dyn FnMut(&mut Connection)>;
pub type ErrorCallback = Box<dyn FnMut(&mut Connection, &NetplayError)>;
/// One-shot callbacks. The slot is emptied before the call, so the callback
/// may arm the next one.
pub type ReadyCallback = Box<dyn FnOnce(&mut Connection)>;
pub type ResetCallback = Box<dyn FnOnce(&mut Connection)>;

#[derive(Default)]
struct Callbacks {
    connect: Option<LifecycleCallback>,
    close: Option<LifecycleCallback>,
    error: Option<ErrorCallback>,
    delete: Option<LifecycleCallback>,
}

/// The local end of a netplay session with one remote peer.
pub struct Connection {
    /// Local slot of the player on the other end.
    player: usize,
    options: PeerOptions,
    pub(crate) config: NetplayConfig,
    pub(crate) state: NetState,
    pub(crate) flags: StateFlags,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) read_buf: BytesMut,
    pub(crate) queue: PacketQueue,
    state_data: Option<Box<dyn Any>>,
    callbacks: Callbacks,
    pub(crate) ready_callback: Option<ReadyCallback>,
    pub(crate) reset_callback: Option<ResetCallback>,
    pub(crate) events: EventQueue,
    pub(crate) stats: NetworkStats,
    debug_sink: Option<Box<dyn Write>>,
    pub(crate) battle: BattleSync,
    /// An Abort is queued; teardown tries to get it out first.
    pub(crate) aborting: bool,
    released: bool,
}

impl Connection {
    /// `player` is the local slot (0 or 1) the remote player occupies.
    ///
    /// # Panics
    ///
    /// Panics if `player` is not 0 or 1.
    pub fn new(player: usize, options: PeerOptions, config: NetplayConfig) -> Self {
        assert!(player < 2, "player slot {player} out of range");
        let flags = StateFlags::new(config.checksum_interval);
        let battle = BattleSync::new(0, config.checksum_interval);
        let read_buf = BytesMut::with_capacity(config.read_chunk);
        Self {
            player,
            options,
            config,
            state: NetState::Unconnected,
            flags,
            transport: None,
            read_buf,
            queue: PacketQueue::new(),
            state_data: None,
            callbacks: Callbacks::default(),
            ready_callback: None,
            reset_callback: None,
            events: EventQueue::new(),
            stats: NetworkStats::default(),
            debug_sink: None,
            battle,
            aborting: false,
            released: false,
        }
    }

    pub fn with_debug_sink(mut self, sink: Box<dyn Write>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn on_connect(&mut self, callback: impl FnMut(&mut Connection) + 'static) {
        self.callbacks.connect = Some(Box::new(callback));
    }

    pub fn on_close(&mut self, callback: impl FnMut(&mut Connection) + 'static) {
        self.callbacks.close = Some(Box::new(callback));
    }

    pub fn on_error(&mut self, callback: impl FnMut(&mut Connection, &NetplayError) + 'static) {
        self.callbacks.error = Some(Box::new(callback));
    }

    pub fn on_delete(&mut self, callback: impl FnMut(&mut Connection) + 'static) {
        self.callbacks.delete = Some(Box::new(callback));
    }

    /// Marks the transport as being set up (listening or connecting).
    pub fn begin_connect(&mut self) -> Result<()> {
        if self.state != NetState::Unconnected || self.flags.disconnected() {
            return Err(NetplayError::InvalidOperation {
                op: "begin_connect",
                state: self.state,
            });
        }
        self.set_state(NetState::Connecting);
        Ok(())
    }

    /// Takes ownership of a connected transport and starts the Init exchange.
    ///
    /// `discriminant` must be set on exactly one of the two ends; by
    /// convention the listening side sets it.
    pub fn establish(&mut self, transport: Box<dyn Transport>, discriminant: bool) -> Result<()> {
        if self.flags.disconnected()
            || !matches!(self.state, NetState::Unconnected | NetState::Connecting)
        {
            return Err(NetplayError::InvalidOperation {
                op: "establish",
                state: self.state,
            });
        }

        self.transport = Some(transport);
        self.flags.link = LinkStatus::Connected;
        self.flags.discriminant = discriminant;
        log::info!(
            "NETPLAY: [{}] Connection established with {}:{}",
            self.player,
            self.options.host,
            self.options.port
        );

        self.set_state(NetState::Init);
        self.send_init()?;
        // Init doubles as the Ready message of the first barrier.
        self.local_ready(
            |conn| {
                conn.set_state(NetState::InSetup);
                conn.events.push(NetEvent::Connected);
            },
            false,
        )?;

        self.run_lifecycle(|c| &mut c.connect);
        Ok(())
    }

    pub fn player(&self) -> usize {
        self.player
    }

    pub fn options(&self) -> &PeerOptions {
        &self.options
    }

    pub fn config(&self) -> &NetplayConfig {
        &self.config
    }

    pub fn state(&self) -> NetState {
        self.state
    }

    pub fn flags(&self) -> &StateFlags {
        &self.flags
    }

    pub fn discriminant(&self) -> bool {
        self.flags.discriminant
    }

    pub fn is_connected(&self) -> bool {
        self.flags.connected()
    }

    pub fn is_disconnected(&self) -> bool {
        self.flags.disconnected()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    pub fn battle(&self) -> &BattleSync {
        &self.battle
    }

    pub fn set_state(&mut self, state: NetState) {
        if state == self.state {
            log::warn!(
                "NETPLAY: [{}]     Connection state set to {} while already in that state",
                self.player,
                state
            );
            return;
        }
        log::debug!(
            "NETPLAY: [{}] +/- Connection state changed to: {}",
            self.player,
            state
        );
        self.state = state;
    }

    pub fn set_checksum_interval(&mut self, interval: u32) {
        self.flags.checksum_interval = interval.max(1);
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = NetEvent> + '_ {
        self.events.drain()
    }

    pub fn pending_events(&self) -> impl Iterator<Item = &NetEvent> {
        self.events.iter()
    }

    pub fn set_state_data(&mut self, data: Box<dyn Any>) {
        self.state_data = Some(data);
    }

    pub fn state_data<T: Any>(&self) -> Option<&T> {
        self.state_data.as_deref().and_then(|d| d.downcast_ref())
    }

    pub fn state_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.state_data.as_deref_mut().and_then(|d| d.downcast_mut())
    }

    pub fn take_state_data(&mut self) -> Option<Box<dyn Any>> {
        self.state_data.take()
    }

    /// Writes as much of the outbound queue as the transport accepts.
    ///
    /// Call once per tick, not from inside callbacks. A transport failure
    /// closes the connection.
    pub fn flush(&mut self) -> Result<FlushStatus> {
        let Some(transport) = self.transport.as_deref_mut() else {
            return Err(NetplayError::NotConnected);
        };
        match self.queue.flush(transport, &mut self.stats) {
            Ok(status) => Ok(status),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Releases the transport, queue, buffers and state data, then runs the
    /// delete callback. Dropping the connection does the same.
    pub fn close(mut self) {
        self.release();
    }

    pub(crate) fn queue_packet(&mut self, packet: Packet) {
        let kind = packet.kind();
        self.trace_packet("==> Queueing", kind);
        self.stats.record_sent(kind);
        self.queue.push(&packet);
    }

    /// Local slot for a side as seen by the sender.
    pub(crate) fn player_for_side(&self, side: NetplaySide) -> usize {
        match side {
            NetplaySide::Local => self.player,
            NetplaySide::Remote => 1 - self.player,
        }
    }

    pub(crate) fn side_for_player(&self, player: usize) -> NetplaySide {
        if player == self.player {
            NetplaySide::Remote
        } else {
            NetplaySide::Local
        }
    }

    pub(crate) fn trace_packet(&mut self, what: &str, kind: PacketType) {
        if kind.is_chatty() {
            log::trace!("NETPLAY: [{}] {} packet of type {}.", self.player, what, kind);
            return;
        }
        log::debug!("NETPLAY: [{}] {} packet of type {}.", self.player, what, kind);
        if let Some(sink) = self.debug_sink.as_mut() {
            let _ = writeln!(sink, "NETPLAY: [{}] {} packet of type {}.", self.player, what, kind);
        }
    }

    /// Fatal error path: reports `err`, closes, and hands the error back.
    pub(crate) fn fail(&mut self, err: NetplayError) -> NetplayError {
        log::error!("NETPLAY: [{}] {}", self.player, err);
        if let Some(mut callback) = self.callbacks.error.take() {
            callback(self, &err);
            if self.callbacks.error.is_none() {
                self.callbacks.error = Some(callback);
            }
        }
        self.disconnect();
        err
    }

    pub(crate) fn flush_best_effort(&mut self) {
        if let Some(transport) = self.transport.as_deref_mut() {
            if let Err(e) = self.queue.flush(transport, &mut self.stats) {
                log::debug!("NETPLAY: [{}] flush during teardown failed: {}", self.player, e);
            }
        }
    }

    /// Closes the transport. Runs the close callback once.
    pub(crate) fn disconnect(&mut self) {
        if self.aborting {
            self.flush_best_effort();
        }
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        if let Err(e) = transport.close() {
            log::warn!("NETPLAY: [{}] closing transport: {}", self.player, e);
        }
        self.flags.link = LinkStatus::Disconnected;
        if self.state != NetState::Unconnected {
            self.set_state(NetState::Unconnected);
        }
        log::info!("NETPLAY: [{}] Connection closed", self.player);
        self.run_lifecycle(|c| &mut c.close);
    }

    fn run_lifecycle(&mut self, slot: fn(&mut Callbacks) -> &mut Option<LifecycleCallback>) {
        if let Some(mut callback) = slot(&mut self.callbacks).take() {
            callback(self);
            let slot = slot(&mut self.callbacks);
            if slot.is_none() {
                *slot = Some(callback);
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.disconnect();
        self.queue.clear();
        self.read_buf = BytesMut::new();
        self.state_data = None;
        self.ready_callback = None;
        self.reset_callback = None;
        if let Some(mut callback) = self.callbacks.delete.take() {
            callback(self);
        }
        if let Some(sink) = self.debug_sink.as_mut() {
            let _ = sink.flush();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("player", &self.player)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("queued", &self.queue.len())
            .field("buffered", &self.read_buf.len())
            .finish_non_exhaustive()
    }
}

/// Adapter so a shared buffer can serve as a debug sink in tests and tools.
#[derive(Debug, Clone, Default)]
pub struct SharedSink(pub std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::net::LoopbackTransport;

    fn connection(player: usize) -> Connection {
        Connection::new(player, PeerOptions::default(), NetplayConfig::default())
    }

    #[test]
    fn establish_queues_init_and_arms_ready() {
        let (a, _b) = LoopbackTransport::pair();
        let mut conn = connection(1);
        let connected = Rc::new(Cell::new(0));
        let seen = connected.clone();
        conn.on_connect(move |_| seen.set(seen.get() + 1));

        conn.establish(Box::new(a), true).unwrap();
        assert_eq!(conn.state(), NetState::Init);
        assert!(conn.flags().ready.local_ready());
        assert_eq!(conn.queue().kinds().collect::<Vec<_>>(), vec![PacketType::Init]);
        assert_eq!(connected.get(), 1);

        assert!(matches!(
            conn.establish(Box::new(LoopbackTransport::pair().0), true),
            Err(NetplayError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn sides_map_relative_to_sender() {
        let conn = connection(0);
        assert_eq!(conn.player_for_side(NetplaySide::Local), 0);
        assert_eq!(conn.player_for_side(NetplaySide::Remote), 1);
        assert_eq!(conn.side_for_player(0), NetplaySide::Remote);
        assert_eq!(conn.side_for_player(1), NetplaySide::Local);
    }

    #[test]
    fn state_data_downcasts() {
        let mut conn = connection(0);
        conn.set_state_data(Box::new(42u32));
        assert_eq!(conn.state_data::<u32>(), Some(&42));
        assert_eq!(conn.state_data::<String>(), None);
        *conn.state_data_mut::<u32>().unwrap() += 1;
        assert_eq!(*conn.take_state_data().unwrap().downcast::<u32>().unwrap(), 43);
    }

    #[test]
    fn close_runs_close_then_delete_once() {
        let (a, _b) = LoopbackTransport::pair();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut conn = connection(0);
        let l = log.clone();
        conn.on_close(move |_| l.borrow_mut().push("close"));
        let l = log.clone();
        conn.on_delete(move |_| l.borrow_mut().push("delete"));

        conn.establish(Box::new(a), false).unwrap();
        conn.close();
        assert_eq!(*log.borrow(), vec!["close", "delete"]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn player_slot_must_be_zero_or_one() {
        connection(2);
    }

    #[test]
    fn drop_releases_like_close() {
        let deleted = Rc::new(Cell::new(false));
        let flag = deleted.clone();
        let mut conn = connection(0);
        conn.on_delete(move |_| flag.set(true));
        drop(conn);
        assert!(deleted.get());
    }

    #[test]
    fn debug_sink_gets_queue_lines() {
        let sink = SharedSink::default();
        let (a, _b) = LoopbackTransport::pair();
        let mut conn = connection(1).with_debug_sink(Box::new(sink.clone()));
        conn.establish(Box::new(a), false).unwrap();
        assert_eq!(
            sink.contents(),
            "NETPLAY: [1] ==> Queueing packet of type Init.\n"
        );
    }
}
