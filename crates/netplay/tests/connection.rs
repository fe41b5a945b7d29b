use std::cell::{Cell, RefCell};
use std::rc::Rc;

use netmelee::net::LoopbackControl;
use netmelee::{
    AbortReason, AppVersion, ChecksumVerdict, Connection, DEFAULT_PORT, ErrorCode, FlushStatus,
    LoopbackTransport, NetEvent, NetState, NetplayConfig, NetplayError, NetplaySide, Packet,
    PacketType, PeerOptions, ResetReason,
};

struct Peers {
    server: Connection,
    client: Connection,
    server_wire: LoopbackControl,
    client_wire: LoopbackControl,
}

fn connect_with(server_config: NetplayConfig, client_config: NetplayConfig) -> Peers {
    let (server_end, client_end) = LoopbackTransport::pair();
    let server_wire = server_end.control();
    let client_wire = client_end.control();

    // Slot 0 holds the server's player on both ends.
    let mut server = Connection::new(1, PeerOptions::server(DEFAULT_PORT), server_config);
    let mut client = Connection::new(
        0,
        PeerOptions::client("127.0.0.1", DEFAULT_PORT),
        client_config,
    );
    server.establish(Box::new(server_end), true).unwrap();
    client.establish(Box::new(client_end), false).unwrap();

    Peers {
        server,
        client,
        server_wire,
        client_wire,
    }
}

fn connect() -> Peers {
    connect_with(NetplayConfig::default(), NetplayConfig::default())
}

/// Shuttles packets back and forth until both sides are quiet.
fn pump(peers: &mut Peers) {
    for _ in 0..32 {
        let before = peers.server.stats().packets_received + peers.client.stats().packets_received;
        peers.server.flush().unwrap();
        peers.client.flush().unwrap();
        peers.server.data_ready().unwrap();
        peers.client.data_ready().unwrap();
        let after = peers.server.stats().packets_received + peers.client.stats().packets_received;

        let idle = peers.server.queue().is_empty()
            && peers.client.queue().is_empty()
            && peers.server_wire.in_flight() == 0
            && peers.client_wire.in_flight() == 0;
        if after == before && idle {
            return;
        }
    }
    panic!("peers did not settle");
}

fn connect_in_setup() -> Peers {
    let mut peers = connect();
    pump(&mut peers);
    assert_eq!(peers.server.state(), NetState::InSetup);
    assert_eq!(peers.client.state(), NetState::InSetup);
    peers.server.drain_events().for_each(drop);
    peers.client.drain_events().for_each(drop);
    peers
}

fn enter(peers: &mut Peers, state: NetState) {
    peers.server.set_state(state);
    peers.client.set_state(state);
}

fn total_sent(peers: &Peers, kind: PacketType) -> u64 {
    peers.server.stats().sent(kind) + peers.client.stats().sent(kind)
}

#[test]
fn test_setup_to_prebattle_full_flow() {
    let mut peers = connect();
    pump(&mut peers);

    assert_eq!(peers.server.state(), NetState::InSetup);
    assert_eq!(peers.client.state(), NetState::InSetup);
    assert_eq!(
        peers.client.drain_events().collect::<Vec<_>>(),
        vec![NetEvent::Connected]
    );

    peers.server.send_fleet(0, &[4, 7]).unwrap();
    peers.server.send_team_name(0, "Kohr-Ah Death Squad").unwrap();
    pump(&mut peers);

    assert_eq!(
        peers.client.drain_events().collect::<Vec<_>>(),
        vec![
            NetEvent::RemoteFleetShip {
                player: 0,
                index: 0,
                ship: 4
            },
            NetEvent::RemoteFleetShip {
                player: 0,
                index: 1,
                ship: 7
            },
            NetEvent::RemoteTeamName {
                player: 0,
                name: "Kohr-Ah Death Squad".to_string()
            },
        ]
    );

    peers.server.confirm().unwrap();
    pump(&mut peers);
    peers.client.confirm().unwrap();
    pump(&mut peers);

    assert_eq!(peers.server.state(), NetState::PreBattle);
    assert_eq!(peers.client.state(), NetState::PreBattle);
    assert_eq!(total_sent(&peers, PacketType::Handshake0), 1);
    assert_eq!(total_sent(&peers, PacketType::Handshake1), 2);
    assert!(
        peers
            .server
            .drain_events()
            .any(|e| e == NetEvent::HandshakeComplete)
    );
}

#[test]
fn test_bad_setup_values_stay_local() {
    let mut peers = connect_in_setup();

    assert!(peers.server.send_fleet_ship(0, 200, 3).is_err());
    assert!(peers.server.send_fleet(0, &[99]).is_err());
    peers.server.send_team_name(0, "ab\0cd").unwrap();
    pump(&mut peers);

    assert!(peers.client.is_connected());
    assert_eq!(
        peers.client.drain_events().collect::<Vec<_>>(),
        vec![NetEvent::RemoteTeamName {
            player: 0,
            name: "ab".to_string()
        }]
    );
}

#[test]
fn test_simultaneous_confirm_converges() {
    let mut peers = connect_in_setup();
    peers.server.confirm().unwrap();
    peers.client.confirm().unwrap();
    pump(&mut peers);

    assert_eq!(peers.server.state(), NetState::PreBattle);
    assert_eq!(peers.client.state(), NetState::PreBattle);
    assert_eq!(total_sent(&peers, PacketType::Handshake0), 2);
    assert_eq!(total_sent(&peers, PacketType::Handshake1), 2);
}

#[test]
fn test_cancel_and_reconfirm_before_delivery() {
    let mut peers = connect_in_setup();
    peers.server.confirm().unwrap();
    peers.server.cancel_confirmation().unwrap();
    peers.server.confirm().unwrap();
    pump(&mut peers);

    // The reconfirmation went out once the cancel was acknowledged.
    assert_eq!(peers.server.state(), NetState::InSetup);
    assert!(peers.client.flags().handshake.remote_ok());

    peers.client.confirm().unwrap();
    pump(&mut peers);
    assert_eq!(peers.server.state(), NetState::PreBattle);
    assert_eq!(peers.client.state(), NetState::PreBattle);
}

#[test]
fn test_cancel_racing_remote_confirm() {
    let mut peers = connect_in_setup();
    peers.server.confirm().unwrap();
    peers.client.confirm().unwrap();
    peers.server.cancel_confirmation().unwrap();
    pump(&mut peers);

    assert_eq!(peers.server.state(), NetState::InSetup);
    assert_eq!(peers.client.state(), NetState::InSetup);
    assert!(!peers.server.flags().handshake.local_ok());
    assert!(peers.client.flags().handshake.local_ok());

    peers.server.confirm().unwrap();
    pump(&mut peers);
    assert_eq!(peers.server.state(), NetState::PreBattle);
    assert_eq!(peers.client.state(), NetState::PreBattle);
}

#[test]
fn test_remote_fleet_change_withdraws_confirmation() {
    let mut peers = connect_in_setup();
    peers.server.confirm().unwrap();
    pump(&mut peers);

    peers.client.send_fleet_ship(1, 3, 12).unwrap();
    pump(&mut peers);

    let events: Vec<_> = peers.server.drain_events().collect();
    assert_eq!(
        events,
        vec![
            NetEvent::ConfirmationCancelled,
            NetEvent::RemoteFleetShip {
                player: 1,
                index: 3,
                ship: 12
            },
        ]
    );
    assert!(!peers.server.flags().handshake.local_ok());
    assert!(!peers.server.flags().handshake.canceling());
    assert!(!peers.client.flags().handshake.remote_ok());
    assert_eq!(total_sent(&peers, PacketType::HandshakeCancelAck), 1);

    peers.server.confirm().unwrap();
    peers.client.confirm().unwrap();
    pump(&mut peers);
    assert_eq!(peers.server.state(), NetState::PreBattle);
}

fn setup_stream() -> Vec<u8> {
    let config = NetplayConfig::default();
    [
        Packet::init(&config),
        Packet::fleet(NetplaySide::Remote, &[1, 2, 3]),
        Packet::TeamName {
            side: NetplaySide::Local,
            name: "Mycon".to_string(),
        },
        Packet::Ping { id: 99 },
    ]
    .iter()
    .flat_map(|p| p.encode())
    .collect()
}

fn fresh_connection() -> Connection {
    let (end, _other) = LoopbackTransport::pair();
    let mut conn = Connection::new(1, PeerOptions::default(), NetplayConfig::default());
    conn.establish(Box::new(end), false).unwrap();
    conn
}

#[test]
fn test_byte_by_byte_matches_bulk() {
    let stream = setup_stream();

    let mut bulk = fresh_connection();
    bulk.receive(&stream).unwrap();

    let mut trickle = fresh_connection();
    for byte in &stream {
        trickle.receive(std::slice::from_ref(byte)).unwrap();
    }

    let bulk_events: Vec<_> = bulk.drain_events().collect();
    let trickle_events: Vec<_> = trickle.drain_events().collect();
    assert_eq!(bulk_events.len(), 5);
    assert_eq!(bulk_events, trickle_events);
    assert_eq!(
        bulk.queue().kinds().collect::<Vec<_>>(),
        trickle.queue().kinds().collect::<Vec<_>>()
    );
    assert_eq!(trickle.stats().packets_received, 4);
    assert_eq!(trickle.state(), NetState::InSetup);
}

#[test]
fn test_fifo_order_under_partial_writes() {
    let mut peers = connect_in_setup();
    peers.client_wire.set_write_limit(Some(3));
    peers.server_wire.set_write_limit(Some(5));

    for id in 0..20 {
        peers.client.send_ping(id).unwrap();
    }
    pump(&mut peers);

    let acks: Vec<u32> = peers
        .client
        .drain_events()
        .filter_map(|e| match e {
            NetEvent::AckReceived { id } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(acks, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_flush_would_block_keeps_queue() {
    let mut peers = connect_in_setup();
    peers.server_wire.set_blocked(true);
    peers.server.send_ping(1).unwrap();
    peers.server.send_ping(2).unwrap();

    assert_eq!(peers.server.flush().unwrap(), FlushStatus::WouldBlock);
    assert_eq!(peers.server.queue().len(), 2);

    peers.server_wire.set_blocked(false);
    assert_eq!(peers.server.flush().unwrap(), FlushStatus::Drained);
    assert!(peers.server.queue().is_empty());
}

#[test]
fn test_ready_barrier_fires_once_and_rearms() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::PreBattle);

    let server_fired = Rc::new(Cell::new(0));
    let client_fired = Rc::new(Cell::new(0));

    for round in 1..=2 {
        let count = server_fired.clone();
        peers
            .server
            .local_ready(move |_| count.set(count.get() + 1), true)
            .unwrap();
        pump(&mut peers);
        assert_eq!(server_fired.get(), round - 1);

        let count = client_fired.clone();
        let completed = peers
            .client
            .local_ready(move |_| count.set(count.get() + 1), true)
            .unwrap();
        assert!(completed);
        pump(&mut peers);

        assert_eq!(server_fired.get(), round);
        assert_eq!(client_fired.get(), round);
        assert!(!peers.server.flags().ready.local_ready());
        assert!(!peers.client.flags().ready.remote_ready());
    }
}

#[test]
fn test_simultaneous_reset() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::InBattle);

    let completed = Rc::new(RefCell::new(Vec::new()));
    let log = completed.clone();
    peers
        .server
        .set_reset_callback(move |conn| log.borrow_mut().push(conn.player()));
    let log = completed.clone();
    peers
        .client
        .set_reset_callback(move |conn| log.borrow_mut().push(conn.player()));

    // Sent before the client reset; arrives while the server is resetting.
    peers.client.send_battle_input(0x05).unwrap();
    peers.server.local_reset(ResetReason::ManualReset).unwrap();
    peers.client.local_reset(ResetReason::ManualReset).unwrap();
    pump(&mut peers);

    assert_eq!(peers.server.stats().sent(PacketType::Reset), 1);
    assert_eq!(peers.client.stats().sent(PacketType::Reset), 1);
    assert_eq!(completed.borrow().len(), 2);
    assert!(!peers.server.flags().reset.any());
    assert!(!peers.client.flags().reset.any());
    assert!(peers.server.is_connected());
    assert_eq!(peers.server.pop_remote_input(), None);
}

#[test]
fn test_one_sided_reset_is_echoed() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::InBattle);

    let done = Rc::new(Cell::new(false));
    let flag = done.clone();
    peers.server.set_reset_callback(move |_| flag.set(true));
    peers.server.local_reset(ResetReason::SyncLoss).unwrap();
    pump(&mut peers);

    assert!(done.get());
    assert_eq!(
        peers.client.drain_events().collect::<Vec<_>>(),
        vec![NetEvent::ResetStarted {
            by_remote: true,
            reason: ResetReason::SyncLoss
        }]
    );
    // The client completes once it arms its own callback.
    let done = Rc::new(Cell::new(false));
    let flag = done.clone();
    peers.client.set_reset_callback(move |_| flag.set(true));
    assert!(done.get());
}

#[test]
fn test_gameplay_after_remote_reset_is_ignored() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::InBattle);
    peers.client.start_battle(0).unwrap();

    // Queued behind the Reset; the client has not armed its callback yet.
    peers.server.local_reset(ResetReason::ManualReset).unwrap();
    peers.server.send_battle_input(0x03).unwrap();
    pump(&mut peers);

    assert!(peers.client.is_connected());
    assert!(peers.client.flags().reset.local_reset());
    assert!(peers.client.flags().reset.remote_reset());
    assert_eq!(peers.client.pop_remote_input(), None);
}

#[test]
fn test_checksum_window_and_desync() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::InBattle);
    peers.server.start_battle(2).unwrap();
    peers.client.start_battle(2).unwrap();
    peers.client.set_frame(10);

    for frame in [7, 8, 13, 14] {
        peers.server.send_checksum(frame, 1000 + frame).unwrap();
    }
    pump(&mut peers);

    let remote = &peers.client.battle().remote_checksums;
    assert_eq!(remote.get(7), None);
    assert_eq!(remote.get(8), Some(1008));
    assert_eq!(remote.get(13), Some(1013));
    assert_eq!(remote.get(14), None);
    assert!(peers.client.is_connected());

    peers.client.send_checksum(8, 1008).unwrap();
    peers.client.send_checksum(13, 4242).unwrap();
    assert_eq!(peers.client.verify_checksum(8), ChecksumVerdict::Match);
    assert_eq!(
        peers.client.verify_checksum(13),
        ChecksumVerdict::Mismatch {
            local: 4242,
            remote: 1013
        }
    );
    assert_eq!(peers.client.verify_checksum(7), ChecksumVerdict::Missing);
    assert_eq!(
        peers.client.drain_events().collect::<Vec<_>>(),
        vec![NetEvent::Desync {
            frame: 13,
            local: 4242,
            remote: 1013
        }]
    );
}

#[test]
fn test_battle_input_flows_after_delay() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::InBattle);
    peers.server.start_battle(1).unwrap();
    peers.client.start_battle(1).unwrap();

    peers.client.send_battle_input(0x21).unwrap();
    pump(&mut peers);

    assert_eq!(peers.server.pop_remote_input(), Some(0));
    assert_eq!(peers.server.pop_remote_input(), Some(0x21));
    assert_eq!(peers.server.pop_remote_input(), None);
}

#[test]
fn test_input_buffer_overflow_closes() {
    let mut peers = connect_in_setup();
    enter(&mut peers, NetState::InBattle);
    peers.server.start_battle(0).unwrap();
    peers.client.start_battle(0).unwrap();

    for _ in 0..3 {
        peers.client.send_battle_input(1).unwrap();
    }
    peers.client.flush().unwrap();
    let err = peers.server.data_ready().unwrap_err();
    assert!(matches!(err, NetplayError::InputBufferFull));
    assert_eq!(err.code(), ErrorCode::NoBuffers);
    assert!(peers.server.is_disconnected());
}

#[test]
fn test_version_mismatch_aborts() {
    let strict = NetplayConfig {
        min_app_version: AppVersion {
            major: 0,
            minor: 9,
            patch: 0,
        },
        ..NetplayConfig::default()
    };
    let mut peers = connect_with(strict, NetplayConfig::default());

    let codes = Rc::new(RefCell::new(Vec::new()));
    let seen = codes.clone();
    peers
        .server
        .on_error(move |_, err| seen.borrow_mut().push(err.code()));

    peers.server.flush().unwrap();
    peers.client.flush().unwrap();

    let err = peers.server.data_ready().unwrap_err();
    assert!(matches!(err, NetplayError::AppVersion { .. }));
    assert!(peers.server.is_disconnected());
    assert_eq!(peers.server.state(), NetState::Unconnected);
    assert_eq!(*codes.borrow(), vec![ErrorCode::NotSupported]);
    assert_eq!(
        peers.server.drain_events().collect::<Vec<_>>(),
        vec![NetEvent::Aborted {
            by_remote: false,
            reason: AbortReason::VersionMismatch
        }]
    );

    let err = peers.client.data_ready().unwrap_err();
    assert!(matches!(
        err,
        NetplayError::RemoteAbort(AbortReason::VersionMismatch)
    ));
    assert!(
        peers.client.drain_events().any(|e| e
            == NetEvent::Aborted {
                by_remote: true,
                reason: AbortReason::VersionMismatch
            })
    );
    assert!(peers.client.is_disconnected());
}

#[test]
fn test_local_abort_reaches_remote() {
    let mut peers = connect_in_setup();
    peers.client.abort(AbortReason::InvalidHash).unwrap();
    assert!(peers.client.is_disconnected());
    assert!(peers.client.abort(AbortReason::InvalidHash).is_err());

    let err = peers.server.data_ready().unwrap_err();
    assert!(matches!(
        err,
        NetplayError::RemoteAbort(AbortReason::InvalidHash)
    ));
}

#[test]
fn test_invalid_type_is_fatal() {
    let mut conn = fresh_connection();
    let errors = Rc::new(Cell::new(0));
    let closes = Rc::new(Cell::new(0));
    let e = errors.clone();
    conn.on_error(move |_, err| {
        assert_eq!(err.code(), ErrorCode::BadMessage);
        e.set(e.get() + 1);
    });
    let c = closes.clone();
    conn.on_close(move |_| c.set(c.get() + 1));

    let err = conn.receive(&[0, 4, 0, 42]).unwrap_err();
    assert!(matches!(err, NetplayError::InvalidType(42)));
    assert_eq!(errors.get(), 1);
    assert_eq!(closes.get(), 1);
    assert!(conn.is_disconnected());
    assert!(matches!(
        conn.receive(&[0, 4, 0, 3]),
        Err(NetplayError::NotConnected)
    ));
}

#[test]
fn test_packet_in_wrong_state_is_fatal() {
    let mut conn = fresh_connection();
    let err = conn.receive(&Packet::Handshake0.encode()).unwrap_err();
    assert!(matches!(
        err,
        NetplayError::WrongState {
            kind: PacketType::Handshake0,
            state: NetState::Init
        }
    ));
}

#[test]
fn test_invalid_ship_type_is_rejected() {
    let mut conn = fresh_connection();
    let mut stream = Packet::init(&NetplayConfig::default()).encode().to_vec();
    stream.extend_from_slice(&Packet::fleet(NetplaySide::Local, &[3, 200]).encode());

    let err = conn.receive(&stream).unwrap_err();
    assert!(matches!(
        err,
        NetplayError::Malformed {
            kind: PacketType::Fleet,
            ..
        }
    ));
    // Nothing from the rejected packet was applied.
    assert!(
        !conn
            .drain_events()
            .any(|e| matches!(e, NetEvent::RemoteFleetShip { .. }))
    );
}

#[test]
fn test_remote_close_is_reported() {
    let mut peers = connect_in_setup();
    let closed = Rc::new(Cell::new(false));
    let flag = closed.clone();
    peers.server.on_close(move |_| flag.set(true));

    peers.client.close();
    let err = peers.server.data_ready().unwrap_err();
    assert!(matches!(err, NetplayError::RemoteClosed));
    assert!(closed.get());
    assert!(peers.server.is_disconnected());
}
