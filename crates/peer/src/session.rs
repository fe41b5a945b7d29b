use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use netmelee::{
    ChecksumVerdict, Connection, NetEvent, NetState, NetplayConfig, NetplayError, ResetReason,
    Result, Transport,
};

use crate::config::PeerConfig;
use crate::events::{DisconnectReason, SessionEvent};
use crate::simulation::{Arena, Pilot};

/// Per-battle state that only the local side keeps.
struct LocalBattle {
    arena: Arena,
    pilot: Pilot,
    /// Own inputs not yet applied, the oldest first.
    local_inputs: VecDeque<u8>,
    /// Frame whose checksum and input have been sent.
    prepared: Option<u32>,
    sync_lost: bool,
}

/// Values negotiated for the round being set up.
#[derive(Debug, Default)]
struct RoundSetup {
    seed: Option<u32>,
    remote_delay: Option<u32>,
    remote_fleet: Vec<Option<u8>>,
    remote_ship: Option<u16>,
    input_delay: u32,
}

/// Drives one connection through setup, battles and teardown without any
/// user interaction.
pub struct Session {
    conn: Connection,
    config: PeerConfig,
    round: u32,
    setup: RoundSetup,
    battle: Option<LocalBattle>,
    /// State whose entry actions have run.
    entered: NetState,
    /// Whether the barrier of the current state has been armed.
    armed: bool,
    round_over: bool,
    resets: Rc<Cell<u32>>,
    finished: Rc<Cell<bool>>,
    pings: HashMap<u32, Instant>,
    next_ping_id: u32,
    last_ping: Instant,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
    outcome: Option<DisconnectReason>,
    pending_events: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(
        config: PeerConfig,
        transport: Box<dyn Transport>,
        discriminant: bool,
        debug_sink: Option<Box<dyn Write>>,
    ) -> Result<Self> {
        let netplay = NetplayConfig {
            checksum_interval: config.checksum_interval,
            ..Default::default()
        };
        let mut conn = Connection::new(config.player, config.options.clone(), netplay);
        if let Some(sink) = debug_sink {
            conn = conn.with_debug_sink(sink);
        }

        conn.on_close(|conn| log::debug!("[{}] Session transport released", conn.player()));
        conn.on_error(|conn, err| {
            log::error!("[{}] Connection error: {} ({:?})", conn.player(), err, err.code());
        });

        let resets = Rc::new(Cell::new(0));
        arm_reset(&mut conn, Rc::clone(&resets));

        conn.begin_connect()?;
        conn.establish(transport, discriminant)?;

        let tick_duration = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate.max(1)));
        Ok(Self {
            conn,
            round: 0,
            setup: RoundSetup::default(),
            battle: None,
            entered: NetState::Init,
            armed: false,
            round_over: false,
            resets,
            finished: Rc::new(Cell::new(false)),
            pings: HashMap::new(),
            next_ping_id: 0,
            last_ping: Instant::now(),
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
            outcome: None,
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn outcome(&self) -> Option<DisconnectReason> {
        self.outcome
    }

    pub fn rounds_played(&self) -> u32 {
        self.round
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn close(self) {
        self.conn.close();
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.accumulator += delta;

        let mut frames = 0;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            frames += 1;
        }
        self.update(frames);
    }

    /// Processes the network and simulates at most `frame_budget` battle
    /// frames.
    pub fn update(&mut self, frame_budget: u32) {
        if self.outcome.is_some() {
            return;
        }

        if let Err(e) = self.conn.data_ready() {
            self.handle_net_error(e);
            return;
        }
        self.handle_net_events();

        if self.resets.get() > 0 {
            self.stop(DisconnectReason::Reset);
            return;
        }

        let result = self.drive(frame_budget).and_then(|()| {
            self.send_ping()?;
            self.conn.flush().map(|_| ())
        });
        if let Err(e) = result {
            self.handle_net_error(e);
            return;
        }

        if self.finished.get() {
            self.stop(DisconnectReason::Finished);
        }
    }

    fn stop(&mut self, reason: DisconnectReason) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(reason);
        self.pending_events
            .push_back(SessionEvent::Disconnected { reason });
        self.running.store(false, Ordering::SeqCst);
    }

    fn handle_net_error(&mut self, err: NetplayError) {
        let reason = match err {
            NetplayError::RemoteClosed if self.finished.get() => DisconnectReason::Finished,
            NetplayError::RemoteClosed => DisconnectReason::RemoteClosed,
            NetplayError::RemoteAbort(_) => DisconnectReason::Aborted,
            _ => {
                self.pending_events.push_back(SessionEvent::Error {
                    message: err.to_string(),
                });
                DisconnectReason::Failed
            }
        };
        self.stop(reason);
    }

    fn handle_net_events(&mut self) {
        let events: Vec<NetEvent> = self.conn.drain_events().collect();
        for event in events {
            match event {
                NetEvent::Connected => self.pending_events.push_back(SessionEvent::Connected),
                NetEvent::RemoteFleetShip { index, ship, .. } => {
                    let index = usize::from(index);
                    if self.setup.remote_fleet.len() <= index {
                        self.setup.remote_fleet.resize(index + 1, None);
                    }
                    self.setup.remote_fleet[index] = Some(ship);
                }
                NetEvent::RemoteTeamName { name, .. } => {
                    self.pending_events
                        .push_back(SessionEvent::RemoteTeam { name });
                }
                NetEvent::ConfirmationCancelled => {
                    log::debug!("Remote setup changed, confirming again");
                    if let Err(e) = self.conn.confirm() {
                        log::warn!("Could not confirm the setup again: {}", e);
                    }
                }
                NetEvent::HandshakeComplete => log::info!("Fleet setup confirmed by both sides"),
                NetEvent::RandomSeed { seed } => self.setup.seed = Some(seed),
                NetEvent::RemoteInputDelay { delay } => self.setup.remote_delay = Some(delay),
                NetEvent::RemoteShipSelected { ship } => self.setup.remote_ship = Some(ship),
                NetEvent::RemoteFrameCount { frame_count } => {
                    log::debug!("Remote side ends the battle at frame {}", frame_count);
                }
                NetEvent::AckReceived { id } => {
                    if let Some(sent) = self.pings.remove(&id) {
                        self.pending_events.push_back(SessionEvent::RoundTrip {
                            id,
                            rtt: sent.elapsed(),
                        });
                    }
                }
                NetEvent::ResetStarted { by_remote, reason } => {
                    log::warn!(
                        "Battle reset started by {} side: {}",
                        if by_remote { "remote" } else { "local" },
                        reason
                    );
                }
                NetEvent::Aborted { by_remote, reason } => {
                    log::warn!(
                        "Connection aborted by {} side: {}",
                        if by_remote { "remote" } else { "local" },
                        reason
                    );
                }
                NetEvent::Desync { frame, .. } => {
                    self.pending_events
                        .push_back(SessionEvent::SyncLost { frame });
                }
            }
        }
    }

    /// Runs entry actions and barriers until the connection state settles.
    fn drive(&mut self, frame_budget: u32) -> Result<()> {
        let mut budget = frame_budget;
        for _ in 0..8 {
            if !self.conn.is_connected() {
                return Ok(());
            }
            let state = self.conn.state();
            if state != self.entered {
                self.entered = state;
                self.armed = false;
                self.enter_state(state)?;
                continue;
            }
            self.run_state(state, &mut budget)?;
            if self.conn.state() == state {
                break;
            }
        }
        Ok(())
    }

    fn enter_state(&mut self, state: NetState) -> Result<()> {
        match state {
            NetState::InSetup => self.begin_setup(),
            NetState::PreBattle => self.begin_negotiation(),
            NetState::SelectShip => self.select_ship(),
            NetState::InBattle => {
                self.begin_battle();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn run_state(&mut self, state: NetState, budget: &mut u32) -> Result<()> {
        match state {
            NetState::PreBattle => {
                if !self.armed && self.setup.seed.is_some() && self.setup.remote_delay.is_some() {
                    self.armed = true;
                    self.conn
                        .local_ready(|conn| conn.set_state(NetState::InterBattle), true)?;
                }
            }
            NetState::InterBattle if !self.armed => {
                self.armed = true;
                if self.round_over {
                    self.finish_round()?;
                } else {
                    self.conn
                        .local_ready(|conn| conn.set_state(NetState::SelectShip), true)?;
                }
            }
            NetState::InBattle | NetState::EndingBattle | NetState::EndingBattle2 => {
                self.run_battle(state, budget)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn begin_setup(&mut self) -> Result<()> {
        self.battle = None;
        self.round_over = false;

        let player = self.config.player;
        self.conn.send_team_name(player, &self.config.team_name)?;
        self.conn.send_fleet(player, &self.config.fleet)?;
        self.conn.confirm()
    }

    fn begin_negotiation(&mut self) -> Result<()> {
        if self.conn.discriminant() {
            let seed = self.config.seed.wrapping_add(self.round);
            self.conn.send_seed_random(seed)?;
            self.setup.seed = Some(seed);
        }
        self.conn.send_input_delay(self.config.input_delay)
    }

    fn select_ship(&mut self) -> Result<()> {
        let remote_delay = self.setup.remote_delay.unwrap_or(0);
        let delay = self.config.input_delay.max(remote_delay);
        self.setup.input_delay = delay;

        let slot = self.round as usize % self.config.fleet.len().max(1);
        self.conn.send_ship_selected(slot as u16)?;
        self.armed = true;
        // Battle bookkeeping has to be in place before the remote side's
        // first input, which may follow its Ready in the same read.
        self.conn.local_ready(
            move |conn| {
                if let Err(e) = conn.start_battle(delay) {
                    log::error!("Could not start battle: {}", e);
                    return;
                }
                conn.set_state(NetState::InBattle);
            },
            true,
        )?;
        Ok(())
    }

    fn begin_battle(&mut self) {
        let local_ship = self
            .config
            .fleet
            .get(self.round as usize % self.config.fleet.len().max(1))
            .copied()
            .unwrap_or(0);
        let remote_ship = self
            .setup
            .remote_ship
            .and_then(|slot| self.setup.remote_fleet.get(usize::from(slot)).copied().flatten())
            .unwrap_or(0);
        let ship_types = if self.config.player == 0 {
            [local_ship, remote_ship]
        } else {
            [remote_ship, local_ship]
        };

        let seed = self.setup.seed.unwrap_or(0);
        let delay = self.setup.input_delay;
        log::info!(
            "Round {} starting: seed {:#010x}, input delay {}, ships {:?}",
            self.round + 1,
            seed,
            delay,
            ship_types
        );
        self.pending_events.push_back(SessionEvent::RoundStarted {
            round: self.round + 1,
            seed,
            input_delay: delay,
        });

        self.battle = Some(LocalBattle {
            arena: Arena::new(seed, ship_types, self.config.max_frames),
            pilot: Pilot::new(self.config.player, self.config.seed),
            local_inputs: std::iter::repeat_n(0, delay as usize).collect(),
            prepared: None,
            sync_lost: false,
        });
    }

    fn run_battle(&mut self, state: NetState, budget: &mut u32) -> Result<()> {
        while *budget > 0 && self.step_frame(state)? {
            *budget -= 1;
        }

        let Some(battle) = self.battle.as_ref() else {
            return Ok(());
        };
        let ready = self.conn.flags().ready;
        match state {
            NetState::InBattle if !ready.local_ready() && !battle.sync_lost => {
                if battle.arena.finished() || ready.remote_ready() {
                    self.conn.local_ready(enter_ending_battle, true)?;
                }
            }
            NetState::EndingBattle2
                if !self.armed && self.conn.frame() >= self.conn.end_frame_count() =>
            {
                self.armed = true;
                self.round_over = true;
                self.conn
                    .local_ready(|conn| conn.set_state(NetState::InterBattle), true)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Simulates one frame. Returns `false` if the frame cannot be run yet
    /// or the battle has reached its final frame.
    fn step_frame(&mut self, state: NetState) -> Result<bool> {
        let Some(battle) = self.battle.as_mut() else {
            return Ok(false);
        };
        if battle.sync_lost {
            return Ok(false);
        }
        let frame = self.conn.frame();
        if state != NetState::InBattle && frame >= self.conn.end_frame_count() {
            return Ok(false);
        }

        if battle.prepared != Some(frame) {
            if frame % self.config.checksum_interval.max(1) == 0 {
                self.conn.send_checksum(frame, battle.arena.checksum())?;
            }
            let input = battle.pilot.next_input(&battle.arena);
            self.conn.send_battle_input(input)?;
            battle.local_inputs.push_back(input);
            battle.prepared = Some(frame);
        }

        let Some(remote_input) = self.conn.pop_remote_input() else {
            return Ok(false);
        };
        let local_input = battle.local_inputs.pop_front().unwrap_or(0);

        let delay = self.setup.input_delay;
        if frame >= delay && (frame - delay) % self.config.checksum_interval.max(1) == 0 {
            match self.conn.verify_checksum(frame - delay) {
                ChecksumVerdict::Match => {}
                verdict => {
                    log::error!(
                        "Lost sync at frame {} ({:?}), resetting",
                        frame - delay,
                        verdict
                    );
                    battle.sync_lost = true;
                    self.conn.local_reset(ResetReason::SyncLoss)?;
                    return Ok(false);
                }
            }
        }

        let inputs = if self.config.player == 0 {
            [local_input, remote_input]
        } else {
            [remote_input, local_input]
        };
        battle.arena.step(inputs);
        self.conn.advance_frame();
        Ok(true)
    }

    fn finish_round(&mut self) -> Result<()> {
        self.round += 1;
        // The remote fleet carries over; only changed slots are sent again.
        self.setup = RoundSetup {
            remote_fleet: std::mem::take(&mut self.setup.remote_fleet),
            ..Default::default()
        };
        if let Some(battle) = self.battle.as_ref() {
            let winner = battle.arena.winner();
            log::info!(
                "Round {} over after {} frames, winner: {}",
                self.round,
                battle.arena.frame(),
                winner.map_or("none".to_string(), |p| format!("player {}", p))
            );
            self.pending_events.push_back(SessionEvent::RoundFinished {
                round: self.round,
                frames: battle.arena.frame(),
                winner,
            });
        }

        if self.round < self.config.rounds {
            self.conn
                .local_ready(|conn| conn.set_state(NetState::InSetup), true)?;
        } else {
            let finished = Rc::clone(&self.finished);
            self.conn.local_ready(move |_| finished.set(true), true)?;
        }
        Ok(())
    }

    fn send_ping(&mut self) -> Result<()> {
        if !self.conn.state().past_init() || self.last_ping.elapsed() < self.config.ping_interval {
            return Ok(());
        }
        let id = self.next_ping_id;
        self.next_ping_id = self.next_ping_id.wrapping_add(1);
        self.conn.send_ping(id)?;
        self.pings.insert(id, Instant::now());
        self.last_ping = Instant::now();
        Ok(())
    }
}

/// Keeps a reset callback armed for the whole session. A completed reset
/// sends the connection back to fleet setup.
fn arm_reset(conn: &mut Connection, resets: Rc<Cell<u32>>) {
    conn.set_reset_callback(move |conn| {
        resets.set(resets.get() + 1);
        conn.set_state(NetState::InSetup);
        arm_reset(conn, resets);
    });
}

/// Both sides want the battle to end: announce the last frame we will
/// simulate, then wait for the remote side's.
fn enter_ending_battle(conn: &mut Connection) {
    conn.set_state(NetState::EndingBattle);
    // One past the current frame, so the remote side still gets one more
    // input from us after it learns the count.
    let frame_count = conn.frame().wrapping_add(1);
    if let Err(e) = conn.send_frame_count(frame_count) {
        log::error!("Could not send frame count: {}", e);
        return;
    }
    if let Err(e) = conn.local_ready(|conn| conn.set_state(NetState::EndingBattle2), false) {
        log::error!("Could not wait for the remote frame count: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use netmelee::{LoopbackTransport, PeerOptions};

    use super::*;

    fn config(player: usize, input_delay: u32) -> PeerConfig {
        let options = if player == 1 {
            PeerOptions::server(0)
        } else {
            PeerOptions::client("127.0.0.1", 0)
        };
        PeerConfig {
            input_delay,
            max_frames: 90,
            ping_interval: Duration::from_millis(0),
            ..PeerConfig::for_options(options)
        }
    }

    fn pair(server: PeerConfig, client: PeerConfig) -> (Session, Session) {
        let (a, b) = LoopbackTransport::pair();
        let server = Session::new(server, Box::new(a), true, None).unwrap();
        let client = Session::new(client, Box::new(b), false, None).unwrap();
        (server, client)
    }

    fn play(server: &mut Session, client: &mut Session) {
        for _ in 0..20_000 {
            server.update(3);
            client.update(3);
            if server.outcome().is_some() && client.outcome().is_some() {
                return;
            }
        }
        panic!(
            "session did not finish: server {:?}, client {:?}",
            server.connection().state(),
            client.connection().state()
        );
    }

    fn events(session: &mut Session) -> Vec<SessionEvent> {
        session.drain_events().collect()
    }

    #[test]
    fn test_full_match_over_loopback() {
        let (mut server, mut client) = pair(config(1, 2), config(0, 2));
        play(&mut server, &mut client);

        assert_eq!(server.outcome(), Some(DisconnectReason::Finished));
        assert_eq!(client.outcome(), Some(DisconnectReason::Finished));
        assert_eq!(server.rounds_played(), 1);
        assert_eq!(client.rounds_played(), 1);

        let server_events = events(&mut server);
        let client_events = events(&mut client);
        for events in [&server_events, &client_events] {
            assert!(events.iter().any(|e| matches!(e, SessionEvent::Connected)));
            assert!(!events.iter().any(|e| matches!(e, SessionEvent::SyncLost { .. })));
        }

        let finished = |events: &[SessionEvent]| {
            events.iter().find_map(|e| match e {
                SessionEvent::RoundFinished { frames, winner, .. } => Some((*frames, *winner)),
                _ => None,
            })
        };
        let server_result = finished(&server_events).unwrap();
        assert_eq!(Some(server_result), finished(&client_events));
        assert!(server_result.0 > 0);
    }

    #[test]
    fn test_larger_input_delay_wins() {
        let (mut server, mut client) = pair(config(1, 1), config(0, 4));
        play(&mut server, &mut client);

        for session in [&mut server, &mut client] {
            assert_eq!(session.outcome(), Some(DisconnectReason::Finished));
            let delay = events(session).into_iter().find_map(|e| match e {
                SessionEvent::RoundStarted { input_delay, .. } => Some(input_delay),
                _ => None,
            });
            assert_eq!(delay, Some(4));
        }
    }

    #[test]
    fn test_several_rounds_share_the_connection() {
        let mut server = config(1, 2);
        let mut client = config(0, 2);
        server.rounds = 3;
        client.rounds = 3;
        let (mut server, mut client) = pair(server, client);
        play(&mut server, &mut client);

        assert_eq!(server.outcome(), Some(DisconnectReason::Finished));
        assert_eq!(server.rounds_played(), 3);
        assert_eq!(client.rounds_played(), 3);

        let seeds: Vec<u32> = events(&mut client)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::RoundStarted { seed, .. } => Some(seed),
                _ => None,
            })
            .collect();
        assert_eq!(seeds.len(), 3);
        assert_ne!(seeds[0], seeds[1]);
    }

    #[test]
    fn test_remote_close_ends_session() {
        let (mut server, client) = pair(config(1, 2), config(0, 2));
        client.close();
        for _ in 0..4 {
            server.update(1);
        }
        assert_eq!(server.outcome(), Some(DisconnectReason::RemoteClosed));
        let reasons: Vec<_> = events(&mut server)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Disconnected { reason } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![DisconnectReason::RemoteClosed]);
    }
}
