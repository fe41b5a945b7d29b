use std::time::Duration;

use netmelee::PeerOptions;
use netmelee::config::{BATTLE_FRAME_RATE, DEFAULT_CHECKSUM_INTERVAL};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub options: PeerOptions,
    /// Local player slot. The listening side plays as player 1.
    pub player: usize,
    pub team_name: String,
    /// Ship types, one per fleet slot.
    pub fleet: Vec<u8>,
    pub input_delay: u32,
    pub checksum_interval: u32,
    pub frame_rate: u32,
    /// Frame at which a battle ends even if both ships survive.
    pub max_frames: u32,
    pub rounds: u32,
    pub seed: u32,
    pub ping_interval: Duration,
}

impl PeerConfig {
    pub fn for_options(options: PeerOptions) -> Self {
        let player = if options.is_server() { 1 } else { 0 };
        Self {
            options,
            player,
            ..Default::default()
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            options: PeerOptions::default(),
            player: 1,
            team_name: "Headless".to_string(),
            fleet: vec![0, 5, 10, 15],
            input_delay: 2,
            checksum_interval: DEFAULT_CHECKSUM_INTERVAL,
            frame_rate: BATTLE_FRAME_RATE,
            max_frames: BATTLE_FRAME_RATE * 60,
            rounds: 1,
            seed: 0x5EED,
            ping_interval: Duration::from_secs(2),
        }
    }
}
