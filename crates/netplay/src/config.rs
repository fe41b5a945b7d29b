use std::fmt;

pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 0, minor: 4 };
pub const APP_VERSION: AppVersion = AppVersion {
    major: 0,
    minor: 8,
    patch: 0,
};
pub const MIN_APP_VERSION: AppVersion = APP_VERSION;

pub const DEFAULT_PORT: u16 = 21837;
pub const DEFAULT_CHECKSUM_INTERVAL: u32 = 1;
pub const DEFAULT_READ_CHUNK: usize = 2048;
/// Battle frames per second; also the largest input delay a peer may ask for.
pub const BATTLE_FRAME_RATE: u32 = 24;
pub const FLEET_SIZE: usize = 14;
pub const SHIP_TYPE_COUNT: u8 = 25;
pub const MAX_TEAM_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compile-time defaults for everything the engine negotiates or validates.
#[derive(Debug, Clone)]
pub struct NetplayConfig {
    pub protocol_version: ProtocolVersion,
    pub app_version: AppVersion,
    pub min_app_version: AppVersion,
    pub checksum_interval: u32,
    pub read_chunk: usize,
    pub max_input_delay: u32,
    pub fleet_size: usize,
    pub ship_type_count: u8,
    pub max_team_chars: usize,
}

impl Default for NetplayConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            app_version: APP_VERSION,
            min_app_version: MIN_APP_VERSION,
            checksum_interval: DEFAULT_CHECKSUM_INTERVAL,
            read_chunk: DEFAULT_READ_CHUNK,
            max_input_delay: BATTLE_FRAME_RATE,
            fleet_size: FLEET_SIZE,
            ship_type_count: SHIP_TYPE_COUNT,
            max_team_chars: MAX_TEAM_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOptions {
    pub host: String,
    pub port: u16,
    pub role: PeerRole,
}

impl PeerOptions {
    pub fn server(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            role: PeerRole::Server,
        }
    }

    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            role: PeerRole::Client,
        }
    }

    pub fn is_server(&self) -> bool {
        self.role == PeerRole::Server
    }
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self::server(DEFAULT_PORT)
    }
}
