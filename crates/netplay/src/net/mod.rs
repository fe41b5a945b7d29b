mod connection;
mod flags;
mod handlers;
mod notify;
mod queue;
mod recv;
mod state;
mod stats;
mod transport;

pub use connection::{
    Connection, ErrorCallback, LifecycleCallback, ReadyCallback, ResetCallback, SharedSink,
};
pub use flags::{
    Agreement, HandshakeFlags, LinkStatus, LocalConfirm, ReadyFlags, ResetFlags, StateFlags,
};
pub use queue::{FlushStatus, PacketQueue};
pub use state::NetState;
pub use stats::NetworkStats;
pub use transport::{LoopbackControl, LoopbackTransport, Transport};
