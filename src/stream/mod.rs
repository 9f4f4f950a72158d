pub mod connection;
pub mod registry;

pub use connection::{serve_connection, DisconnectReason, EventWriter};
pub use registry::{
    BroadcastReport, ClientId, ClientSink, DropReason, FanoutRegistry, FanoutStats,
    HeartbeatOutcome, StreamEvent,
};
