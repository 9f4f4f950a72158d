pub mod alerts;
pub mod server;
pub mod stream;

pub use alerts::{AlertQuery, ApiResponse};
pub use server::{router, AppState, GatewayServer};
pub use stream::stream_alerts;
