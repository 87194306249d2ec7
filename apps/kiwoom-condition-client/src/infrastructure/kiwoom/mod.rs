//! Kiwoom Condition-Search Adapter
//!
//! WebSocket client for the gateway's condition-search protocol:
//!
//! - **Connection**: transport ownership and the `LOGIN` handshake
//! - **Dispatcher**: the single reader; echoes `PING`, files responses
//! - **Correlator**: keyed single-slot mailboxes between reader and caller
//! - **Client**: condition list, general/realtime search, realtime clear
//!
//! # Endpoints
//!
//! - Live: `wss://api.kiwoom.com:10000/api/dostk/websocket`
//! - Mock: `wss://mockapi.kiwoom.com:10000/api/dostk/websocket`

pub mod auth;
pub mod codec;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod keepalive;
pub mod messages;
pub mod session;
pub mod submitter;

pub use auth::{AccessToken, AuthError};
pub use codec::{CodecError, FrameCodec, InboundFrame};
pub use connection::{ConnectionError, ConnectionManager};
pub use correlator::{PendingResponse, PutOutcome, ResponseCorrelator};
pub use dispatcher::{DispatchExit, MessageDispatcher};
pub use error::ConditionSearchError;
pub use keepalive::{KeepaliveSnapshot, KeepaliveState};
pub use messages::*;
pub use session::{Session, SessionConfig, SessionContext};
pub use submitter::{ConditionSearchClient, GatewayConfig, ResponseWait};

/// Live gateway WebSocket URL.
pub const LIVE_WS_URL: &str = "wss://api.kiwoom.com:10000/api/dostk/websocket";

/// Mock-trading gateway WebSocket URL.
pub const MOCK_WS_URL: &str = "wss://mockapi.kiwoom.com:10000/api/dostk/websocket";
