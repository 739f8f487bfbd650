// Real-time activity log stream
//
// Keeps a live feed of activity events flowing to one consumer:
// - Exchanges the console session for a short-lived stream token
// - Opens the WebSocket stream and decodes one event per message
// - Buffers new events until the consumer drains them
// - Reconnects after a fixed delay whenever the socket closes
//
// Each consumer owns its LogStream; dropping or stopping it tears the
// connection down. There is no process-wide connection state.

pub mod buffer;
pub mod config;
pub mod error;
pub mod manager;
pub mod state;
pub mod token;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::EventBuffer;
pub use config::{resolve_ws_base, StreamConfig, StreamFilters};
pub use error::{Result, StreamError};
pub use manager::LogStream;
pub use state::{Phase, Signal};
pub use token::{HttpTokenSource, StaticTokenSource, TokenSource};
pub use transport::{Connection, Transport, TransportEvent, WsTransport};
