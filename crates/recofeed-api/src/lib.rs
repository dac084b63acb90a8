// recofeed-api: Server-Sent Events transport for the recommendation push endpoint

pub mod error;
pub mod sse;
pub mod stream;
pub mod transport;
pub mod wire;

pub use error::Error;
pub use sse::{SseDecoder, SseFrame};
pub use stream::{
    Connector, EventSourceConnector, Generation, TransportError, TransportEvent,
    TransportEventKind, TransportHandle, TransportSink,
};
pub use transport::{TlsMode, TransportConfig};
pub use wire::{HEARTBEAT_SENTINEL, WireRecommendation};
