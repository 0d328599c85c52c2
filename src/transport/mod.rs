pub mod bridge;
pub mod connector;
pub mod messages;

pub use bridge::{from_transport_text, to_transport_text};
pub use connector::{LiveChannel, LiveConnector, LoopbackConnector, RemoteEnd, TransportEvent};
pub use messages::{
    parse_pcm_rate, ClientMessage, EncodedChunk, MediaBlob, Modality, ServerMessage, SessionSetup,
};
