//! Dashboard engine: network IO for prediction, artifact, traffic and chat endpoints.
mod client;
mod engine;
mod stream;
mod types;
mod wire;

pub use client::{ClientSettings, ReqwestClient, SubmissionClient, CHAT_ENDPOINT, TRAFFIC_ENDPOINT};
pub use engine::{EngineCommand, EngineHandle};
pub use stream::{decode_chunk, ChannelChunkSink, ChunkSink};
pub use types::{ChatRequest, ClientError, EngineEvent, FailureKind, StartError};
pub use wire::{decode_forecast, decode_outcome, error_detail};
