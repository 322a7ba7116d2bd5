use std::sync::mpsc;

use dashboard_core::Ticket;
use encoding_rs::{CoderResult, Decoder};

use crate::EngineEvent;

/// Receives decoded chat text as it arrives.
pub trait ChunkSink: Send + Sync {
    fn chunk(&self, text: String);
}

pub struct ChannelChunkSink {
    ticket: Ticket,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelChunkSink {
    pub fn new(ticket: Ticket, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { ticket, tx }
    }
}

impl ChunkSink for ChannelChunkSink {
    fn chunk(&self, text: String) {
        let _ = self.tx.send(EngineEvent::ChatChunk {
            ticket: self.ticket,
            text,
        });
    }
}

/// Decode one network chunk. Incomplete multi-byte sequences stay buffered in
/// the decoder until the next call; pass `last` once the body has ended.
pub fn decode_chunk(decoder: &mut Decoder, bytes: &[u8], last: bool) -> String {
    let mut out = String::new();
    let mut input = bytes;
    loop {
        let needed = decoder
            .max_utf8_buffer_length(input.len())
            .unwrap_or(input.len() * 3 + 16);
        out.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(input, &mut out, last);
        input = &input[read..];
        match result {
            CoderResult::InputEmpty => return out,
            CoderResult::OutputFull => continue,
        }
    }
}
