//! Station chat: an append-only conversation whose newest assistant reply
//! grows in place while its stream is open.

use dashboard_logging::{dash_debug, dash_info, dash_warn};

use crate::effect::Effect;
use crate::result::Failure;
use crate::state::TicketSeq;
use crate::Ticket;

pub const CHAT_ERROR_TEXT: &str = "Sorry, an error occurred. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// False only for the assistant reply whose stream is still open.
    pub finalized: bool,
}

/// Buffers decoded chunks strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamAccumulator {
    buffer: String,
    chunks: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the text received so far.
    pub fn push(&mut self, chunk: &str) -> &str {
        self.buffer.push_str(chunk);
        self.chunks += 1;
        &self.buffer
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenStream {
    ticket: Ticket,
    accumulator: StreamAccumulator,
    /// Index of the in-progress assistant message once the first chunk arrived.
    reply_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversation {
    station_id: Option<String>,
    input: String,
    messages: Vec<ChatMessage>,
    next_message_id: u64,
    open: Option<OpenStream>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn station_id(&self) -> Option<&str> {
        self.station_id.as_deref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    pub fn can_submit(&self) -> bool {
        !self.is_streaming() && self.station_id.is_some() && !self.input.trim().is_empty()
    }

    pub(crate) fn awaits(&self, ticket: Ticket) -> bool {
        self.open.as_ref().is_some_and(|open| open.ticket == ticket)
    }

    pub(crate) fn set_input(&mut self, text: String) {
        self.input = text;
    }

    /// Switch station. An open stream is finalized as-is and its ticket
    /// returned so the caller can cancel it.
    pub(crate) fn select_station(&mut self, station_id: String) -> Option<Ticket> {
        let station_id = station_id.trim().to_string();
        if self.station_id.as_deref() == Some(station_id.as_str()) {
            return None;
        }
        self.station_id = (!station_id.is_empty()).then_some(station_id);
        self.abandon_stream()
    }

    pub(crate) fn submit(&mut self, tickets: &mut TicketSeq) -> Option<Effect> {
        if self.is_streaming() {
            dash_warn!("Chat submit ignored: a reply is still streaming");
            return None;
        }
        let Some(station_id) = self.station_id.clone() else {
            dash_warn!("Chat submit ignored: no station selected");
            return None;
        };
        if self.input.trim().is_empty() {
            return None;
        }

        let message = std::mem::take(&mut self.input);
        self.push_message(Role::User, message.clone(), true);
        let ticket = tickets.next();
        self.open = Some(OpenStream {
            ticket,
            accumulator: StreamAccumulator::new(),
            reply_index: None,
        });
        dash_info!("Chat turn for station {} opened (ticket {})", station_id, ticket);
        Some(Effect::OpenChatStream {
            ticket,
            message,
            station_id,
        })
    }

    pub(crate) fn apply_chunk(&mut self, ticket: Ticket, chunk: &str) -> bool {
        let Some(open) = self.open.as_mut().filter(|open| open.ticket == ticket) else {
            return false;
        };
        let text = open.accumulator.push(chunk).to_string();
        let existing = open.reply_index;
        if existing.is_none() {
            open.reply_index = Some(self.messages.len());
        }
        match existing {
            Some(index) => {
                if let Some(reply) = self.messages.get_mut(index) {
                    reply.content = text;
                }
            }
            None => self.push_message(Role::Assistant, text, false),
        }
        true
    }

    pub(crate) fn end_stream(&mut self, ticket: Ticket) -> bool {
        if !self.awaits(ticket) {
            return false;
        }
        if let Some(open) = self.open.take() {
            let chunks = open.accumulator.chunk_count();
            match open.reply_index {
                Some(index) => self.finalize(index),
                None => self.push_message(Role::Assistant, String::new(), true),
            }
            dash_info!("Chat stream {} finished after {} chunks", ticket, chunks);
        }
        true
    }

    /// Keep the partial reply and append a terminal error message.
    pub(crate) fn fail_stream(&mut self, ticket: Ticket, failure: &Failure) -> bool {
        if !self.awaits(ticket) {
            return false;
        }
        dash_warn!("Chat stream {} failed: {}", ticket, failure);
        if let Some(open) = self.open.take() {
            if let Some(index) = open.reply_index {
                self.finalize(index);
            }
        }
        self.push_message(Role::Assistant, CHAT_ERROR_TEXT.to_string(), true);
        true
    }

    /// Forget the whole conversation, returning an open stream's ticket.
    pub(crate) fn close(&mut self) -> Option<Ticket> {
        let cancelled = self.abandon_stream();
        let next_message_id = self.next_message_id;
        *self = Self {
            next_message_id,
            ..Self::default()
        };
        cancelled
    }

    fn abandon_stream(&mut self) -> Option<Ticket> {
        let open = self.open.take()?;
        if let Some(index) = open.reply_index {
            self.finalize(index);
        }
        dash_debug!("Abandoning chat stream {}", open.ticket);
        Some(open.ticket)
    }

    fn finalize(&mut self, index: usize) {
        if let Some(reply) = self.messages.get_mut(index) {
            reply.finalized = true;
        }
    }

    fn push_message(&mut self, role: Role, content: String, finalized: bool) {
        self.next_message_id += 1;
        self.messages.push(ChatMessage {
            id: MessageId(self.next_message_id),
            role,
            content,
            finalized,
        });
    }
}
