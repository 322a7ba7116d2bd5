use std::time::Duration;

use dashboard_core::{Effect, Failure, Msg, Ticket};
use dashboard_engine::{
    ChatRequest, ClientError, EngineCommand, EngineEvent, EngineHandle, FailureKind,
};
use dashboard_logging::{dash_debug, dash_info, dash_warn};

/// Executes core effects on the engine and turns engine completions back
/// into messages.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn run(&self, effect: Effect) {
        dash_debug!("Running effect for ticket {}", effect.ticket());
        self.engine.send(command_for(effect));
    }

    pub fn try_next(&self) -> Option<EngineEvent> {
        self.engine.try_recv()
    }

    pub fn next_within(&self, timeout: Duration) -> Option<EngineEvent> {
        self.engine.recv_timeout(timeout)
    }
}

pub fn command_for(effect: Effect) -> EngineCommand {
    match effect {
        Effect::FetchSample { ticket, locator } => EngineCommand::FetchSample { ticket, locator },
        Effect::Submit {
            ticket,
            endpoint,
            shape,
            payload,
        } => {
            dash_info!("Submission {ticket} to {endpoint}");
            EngineCommand::Submit {
                ticket,
                endpoint: endpoint.to_string(),
                shape,
                payload,
            }
        }
        Effect::FetchArtifact {
            ticket,
            endpoint,
            identifier,
        } => EngineCommand::FetchArtifact {
            ticket,
            endpoint: endpoint.to_string(),
            identifier,
        },
        Effect::PredictTraffic { ticket, query } => EngineCommand::PredictTraffic { ticket, query },
        Effect::OpenChatStream {
            ticket,
            message,
            station_id,
        } => EngineCommand::OpenChat {
            ticket,
            request: ChatRequest {
                message,
                station_id,
            },
        },
        Effect::CancelChatStream { ticket } => EngineCommand::CancelChat { ticket },
    }
}

pub fn msg_for(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::SampleFetched { ticket, result } => match result {
            Ok(blob) => Msg::SampleLoaded { ticket, blob },
            Err(err) => Msg::SampleFailed {
                ticket,
                failure: report(ticket, "Sample fetch", err),
            },
        },
        EngineEvent::Submitted { ticket, result } => match result {
            Ok(outcome) => Msg::SubmissionSucceeded { ticket, outcome },
            Err(err) => Msg::SubmissionFailed {
                ticket,
                failure: report(ticket, "Submission", err),
            },
        },
        EngineEvent::ArtifactFetched { ticket, result } => match result {
            Ok(blob) => Msg::ArtifactLoaded { ticket, blob },
            Err(err) => Msg::ArtifactFailed {
                ticket,
                failure: report(ticket, "Artifact fetch", err),
            },
        },
        EngineEvent::TrafficPredicted { ticket, result } => match result {
            Ok(forecast) => Msg::TrafficSucceeded { ticket, forecast },
            Err(err) => Msg::TrafficFailed {
                ticket,
                failure: report(ticket, "Traffic prediction", err),
            },
        },
        EngineEvent::ChatChunk { ticket, text } => Msg::ChatChunk { ticket, text },
        EngineEvent::ChatFinished { ticket, result } => match result {
            Ok(()) => Msg::ChatStreamEnded { ticket },
            Err(err) => Msg::ChatStreamFailed {
                ticket,
                failure: report(ticket, "Chat stream", err),
            },
        },
    }
}

fn report(ticket: Ticket, what: &str, err: ClientError) -> Failure {
    match err.kind {
        FailureKind::Cancelled => dash_debug!("{what} {ticket} cancelled"),
        _ => dash_warn!("{what} {ticket} failed: {err}"),
    }
    failure_for(err)
}

/// Collapse engine error kinds into the user-facing taxonomy.
pub fn failure_for(err: ClientError) -> Failure {
    match err.kind {
        FailureKind::SampleFetch => Failure::SampleFetch {
            message: err.message,
        },
        FailureKind::Transport { status } => Failure::Transport {
            status,
            message: err.message,
        },
        FailureKind::InvalidEndpoint | FailureKind::Timeout | FailureKind::TooLarge { .. } => {
            Failure::Transport {
                status: None,
                message: err.to_string(),
            }
        }
        FailureKind::Stream | FailureKind::Cancelled => Failure::Stream {
            message: err.message,
        },
        FailureKind::Decode => Failure::Decode {
            message: err.message,
        },
    }
}
