use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use dashboard_core::{Payload, ResponseShape, Ticket, TrafficQuery};
use dashboard_logging::{dash_debug, dash_info};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientSettings, ReqwestClient, SubmissionClient};
use crate::stream::ChannelChunkSink;
use crate::{ChatRequest, EngineEvent, StartError};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    FetchSample {
        ticket: Ticket,
        locator: String,
    },
    Submit {
        ticket: Ticket,
        endpoint: String,
        shape: ResponseShape,
        payload: Payload,
    },
    FetchArtifact {
        ticket: Ticket,
        endpoint: String,
        identifier: String,
    },
    PredictTraffic {
        ticket: Ticket,
        query: TrafficQuery,
    },
    OpenChat {
        ticket: Ticket,
        request: ChatRequest,
    },
    CancelChat {
        ticket: Ticket,
    },
}

type OpenStreams = Arc<Mutex<HashMap<Ticket, CancellationToken>>>;

/// Owns the async runtime thread. Dropping the handle stops the thread and
/// abandons whatever is still in flight.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(settings: ClientSettings) -> Result<Self, StartError> {
        let client: Arc<dyn SubmissionClient> = Arc::new(ReqwestClient::new(settings)?);
        Self::with_client(client)
    }

    pub fn with_client(client: Arc<dyn SubmissionClient>) -> Result<Self, StartError> {
        let runtime = tokio::runtime::Runtime::new()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let streams: OpenStreams = Arc::default();

        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                // Streams are registered before spawning so a cancel that
                // directly follows the open still finds its token.
                let cancel = match &command {
                    EngineCommand::CancelChat { ticket } => {
                        cancel_stream(&streams, *ticket);
                        continue;
                    }
                    EngineCommand::OpenChat { ticket, .. } => register_stream(&streams, *ticket),
                    _ => CancellationToken::new(),
                };
                let client = client.clone();
                let event_tx = event_tx.clone();
                let streams = streams.clone();
                runtime.spawn(async move {
                    handle_command(client.as_ref(), command, cancel, event_tx, streams).await;
                });
            }
            dash_debug!("Engine command channel closed; shutting down runtime");
        });

        Ok(Self { cmd_tx, event_rx })
    }

    pub fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

fn register_stream(streams: &OpenStreams, ticket: Ticket) -> CancellationToken {
    let token = CancellationToken::new();
    if let Ok(mut open) = streams.lock() {
        open.insert(ticket, token.clone());
    }
    token
}

fn cancel_stream(streams: &OpenStreams, ticket: Ticket) {
    let token = streams
        .lock()
        .ok()
        .and_then(|mut open| open.remove(&ticket));
    match token {
        Some(token) => {
            dash_info!("Cancelling chat stream {ticket}");
            token.cancel();
        }
        None => dash_debug!("Cancel for chat stream {ticket} that is not open"),
    }
}

async fn handle_command(
    client: &dyn SubmissionClient,
    command: EngineCommand,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<EngineEvent>,
    streams: OpenStreams,
) {
    let event = match command {
        EngineCommand::FetchSample { ticket, locator } => EngineEvent::SampleFetched {
            ticket,
            result: client.fetch_sample(&locator).await,
        },
        EngineCommand::Submit {
            ticket,
            endpoint,
            shape,
            payload,
        } => EngineEvent::Submitted {
            ticket,
            result: client.submit(&endpoint, shape, payload).await,
        },
        EngineCommand::FetchArtifact {
            ticket,
            endpoint,
            identifier,
        } => EngineEvent::ArtifactFetched {
            ticket,
            result: client.fetch_artifact(&endpoint, &identifier).await,
        },
        EngineCommand::PredictTraffic { ticket, query } => EngineEvent::TrafficPredicted {
            ticket,
            result: client.predict_traffic(&query).await,
        },
        EngineCommand::OpenChat { ticket, request } => {
            let sink = ChannelChunkSink::new(ticket, event_tx.clone());
            let result = client.stream_chat(&request, &sink, &cancel).await;
            if let Ok(mut open) = streams.lock() {
                open.remove(&ticket);
            }
            EngineEvent::ChatFinished { ticket, result }
        }
        EngineCommand::CancelChat { ticket } => {
            cancel_stream(&streams, ticket);
            return;
        }
    };
    let _ = event_tx.send(event);
}
