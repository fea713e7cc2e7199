use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::debug;
use mixtape_rooms::{
    random_string, EventReceiver, IncomingEvent, OutgoingEvent, ParticipantId, Recipients,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::spawn_blocking;

use crate::{context::ServerContext, Router};

/// Length of the identity token minted for each connection.
const PARTICIPANT_ID_LENGTH: usize = 16;

/// Tracks every live gateway connection and owns the only handles to their
/// outboxes. The coordinator never sees a socket; everything it emits ends
/// up here as an event with named recipients.
pub struct Gateway {
    connections: Mutex<HashMap<ParticipantId, UnboundedSender<Message>>>,
}

impl Gateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: Default::default(),
        })
    }

    fn register(&self, id: ParticipantId, sender: UnboundedSender<Message>) {
        self.connections.lock().insert(id, sender);
    }

    fn unregister(&self, id: &ParticipantId) {
        self.connections.lock().remove(id);
    }

    /// Serializes an event once and hands it to every targeted connection.
    /// Connections that are mid-teardown are skipped silently.
    pub fn deliver(&self, event: &OutgoingEvent, recipients: &Recipients) {
        let message = serde_json::to_string(event).expect("events serialize");
        let connections = self.connections.lock();

        let send = |id: &ParticipantId| {
            if let Some(sender) = connections.get(id) {
                let _ = sender.send(Message::Text(message.clone()));
            }
        };

        match recipients {
            Recipients::Only(id) => send(id),
            Recipients::Some(ids) => ids.iter().for_each(send),
        }
    }
}

/// Drains the coordinator's bus and fans each event out to its audience.
/// Runs until the bus closes, which only happens at shutdown.
pub async fn run_event_pump(gateway: Arc<Gateway>, receiver: EventReceiver) {
    while let Ok((event, recipients)) = {
        let receiver = receiver.clone();
        spawn_blocking(move || receiver.recv())
            .await
            .expect("pump recv completes")
    } {
        gateway.deliver(&event, &recipients);
    }
}

async fn gateway_handler(State(context): State<ServerContext>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    // The connection's identity token. Clients learn it from the
    // room-created and room-joined payloads.
    let participant_id: ParticipantId = random_string(PARTICIPANT_ID_LENGTH);

    let (sender, mut outbox) = unbounded_channel();
    context.gateway.register(participant_id.clone(), sender);

    debug!("Connection {} opened", participant_id);

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<IncomingEvent>(&text) {
                Ok(event) => context.coordinator.router.handle(&participant_id, event),
                Err(err) => {
                    debug!("Connection {} sent a malformed event: {}", participant_id, err);

                    context.gateway.deliver(
                        &OutgoingEvent::Error {
                            message: "Malformed event".to_string(),
                        },
                        &Recipients::Only(participant_id.clone()),
                    );
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the socket layer, binary frames have no
            // meaning on the gateway
            _ => {}
        }
    }

    // Whatever ended the read loop, the coordinator hears about the
    // teardown exactly once
    context.coordinator.router.disconnect(&participant_id);
    context.gateway.unregister(&participant_id);
    send_task.abort();

    debug!("Connection {} closed", participant_id);
}

pub fn router() -> Router {
    Router::new().route("/", get(gateway_handler))
}
