mod events;
mod playback;
mod rooms;
mod router;
mod track;
mod util;

use std::sync::Arc;

pub use events::*;
pub use playback::*;
pub use rooms::*;
pub use router::*;
pub use track::*;
pub use util::random_string;

/// The mixtape room coordination system: the registry of live rooms, the
/// event router that drives them, and the bus their state changes flow out
/// on.
///
/// The coordinator never touches a connection. Transports feed inbound
/// events into [EventRouter::handle], report teardowns through
/// [EventRouter::disconnect], and drain `(event, recipients)` pairs from
/// the receiver returned by [Coordinator::receiver].
pub struct Coordinator {
    pub registry: Arc<RoomRegistry>,
    pub router: EventRouter,
    events: Events,
}

impl Coordinator {
    pub fn new() -> Self {
        let events = Events::default();
        let registry = RoomRegistry::new(events.clone());
        let router = EventRouter::new(registry.clone(), events.clone());

        Self {
            registry,
            router,
            events,
        }
    }

    pub fn receiver(&self) -> EventReceiver {
        self.events.receiver()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
