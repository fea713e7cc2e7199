use std::sync::Arc;

use axum::extract::FromRef;
use mixtape_rooms::Coordinator;

use crate::{audio::AudioStore, gateway::Gateway};

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub coordinator: Arc<Coordinator>,
    pub gateway: Arc<Gateway>,
    pub audio: Arc<AudioStore>,
}
