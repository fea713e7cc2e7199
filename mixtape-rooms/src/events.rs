use chrono::{DateTime, Utc};
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{
    playback::PlaybackAction,
    rooms::{Participant, ParticipantId, RoomCode, RoomSettings, RoomSettingsPatch, RoomSnapshot},
    track::{Track, TrackId},
};

/// Who an outbound event is delivered to. The coordinator never talks to a
/// connection directly; it only names recipients and lets the transport
/// resolve them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    Only(ParticipantId),
    Some(Vec<ParticipantId>),
}

/// Events sent by clients over the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum IncomingEvent {
    CreateRoom {
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        /// Display name of the creator. The payload historically omits this,
        /// so it falls back to a default when blank.
        #[serde(default)]
        display_name: String,
        #[serde(default)]
        initial_playlist: Vec<Track>,
    },
    JoinRoom {
        room_code: RoomCode,
        #[serde(default)]
        display_name: String,
    },
    UpdateRoomSettings {
        room_code: RoomCode,
        settings: RoomSettingsPatch,
    },
    AddToRoomPlaylist {
        room_code: RoomCode,
        tracks: Vec<Track>,
    },
    RemoveFromRoomPlaylist {
        room_code: RoomCode,
        track_ids: Vec<TrackId>,
    },
    SyncPlayback {
        room_code: RoomCode,
        action: PlaybackAction,
        #[serde(default)]
        song_id: Option<TrackId>,
        #[serde(default)]
        current_time: f32,
        #[serde(default)]
        is_playing: bool,
    },
    ChatMessage {
        room_code: RoomCode,
        message: String,
    },
}

/// Events broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutgoingEvent {
    /// The sender's room was created and they are its host
    RoomCreated {
        room: RoomSnapshot,
        participant_id: ParticipantId,
    },
    /// The sender joined a room and receives its full state
    RoomJoined {
        room: RoomSnapshot,
        participant_id: ParticipantId,
    },
    JoinError {
        message: String,
    },
    /// Someone else joined the room
    ParticipantJoined {
        room_code: RoomCode,
        participant: Participant,
        participant_count: usize,
    },
    /// A non-host participant left the room
    ParticipantLeft {
        room_code: RoomCode,
        participant_id: ParticipantId,
        participant_count: usize,
    },
    /// The room was torn down, either because the host left or because it
    /// was swept after standing idle
    RoomClosed {
        room_code: RoomCode,
    },
    RoomSettingsUpdated {
        room_code: RoomCode,
        settings: RoomSettings,
    },
    RoomPlaylistUpdated {
        room_code: RoomCode,
        playlist: Vec<Track>,
        updated_by: ParticipantId,
    },
    /// A playback command to apply locally, sent to everyone but its issuer
    SyncPlaybackCommand {
        room_code: RoomCode,
        action: PlaybackAction,
        song_id: Option<TrackId>,
        current_time: f32,
        is_playing: bool,
        issued_by: ParticipantId,
    },
    ChatMessage {
        room_code: RoomCode,
        display_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

type Message = (OutgoingEvent, Recipients);

pub type EventReceiver = Receiver<Message>;

/// The outbound event bus. Emitting never blocks; the transport drains the
/// receiving end and fans events out to connections.
#[derive(Debug, Clone)]
pub struct Events {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl Events {
    pub fn emit(&self, event: OutgoingEvent, recipients: Recipients) {
        self.sender.send((event, recipients)).unwrap();
    }

    pub fn receiver(&self) -> EventReceiver {
        self.receiver.clone()
    }
}

impl Default for Events {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}
