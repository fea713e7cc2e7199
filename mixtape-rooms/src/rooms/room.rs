use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    playback,
    track::{Track, TrackId},
    util::non_blank,
};

use super::RoomError;

pub type RoomCode = String;
pub type ParticipantId = String;

const DEFAULT_NAME: &str = "Untitled Room";
const DEFAULT_DESCRIPTION: &str = "A shared listening room";

/// One connected identity inside a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn host(id: ParticipantId, display_name: String) -> Self {
        Self {
            id,
            display_name: non_blank(display_name, "Host"),
            is_host: true,
            joined_at: Utc::now(),
        }
    }

    pub fn guest(id: ParticipantId, display_name: String) -> Self {
        Self {
            id,
            display_name: non_blank(display_name, "Guest"),
            is_host: false,
            joined_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackMode {
    Individual,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncControl {
    HostOnly,
    Anyone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub playback_mode: PlaybackMode,
    pub sync_control: SyncControl,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            playback_mode: PlaybackMode::Individual,
            sync_control: SyncControl::HostOnly,
        }
    }
}

/// A partial settings update. Absent fields leave the current value alone.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettingsPatch {
    pub playback_mode: Option<PlaybackMode>,
    pub sync_control: Option<SyncControl>,
}

impl RoomSettings {
    fn apply(&mut self, patch: RoomSettingsPatch) {
        if let Some(playback_mode) = patch.playback_mode {
            self.playback_mode = playback_mode;
        }

        if let Some(sync_control) = patch.sync_control {
            self.sync_control = sync_control;
        }
    }
}

/// Everything a joiner needs to render the room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub name: String,
    pub description: String,
    pub settings: RoomSettings,
    pub playlist: Vec<Track>,
    pub participants: Vec<Participant>,
    pub host_id: ParticipantId,
    pub created_at: DateTime<Utc>,
}

pub struct NewRoom {
    pub name: String,
    pub description: String,
    pub initial_playlist: Vec<Track>,
    pub host: Participant,
}

pub struct JoinOutcome {
    pub snapshot: RoomSnapshot,
    pub joined: Participant,
    /// Members that were already present, for the joined notification
    pub others: Vec<ParticipantId>,
    pub participant_count: usize,
}

pub enum LeaveOutcome {
    /// A non-host member left
    Left {
        participant: Participant,
        remaining: Vec<ParticipantId>,
    },
    /// The host left, which tears the whole room down
    Closed { notified: Vec<ParticipantId> },
}

/// A mixtape room: a shared playlist, settings, and the participants
/// listening together.
///
/// All of a room's mutable state lives behind one mutex, so operations
/// against the same room are serialized while different rooms stay fully
/// independent.
pub struct Room {
    code: RoomCode,
    created_at: DateTime<Utc>,
    state: Mutex<RoomState>,
}

struct RoomState {
    name: String,
    description: String,
    settings: RoomSettings,
    playlist: Vec<Track>,
    participants: HashMap<ParticipantId, Participant>,
    host_id: ParticipantId,
    /// Set once the room is destroyed, so a join racing the teardown fails
    /// instead of landing in a dead room
    closed: bool,
    last_activity: Instant,
}

impl RoomState {
    fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    fn ensure_member(&self, id: &ParticipantId) -> Result<&Participant, RoomError> {
        self.participants.get(id).ok_or(RoomError::NotAMember)
    }

    fn push_unique(&mut self, track: Track) {
        if !self.playlist.iter().any(|t| t.id == track.id) {
            self.playlist.push(track);
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

impl Room {
    pub fn new(code: RoomCode, new_room: NewRoom) -> Self {
        let NewRoom {
            name,
            description,
            initial_playlist,
            host,
        } = new_room;

        let host_id = host.id.clone();
        let participants = HashMap::from([(host_id.clone(), host)]);

        let mut state = RoomState {
            name: non_blank(name, DEFAULT_NAME),
            description: non_blank(description, DEFAULT_DESCRIPTION),
            settings: RoomSettings::default(),
            playlist: Vec::new(),
            participants,
            host_id,
            closed: false,
            last_activity: Instant::now(),
        };

        for track in initial_playlist {
            state.push_unique(track.normalized());
        }

        Self {
            code,
            created_at: Utc::now(),
            state: Mutex::new(state),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot_locked(&self.state.lock())
    }

    fn snapshot_locked(&self, state: &RoomState) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            name: state.name.clone(),
            description: state.description.clone(),
            settings: state.settings,
            playlist: state.playlist.clone(),
            participants: state.participants.values().cloned().collect(),
            host_id: state.host_id.clone(),
            created_at: self.created_at,
        }
    }

    /// Admits a participant, returning the snapshot they should see and the
    /// audience for the joined notification.
    ///
    /// Fails with [RoomError::RoomNotFound] if the room was destroyed
    /// between lookup and join; the closed flag is checked under the room
    /// lock, which is what closes that race window.
    pub fn join(&self, participant: Participant) -> Result<JoinOutcome, RoomError> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(RoomError::RoomNotFound);
        }

        state.touch();

        let others = state.participant_ids();
        state
            .participants
            .insert(participant.id.clone(), participant.clone());

        info!(
            "{} joined room {} ({} present)",
            participant.display_name,
            self.code,
            state.participants.len()
        );

        Ok(JoinOutcome {
            snapshot: self.snapshot_locked(&state),
            joined: participant,
            others,
            participant_count: state.participants.len(),
        })
    }

    /// Removes a participant. Host departure closes the room for everyone;
    /// there is deliberately no host migration.
    ///
    /// Returns [None] when the id was not a member, so repeated disconnect
    /// reports fall through harmlessly.
    pub fn leave(&self, id: &ParticipantId) -> Option<LeaveOutcome> {
        let mut state = self.state.lock();
        let participant = state.participants.remove(id)?;

        state.touch();

        if state.host_id == *id {
            state.closed = true;
            let notified = state.participant_ids();

            info!("Host left room {}, closing it", self.code);

            Some(LeaveOutcome::Closed { notified })
        } else {
            let remaining = state.participant_ids();

            info!(
                "{} left room {} ({} remaining)",
                participant.display_name,
                self.code,
                remaining.len()
            );

            Some(LeaveOutcome::Left {
                participant,
                remaining,
            })
        }
    }

    /// Shallow-merges a settings patch. Host only.
    pub fn update_settings(
        &self,
        requester: &ParticipantId,
        patch: RoomSettingsPatch,
    ) -> Result<(RoomSettings, Vec<ParticipantId>), RoomError> {
        let mut state = self.state.lock();

        if state.host_id != *requester {
            return Err(RoomError::Unauthorized);
        }

        state.touch();
        state.settings.apply(patch);

        Ok((state.settings, state.participant_ids()))
    }

    /// Appends tracks whose id is not already present, first-seen wins.
    /// Resubmitting the same tracks after a partial success adds nothing,
    /// which makes retries safe.
    pub fn add_tracks(
        &self,
        requester: &ParticipantId,
        tracks: Vec<Track>,
    ) -> Result<(Vec<Track>, Vec<ParticipantId>), RoomError> {
        let mut state = self.state.lock();

        state.ensure_member(requester)?;
        state.touch();

        for track in tracks {
            state.push_unique(track.normalized());
        }

        Ok((state.playlist.clone(), state.participant_ids()))
    }

    /// Drops any track whose id is in the set. Absent ids are ignored and
    /// the relative order of the survivors is untouched.
    pub fn remove_tracks(
        &self,
        requester: &ParticipantId,
        track_ids: &[TrackId],
    ) -> Result<(Vec<Track>, Vec<ParticipantId>), RoomError> {
        let mut state = self.state.lock();

        state.ensure_member(requester)?;
        state.touch();

        let doomed: HashSet<&str> = track_ids.iter().map(String::as_str).collect();
        state.playlist.retain(|t| !doomed.contains(t.id.as_str()));

        Ok((state.playlist.clone(), state.participant_ids()))
    }

    /// Resolves the audience for a synchronized playback command, or [None]
    /// when the room plays individually and the command is dropped.
    pub fn sync_command_audience(
        &self,
        requester: &ParticipantId,
    ) -> Result<Option<Vec<ParticipantId>>, RoomError> {
        let mut state = self.state.lock();

        let is_host = state.ensure_member(requester)?.is_host;
        state.touch();

        if playback::authorize_sync_command(&state.settings, is_host)? {
            let audience = state
                .participant_ids()
                .into_iter()
                .filter(|id| id != requester)
                .collect();

            Ok(Some(audience))
        } else {
            Ok(None)
        }
    }

    /// Resolves a chat sender and the inclusive room audience.
    pub fn chat_audience(
        &self,
        sender: &ParticipantId,
    ) -> Result<(Participant, Vec<ParticipantId>), RoomError> {
        let mut state = self.state.lock();

        let participant = state.ensure_member(sender)?.clone();
        state.touch();

        Ok((participant, state.participant_ids()))
    }

    /// Marks the room as closed and returns the members to notify. Empty if
    /// the room was already closed, since a live room always holds its host.
    pub fn close(&self) -> Vec<ParticipantId> {
        let mut state = self.state.lock();

        if state.closed {
            return Vec::new();
        }

        state.closed = true;
        state.participant_ids()
    }

    pub fn is_idle(&self, max_idle: Duration) -> bool {
        self.state.lock().last_activity.elapsed() >= max_idle
    }
}
