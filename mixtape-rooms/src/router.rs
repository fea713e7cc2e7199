use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

use crate::{
    events::{Events, IncomingEvent, OutgoingEvent, Recipients},
    playback::PlaybackAction,
    rooms::{
        LeaveOutcome, NewRoom, Participant, ParticipantId, Room, RoomCode, RoomError, RoomRegistry,
        RoomSettingsPatch,
    },
    track::{Track, TrackId},
};

/// Routes inbound client events to room operations and fans the resulting
/// state changes out to the right audience.
///
/// The router owns the participant-to-room session bindings. A session is
/// bound once, on a successful create or join, and unbound only when the
/// connection goes away; switching rooms is modeled as disconnect and
/// reconnect.
pub struct EventRouter {
    registry: Arc<RoomRegistry>,
    events: Events,
    sessions: DashMap<ParticipantId, RoomCode>,
}

impl EventRouter {
    pub fn new(registry: Arc<RoomRegistry>, events: Events) -> Self {
        Self {
            registry,
            events,
            sessions: Default::default(),
        }
    }

    /// Applies one inbound event. Precondition failures never escape; they
    /// are reported to the sender alone as a named error event.
    pub fn handle(&self, participant_id: &ParticipantId, event: IncomingEvent) {
        let failure = match event {
            IncomingEvent::CreateRoom {
                name,
                description,
                display_name,
                initial_playlist,
            } => self
                .create_room(participant_id, name, description, display_name, initial_playlist)
                .err()
                .map(|e| OutgoingEvent::Error {
                    message: e.to_string(),
                }),

            IncomingEvent::JoinRoom {
                room_code,
                display_name,
            } => self
                .join_room(participant_id, &room_code, display_name)
                .err()
                .map(|e| OutgoingEvent::JoinError {
                    message: e.to_string(),
                }),

            IncomingEvent::UpdateRoomSettings {
                room_code,
                settings,
            } => self
                .update_settings(participant_id, &room_code, settings)
                .err()
                .map(|e| OutgoingEvent::Error {
                    message: e.to_string(),
                }),

            IncomingEvent::AddToRoomPlaylist { room_code, tracks } => self
                .add_to_playlist(participant_id, &room_code, tracks)
                .err()
                .map(|e| OutgoingEvent::Error {
                    message: e.to_string(),
                }),

            IncomingEvent::RemoveFromRoomPlaylist {
                room_code,
                track_ids,
            } => self
                .remove_from_playlist(participant_id, &room_code, &track_ids)
                .err()
                .map(|e| OutgoingEvent::Error {
                    message: e.to_string(),
                }),

            IncomingEvent::SyncPlayback {
                room_code,
                action,
                song_id,
                current_time,
                is_playing,
            } => self
                .sync_playback(
                    participant_id,
                    &room_code,
                    action,
                    song_id,
                    current_time,
                    is_playing,
                )
                .err()
                .map(|e| OutgoingEvent::Error {
                    message: e.to_string(),
                }),

            IncomingEvent::ChatMessage { room_code, message } => self
                .chat(participant_id, &room_code, message)
                .err()
                .map(|e| OutgoingEvent::Error {
                    message: e.to_string(),
                }),
        };

        if let Some(event) = failure {
            self.events
                .emit(event, Recipients::Only(participant_id.clone()));
        }
    }

    /// Tears down the sender's session. The transport calls this exactly
    /// once per connection, but repeated or spurious calls fall through
    /// harmlessly, including for connections that never joined a room.
    pub fn disconnect(&self, participant_id: &ParticipantId) {
        let Some((_, code)) = self.sessions.remove(participant_id) else {
            return;
        };

        let Some(room) = self.registry.get(&code) else {
            return;
        };

        match room.leave(participant_id) {
            Some(LeaveOutcome::Closed { notified }) => {
                self.registry.destroy(&code);

                if !notified.is_empty() {
                    self.events.emit(
                        OutgoingEvent::RoomClosed { room_code: code },
                        Recipients::Some(notified),
                    );
                }
            }
            Some(LeaveOutcome::Left {
                participant,
                remaining,
            }) => {
                self.events.emit(
                    OutgoingEvent::ParticipantLeft {
                        room_code: code,
                        participant_id: participant.id,
                        participant_count: remaining.len(),
                    },
                    Recipients::Some(remaining),
                );
            }
            None => {}
        }
    }

    fn create_room(
        &self,
        participant_id: &ParticipantId,
        name: String,
        description: String,
        display_name: String,
        initial_playlist: Vec<Track>,
    ) -> Result<(), RoomError> {
        if self.sessions.contains_key(participant_id) {
            return Err(RoomError::AlreadyInRoom);
        }

        let host = Participant::host(participant_id.clone(), display_name);
        let room = self.registry.create_room(NewRoom {
            name,
            description,
            initial_playlist,
            host,
        });

        self.sessions
            .insert(participant_id.clone(), room.code().clone());

        self.events.emit(
            OutgoingEvent::RoomCreated {
                room: room.snapshot(),
                participant_id: participant_id.clone(),
            },
            Recipients::Only(participant_id.clone()),
        );

        Ok(())
    }

    fn join_room(
        &self,
        participant_id: &ParticipantId,
        room_code: &RoomCode,
        display_name: String,
    ) -> Result<(), RoomError> {
        if self.sessions.contains_key(participant_id) {
            return Err(RoomError::AlreadyInRoom);
        }

        let room = self
            .registry
            .get(room_code)
            .ok_or(RoomError::RoomNotFound)?;

        let outcome = room.join(Participant::guest(participant_id.clone(), display_name))?;

        self.sessions
            .insert(participant_id.clone(), room.code().clone());

        self.events.emit(
            OutgoingEvent::RoomJoined {
                room: outcome.snapshot,
                participant_id: participant_id.clone(),
            },
            Recipients::Only(participant_id.clone()),
        );

        if !outcome.others.is_empty() {
            self.events.emit(
                OutgoingEvent::ParticipantJoined {
                    room_code: room_code.clone(),
                    participant: outcome.joined,
                    participant_count: outcome.participant_count,
                },
                Recipients::Some(outcome.others),
            );
        }

        Ok(())
    }

    fn update_settings(
        &self,
        participant_id: &ParticipantId,
        room_code: &RoomCode,
        patch: RoomSettingsPatch,
    ) -> Result<(), RoomError> {
        let room = self.bound_room(participant_id, room_code)?;
        let (settings, audience) = room.update_settings(participant_id, patch)?;

        self.events.emit(
            OutgoingEvent::RoomSettingsUpdated {
                room_code: room_code.clone(),
                settings,
            },
            Recipients::Some(audience),
        );

        Ok(())
    }

    fn add_to_playlist(
        &self,
        participant_id: &ParticipantId,
        room_code: &RoomCode,
        tracks: Vec<Track>,
    ) -> Result<(), RoomError> {
        let room = self.bound_room(participant_id, room_code)?;
        let (playlist, audience) = room.add_tracks(participant_id, tracks)?;

        self.emit_playlist_update(room_code, playlist, participant_id, audience);
        Ok(())
    }

    fn remove_from_playlist(
        &self,
        participant_id: &ParticipantId,
        room_code: &RoomCode,
        track_ids: &[TrackId],
    ) -> Result<(), RoomError> {
        let room = self.bound_room(participant_id, room_code)?;
        let (playlist, audience) = room.remove_tracks(participant_id, track_ids)?;

        self.emit_playlist_update(room_code, playlist, participant_id, audience);
        Ok(())
    }

    fn sync_playback(
        &self,
        participant_id: &ParticipantId,
        room_code: &RoomCode,
        action: PlaybackAction,
        song_id: Option<TrackId>,
        current_time: f32,
        is_playing: bool,
    ) -> Result<(), RoomError> {
        let room = self.bound_room(participant_id, room_code)?;

        let Some(audience) = room.sync_command_audience(participant_id)? else {
            // Individual playback mode: the coordinator stays out of it
            return Ok(());
        };

        if !audience.is_empty() {
            self.events.emit(
                OutgoingEvent::SyncPlaybackCommand {
                    room_code: room_code.clone(),
                    action,
                    song_id,
                    current_time,
                    is_playing,
                    issued_by: participant_id.clone(),
                },
                Recipients::Some(audience),
            );
        }

        Ok(())
    }

    fn chat(
        &self,
        participant_id: &ParticipantId,
        room_code: &RoomCode,
        message: String,
    ) -> Result<(), RoomError> {
        let room = self.bound_room(participant_id, room_code)?;
        let (sender, audience) = room.chat_audience(participant_id)?;

        // Chat is inclusive: the sender sees their own message come back
        self.events.emit(
            OutgoingEvent::ChatMessage {
                room_code: room_code.clone(),
                display_name: sender.display_name,
                message,
                timestamp: Utc::now(),
            },
            Recipients::Some(audience),
        );

        Ok(())
    }

    fn emit_playlist_update(
        &self,
        room_code: &RoomCode,
        playlist: Vec<Track>,
        updated_by: &ParticipantId,
        audience: Vec<ParticipantId>,
    ) {
        self.events.emit(
            OutgoingEvent::RoomPlaylistUpdated {
                room_code: room_code.clone(),
                playlist,
                updated_by: updated_by.clone(),
            },
            Recipients::Some(audience),
        );
    }

    /// Resolves the room for a post-join event from the authoritative
    /// session binding. A client-supplied code that does not match the
    /// binding is rejected rather than trusted.
    fn bound_room(
        &self,
        participant_id: &ParticipantId,
        claimed_code: &RoomCode,
    ) -> Result<Arc<Room>, RoomError> {
        let code = self
            .sessions
            .get(participant_id)
            .ok_or(RoomError::NotAMember)?
            .value()
            .clone();

        if code != *claimed_code {
            return Err(RoomError::NotAMember);
        }

        self.registry.get(&code).ok_or(RoomError::RoomNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventReceiver;

    fn setup() -> (EventRouter, EventReceiver) {
        let events = Events::default();
        let registry = RoomRegistry::new(events.clone());
        let receiver = events.receiver();

        (EventRouter::new(registry, events), receiver)
    }

    fn drain(receiver: &EventReceiver) -> Vec<(OutgoingEvent, Recipients)> {
        let mut out = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            out.push(message);
        }
        out
    }

    fn create_room(router: &EventRouter, receiver: &EventReceiver, host: &str) -> RoomCode {
        router.handle(
            &host.to_string(),
            IncomingEvent::CreateRoom {
                name: "Test".to_string(),
                description: String::new(),
                display_name: "Host".to_string(),
                initial_playlist: Vec::new(),
            },
        );

        drain(receiver)
            .into_iter()
            .find_map(|(event, _)| match event {
                OutgoingEvent::RoomCreated { room, .. } => Some(room.code),
                _ => None,
            })
            .expect("room was created")
    }

    #[test]
    fn member_events_must_match_the_session_binding() {
        let (router, receiver) = setup();
        let host = "host".to_string();

        let code = create_room(&router, &receiver, &host);
        let other_code = create_room(&router, &receiver, "other-host");

        // The host is bound to their own room; claiming the other room's
        // code is rejected even though that room exists
        router.handle(
            &host,
            IncomingEvent::ChatMessage {
                room_code: other_code,
                message: "hello".to_string(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::Error { .. }, Recipients::Only(id))] if *id == host
        ));

        // The genuine binding works
        router.handle(
            &host,
            IncomingEvent::ChatMessage {
                room_code: code,
                message: "hello".to_string(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::ChatMessage { .. }, Recipients::Some(_))]
        ));
    }

    #[test]
    fn unbound_senders_get_not_a_member() {
        let (router, receiver) = setup();

        router.handle(
            &"stranger".to_string(),
            IncomingEvent::ChatMessage {
                room_code: "ABC123".to_string(),
                message: "hi".to_string(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::Error { message }, _)] if message.contains("member")
        ));
    }

    #[test]
    fn join_against_a_missing_room_yields_a_join_error() {
        let (router, receiver) = setup();

        router.handle(
            &"p1".to_string(),
            IncomingEvent::JoinRoom {
                room_code: "NOPE99".to_string(),
                display_name: "Bob".to_string(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::JoinError { .. }, Recipients::Only(id))] if id == "p1"
        ));
    }

    #[test]
    fn bound_sessions_cannot_create_or_join_again() {
        let (router, receiver) = setup();
        let host = "host".to_string();

        let code = create_room(&router, &receiver, &host);

        router.handle(
            &host,
            IncomingEvent::CreateRoom {
                name: "Second".to_string(),
                description: String::new(),
                display_name: String::new(),
                initial_playlist: Vec::new(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::Error { message }, _)] if message.contains("Already")
        ));

        router.handle(
            &host,
            IncomingEvent::JoinRoom {
                room_code: code,
                display_name: "Host".to_string(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::JoinError { .. }, _)]
        ));
    }

    #[test]
    fn disconnect_is_idempotent_and_safe_for_unjoined_connections() {
        let (router, receiver) = setup();

        // Never joined anything
        router.disconnect(&"ghost".to_string());
        assert!(drain(&receiver).is_empty());

        let host = "host".to_string();
        create_room(&router, &receiver, &host);

        router.disconnect(&host);
        router.disconnect(&host);

        // Only the first disconnect did anything, and a lone host closing
        // their own room notifies nobody
        assert!(drain(&receiver).is_empty());
    }

    #[test]
    fn host_disconnect_notifies_and_frees_the_code() {
        let (router, receiver) = setup();
        let host = "host".to_string();
        let guest = "guest".to_string();

        let code = create_room(&router, &receiver, &host);

        router.handle(
            &guest,
            IncomingEvent::JoinRoom {
                room_code: code.clone(),
                display_name: "Bob".to_string(),
            },
        );
        drain(&receiver);

        router.disconnect(&host);

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::RoomClosed { room_code }, Recipients::Some(ids))]
                if *room_code == code && ids == &[guest.clone()]
        ));

        // The code no longer resolves
        router.handle(
            &"late".to_string(),
            IncomingEvent::JoinRoom {
                room_code: code,
                display_name: "Late".to_string(),
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::JoinError { .. }, _)]
        ));
    }

    #[test]
    fn playback_authority_errors_do_not_broadcast() {
        let (router, receiver) = setup();
        let host = "host".to_string();
        let guest = "guest".to_string();

        let code = create_room(&router, &receiver, &host);

        router.handle(
            &guest,
            IncomingEvent::JoinRoom {
                room_code: code.clone(),
                display_name: "Bob".to_string(),
            },
        );

        router.handle(
            &host,
            IncomingEvent::UpdateRoomSettings {
                room_code: code.clone(),
                settings: RoomSettingsPatch {
                    playback_mode: Some(crate::PlaybackMode::Sync),
                    sync_control: None,
                },
            },
        );
        drain(&receiver);

        // Non-host under host-only control: a single error to the sender
        router.handle(
            &guest,
            IncomingEvent::SyncPlayback {
                room_code: code.clone(),
                action: PlaybackAction::Play,
                song_id: None,
                current_time: 0.,
                is_playing: true,
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::Error { .. }, Recipients::Only(id))] if *id == guest
        ));

        // The host's command reaches everyone but the host
        router.handle(
            &host,
            IncomingEvent::SyncPlayback {
                room_code: code,
                action: PlaybackAction::Play,
                song_id: Some("t1".to_string()),
                current_time: 42.,
                is_playing: true,
            },
        );

        let events = drain(&receiver);
        assert!(matches!(
            events.as_slice(),
            [(OutgoingEvent::SyncPlaybackCommand { issued_by, .. }, Recipients::Some(ids))]
                if *issued_by == host && ids == &[guest.clone()]
        ));
    }
}
