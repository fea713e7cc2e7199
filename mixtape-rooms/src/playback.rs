use serde::{Deserialize, Serialize};

use crate::rooms::{PlaybackMode, RoomError, RoomSettings, SyncControl};

/// The synchronized playback commands a participant can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackAction {
    Play,
    Pause,
    Seek,
    TrackChange,
}

/// Decides whether a synchronized playback command may be broadcast under
/// the room's current settings.
///
/// Returns `Ok(false)` when the room plays individually, in which case the
/// coordinator stays out of playback entirely and the command is dropped
/// without error.
pub fn authorize_sync_command(settings: &RoomSettings, is_host: bool) -> Result<bool, RoomError> {
    match settings.playback_mode {
        PlaybackMode::Individual => Ok(false),
        PlaybackMode::Sync => match settings.sync_control {
            SyncControl::Anyone => Ok(true),
            SyncControl::HostOnly if is_host => Ok(true),
            SyncControl::HostOnly => Err(RoomError::Unauthorized),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(playback_mode: PlaybackMode, sync_control: SyncControl) -> RoomSettings {
        RoomSettings {
            playback_mode,
            sync_control,
        }
    }

    #[test]
    fn individual_mode_never_broadcasts() {
        let settings = settings(PlaybackMode::Individual, SyncControl::Anyone);

        assert_eq!(authorize_sync_command(&settings, true), Ok(false));
        assert_eq!(authorize_sync_command(&settings, false), Ok(false));
    }

    #[test]
    fn host_only_sync_rejects_non_hosts() {
        let settings = settings(PlaybackMode::Sync, SyncControl::HostOnly);

        assert_eq!(authorize_sync_command(&settings, true), Ok(true));
        assert_eq!(
            authorize_sync_command(&settings, false),
            Err(RoomError::Unauthorized)
        );
    }

    #[test]
    fn anyone_sync_broadcasts_for_all_members() {
        let settings = settings(PlaybackMode::Sync, SyncControl::Anyone);

        assert_eq!(authorize_sync_command(&settings, true), Ok(true));
        assert_eq!(authorize_sync_command(&settings, false), Ok(true));
    }
}
