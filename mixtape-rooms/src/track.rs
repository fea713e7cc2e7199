use serde::{Deserialize, Serialize};

pub type TrackId = String;

/// A single entry in a room's shared playlist.
///
/// Identity is the `id` field only. Everything else is display metadata and
/// may be defaulted by the client. The locator is an opaque reference to
/// retrievable audio; the coordinator stores it verbatim and never looks
/// inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_artist")]
    pub artist: String,

    #[serde(default)]
    pub album: String,

    /// Length in seconds.
    #[serde(default)]
    pub duration: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_artist() -> String {
    "Unknown Artist".to_string()
}

impl Track {
    /// Clamps out-of-range metadata and fills blank display fields.
    pub fn normalized(mut self) -> Self {
        if self.title.trim().is_empty() {
            self.title = default_title();
        }

        if self.artist.trim().is_empty() {
            self.artist = default_artist();
        }

        self.duration = self.duration.max(0.);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_fills_blank_metadata() {
        let track = Track {
            id: "t1".to_string(),
            title: "  ".to_string(),
            artist: String::new(),
            album: String::new(),
            duration: -3.,
            locator: None,
        }
        .normalized();

        assert_eq!(track.title, "Untitled");
        assert_eq!(track.artist, "Unknown Artist");
        assert_eq!(track.duration, 0.);
    }

    #[test]
    fn deserializes_with_defaults() {
        let track: Track = serde_json::from_str(r#"{ "id": "t1" }"#).unwrap();

        assert_eq!(track.title, "Untitled");
        assert_eq!(track.artist, "Unknown Artist");
        assert_eq!(track.duration, 0.);
        assert!(track.locator.is_none());
    }
}
