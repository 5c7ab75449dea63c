//! Track and sample data model.

use serde::Serialize;

/// Track kind, mapped from the hdlr handler type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Hint,
    Meta,
}

impl TrackKind {
    /// Map a handler type code to a track kind. Unknown handlers fall
    /// back to [`TrackKind::Meta`].
    pub fn from_handler(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            _ => Self::Meta,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Hint => "hint",
            Self::Meta => "meta",
        };
        write!(f, "{name}")
    }
}

/// A single resolved media sample.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    /// 1-based sample number.
    pub id: u32,
    /// Whether this sample is a sync sample (keyframe).
    pub is_keyframe: bool,
    /// Absolute byte offset of the sample data in the source file.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u64,
    /// Decode timestamp in track timescale units.
    pub decode_time: u64,
    /// Sample duration in track timescale units.
    pub duration: u64,
}

/// A single entry of an edit list (elst).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditListEntry {
    /// Duration of this edit in movie timescale units.
    pub segment_duration: u64,
    /// Starting media time of the edit (media timescale); -1 marks an
    /// empty edit (dwell).
    pub media_time: i64,
    /// Media rate, 16.16 fixed point split into integer and fraction.
    pub media_rate_int: i16,
    pub media_rate_frac: i16,
}

/// A logical media stream with its flattened sample table.
#[derive(Debug, Clone, Default)]
pub struct Track {
    /// Track ID as declared in tkhd.
    pub id: u32,
    /// Track kind from the handler box.
    pub kind: Option<TrackKind>,
    /// Media timescale in ticks per second.
    pub timescale: u32,
    /// Declared media duration in timescale units.
    pub duration: u64,
    /// Flattened samples in decode order.
    pub samples: Vec<Sample>,

    /// Raw payloads carried through for bit-exact round-trip.
    pub stsd: Vec<u8>,
    pub hdlr: Vec<u8>,
    /// vmhd (video) or smhd (audio) payload.
    pub media_header: Option<Vec<u8>>,
    pub tkhd: Vec<u8>,

    /// Visual dimensions, 16.16 fixed point (zero for non-video).
    pub width: u32,
    pub height: u32,
    /// Audio volume, 8.8 fixed point (zero for non-audio).
    pub volume: u16,

    /// Per-sample composition time offsets. Empty means PTS == DTS.
    pub cts_offsets: Vec<i32>,

    /// Codec tag from the first stsd entry ("avc1", "mp4a", ...).
    pub codec_tag: Option<[u8; 4]>,

    /// Edit list entries, in file order.
    pub edit_list: Vec<EditListEntry>,
    /// Media time of the first non-empty edit: the initial presentation
    /// offset in media timescale units.
    pub media_time_offset: i64,
}

impl Track {
    /// Track kind, defaulting to meta when no handler was parsed.
    pub fn kind(&self) -> TrackKind {
        self.kind.unwrap_or(TrackKind::Meta)
    }

    /// Sum of all sample durations, in media timescale units.
    pub fn media_duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration).sum()
    }

    /// Codec tag rendered as a string, when one was detected.
    pub fn codec_str(&self) -> Option<&str> {
        self.codec_tag
            .as_ref()
            .and_then(|tag| std::str::from_utf8(tag).ok())
    }
}
