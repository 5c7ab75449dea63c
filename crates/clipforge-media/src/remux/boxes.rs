//! Output box construction.
//!
//! Boxes under construction form a tagged tree: a leaf carries an opaque
//! payload, a container carries children. Sizes derive from the tree, so
//! a moov built twice with equally sized tables serializes to the same
//! byte length regardless of the offset values inside.

use crate::mp4::{AtomType, EditListEntry, Track};
use bytes::{BufMut, BytesMut};

/// A box being assembled for the output file.
#[derive(Debug, Clone)]
pub enum BoxNode {
    Leaf { kind: AtomType, payload: Vec<u8> },
    Container { kind: AtomType, children: Vec<BoxNode> },
}

impl BoxNode {
    pub fn leaf(kind: AtomType, payload: impl Into<Vec<u8>>) -> Self {
        Self::Leaf {
            kind,
            payload: payload.into(),
        }
    }

    pub fn container(kind: AtomType, children: Vec<BoxNode>) -> Self {
        Self::Container { kind, children }
    }

    /// Total serialized size including the 8-byte header.
    pub fn size(&self) -> u64 {
        match self {
            Self::Leaf { payload, .. } => 8 + payload.len() as u64,
            Self::Container { children, .. } => {
                8 + children.iter().map(BoxNode::size).sum::<u64>()
            }
        }
    }

    /// Serialize the tree into bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.size() as usize);
        self.write_into(&mut buf);
        buf.to_vec()
    }

    fn write_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.size() as u32);
        match self {
            Self::Leaf { kind, payload } => {
                buf.put_slice(&kind.0);
                buf.put_slice(payload);
            }
            Self::Container { kind, children } => {
                buf.put_slice(&kind.0);
                for child in children {
                    child.write_into(buf);
                }
            }
        }
    }
}

/// The fixed 24-byte ftyp box: isom major brand, minor version 512,
/// compatible brands isom + mp41.
pub fn ftyp_bytes() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u32(24);
    buf.put_slice(b"ftyp");
    buf.put_slice(b"isom");
    buf.put_u32(512);
    buf.put_slice(b"isom");
    buf.put_slice(b"mp41");
    buf.to_vec()
}

/// 3x3 identity transformation matrix, 16.16 / 2.30 fixed point.
fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(value);
    }
}

/// Rescale a tick count between timescales using 64-bit arithmetic.
pub fn convert_time(value: u64, from_scale: u32, to_scale: u32) -> u64 {
    if from_scale == 0 {
        return 0;
    }
    value * u64::from(to_scale) / u64::from(from_scale)
}

/// Movie timescale of the output header.
pub const MOVIE_TIMESCALE: u32 = 1000;

pub fn mvhd(tracks: &[Track]) -> BoxNode {
    let duration = tracks
        .iter()
        .map(|t| convert_time(t.media_duration(), t.timescale, MOVIE_TIMESCALE))
        .max()
        .unwrap_or(0);

    let mut buf = BytesMut::with_capacity(100);
    buf.put_u32(0); // version + flags
    buf.put_u32(0); // creation time
    buf.put_u32(0); // modification time
    buf.put_u32(MOVIE_TIMESCALE);
    buf.put_u32(duration as u32); // fits u32: checked before building
    buf.put_u32(0x0001_0000); // rate 1.0
    buf.put_u16(0x0100); // volume 1.0
    buf.put_bytes(0, 10); // reserved
    put_identity_matrix(&mut buf);
    buf.put_bytes(0, 24); // pre-defined
    buf.put_u32(tracks.len() as u32 + 1); // next track id
    BoxNode::leaf(AtomType::MVHD, buf.to_vec())
}

pub fn tkhd(track: &Track, track_id: u32) -> BoxNode {
    let duration = convert_time(track.media_duration(), track.timescale, MOVIE_TIMESCALE);

    let mut buf = BytesMut::with_capacity(84);
    buf.put_u32(0x0000_0003); // version 0, flags enabled | in_movie
    buf.put_u32(0); // creation time
    buf.put_u32(0); // modification time
    buf.put_u32(track_id);
    buf.put_u32(0); // reserved
    buf.put_u32(duration as u32); // fits u32: checked before building
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(if track.kind().is_audio() { 0x0100 } else { 0 });
    buf.put_u16(0); // reserved
    put_identity_matrix(&mut buf);
    buf.put_u32(track.width);
    buf.put_u32(track.height);
    BoxNode::leaf(AtomType::TKHD, buf.to_vec())
}

pub fn edts(entries: &[EditListEntry]) -> BoxNode {
    let mut buf = BytesMut::with_capacity(8 + entries.len() * 12);
    buf.put_u32(0); // version 0 + flags
    buf.put_u32(entries.len() as u32);
    for entry in entries {
        buf.put_u32(u32::try_from(entry.segment_duration).unwrap_or(u32::MAX));
        buf.put_i32(entry.media_time as i32);
        buf.put_i16(entry.media_rate_int);
        buf.put_i16(entry.media_rate_frac);
    }
    BoxNode::container(
        AtomType::EDTS,
        vec![BoxNode::leaf(AtomType::ELST, buf.to_vec())],
    )
}

pub fn mdhd(track: &Track) -> BoxNode {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u32(0); // version + flags
    buf.put_u32(0); // creation time
    buf.put_u32(0); // modification time
    buf.put_u32(track.timescale);
    buf.put_u32(track.media_duration() as u32); // fits u32: checked before building
    buf.put_u16(0x55c4); // language: undetermined
    buf.put_u16(0); // pre-defined
    BoxNode::leaf(AtomType::MDHD, buf.to_vec())
}

/// The constant dref payload: one self-referencing `url ` entry.
pub fn dinf() -> BoxNode {
    let dref = [
        0u8, 0, 0, 0, // version + flags
        0, 0, 0, 1, // entry count
        0, 0, 0, 12, b'u', b'r', b'l', b' ', 0, 0, 0, 1,
    ];
    BoxNode::container(
        AtomType::DINF,
        vec![BoxNode::leaf(AtomType::DREF, dref.to_vec())],
    )
}

/// stts with one expanded (count = 1, duration) entry per sample.
pub fn stts(track: &Track) -> BoxNode {
    let mut buf = BytesMut::with_capacity(8 + track.samples.len() * 8);
    buf.put_u32(0);
    buf.put_u32(track.samples.len() as u32);
    for sample in &track.samples {
        buf.put_u32(1);
        buf.put_u32(u32::try_from(sample.duration).unwrap_or(u32::MAX));
    }
    BoxNode::leaf(AtomType::STTS, buf.to_vec())
}

/// stsz with explicit per-sample sizes.
pub fn stsz(track: &Track) -> BoxNode {
    let mut buf = BytesMut::with_capacity(12 + track.samples.len() * 4);
    buf.put_u32(0);
    buf.put_u32(0); // default size: per-sample list follows
    buf.put_u32(track.samples.len() as u32);
    for sample in &track.samples {
        buf.put_u32(u32::try_from(sample.size).unwrap_or(u32::MAX));
    }
    BoxNode::leaf(AtomType::STSZ, buf.to_vec())
}

/// Chunk offsets, one per sample, 32- or 64-bit wide.
pub fn chunk_offsets(offsets: &[u64], long_offsets: bool) -> BoxNode {
    if long_offsets {
        let mut buf = BytesMut::with_capacity(8 + offsets.len() * 8);
        buf.put_u32(0);
        buf.put_u32(offsets.len() as u32);
        for &offset in offsets {
            buf.put_u64(offset);
        }
        BoxNode::leaf(AtomType::CO64, buf.to_vec())
    } else {
        let mut buf = BytesMut::with_capacity(8 + offsets.len() * 4);
        buf.put_u32(0);
        buf.put_u32(offsets.len() as u32);
        for &offset in offsets {
            buf.put_u32(offset as u32);
        }
        BoxNode::leaf(AtomType::STCO, buf.to_vec())
    }
}

/// stsc with the single one-sample-per-chunk rule the interleaved layout
/// maps to.
pub fn stsc() -> BoxNode {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u32(0);
    buf.put_u32(1); // entry count
    buf.put_u32(1); // first chunk
    buf.put_u32(1); // samples per chunk
    buf.put_u32(1); // sample description id
    BoxNode::leaf(AtomType::STSC, buf.to_vec())
}

/// stss listing the 1-based sync sample numbers.
pub fn stss(track: &Track) -> BoxNode {
    let keyframes: Vec<u32> = track
        .samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_keyframe)
        .map(|(i, _)| i as u32 + 1)
        .collect();

    let mut buf = BytesMut::with_capacity(8 + keyframes.len() * 4);
    buf.put_u32(0);
    buf.put_u32(keyframes.len() as u32);
    for kf in keyframes {
        buf.put_u32(kf);
    }
    BoxNode::leaf(AtomType::STSS, buf.to_vec())
}

/// ctts with one expanded (count = 1, offset) entry per sample, version
/// 0 semantics (offsets stored as their unsigned bit pattern).
pub fn ctts(offsets: &[i32]) -> BoxNode {
    let mut buf = BytesMut::with_capacity(8 + offsets.len() * 8);
    buf.put_u32(0);
    buf.put_u32(offsets.len() as u32);
    for &offset in offsets {
        buf.put_u32(1);
        buf.put_u32(offset as u32);
    }
    BoxNode::leaf(AtomType::CTTS, buf.to_vec())
}
