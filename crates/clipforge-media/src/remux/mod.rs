//! Interleaved remuxer.
//!
//! Rebuilds a fast-start MP4 (ftyp, moov, then a single mdat) from
//! narrowed tracks, bit-copying sample payloads from the source file.
//! Chunk offsets inside moov are absolute file positions, so the moov
//! byte length must be fixed before offsets exist: a placeholder moov
//! with zeroed offsets is serialized first, then replaced by the real
//! moov, which only differs in offset values, never in layout.

mod boxes;

pub use boxes::convert_time;

use crate::mp4::{AtomType, Track};
use crate::{Error, Result};
use boxes::BoxNode;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Reusable copy buffer size for the mdat body.
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Payload size beyond which chunk offsets are written as co64.
/// Conservative: 32-bit stco could address twice this.
const CO64_THRESHOLD: u64 = 1 << 31;

const FTYP_SIZE: u64 = 24;
const MDAT_HEADER_SIZE: u64 = 8;

/// What to do with source edit lists when rewriting the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditListPolicy {
    /// Omit edit lists: after a cut the media origin moves, so a stale
    /// media_time would skew presentation. This is the default.
    #[default]
    Drop,
    /// Copy the source entries verbatim, for files whose first edit
    /// encodes an intentional sync delay.
    Preserve,
}

/// Remux configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemuxOptions {
    pub edit_list: EditListPolicy,
}

/// One entry of the interleave plan: a sample addressed by track and
/// index, ordered by its normalized time.
#[derive(Debug, Clone, Copy)]
struct InterleavedSample {
    track_index: usize,
    sample_index: usize,
    time_seconds: f64,
    source_offset: u64,
    size: u64,
}

/// Writes narrowed tracks back out as a self-contained MP4.
pub struct Remuxer<R> {
    source: R,
    options: RemuxOptions,
}

impl<R: Read + Seek> Remuxer<R> {
    /// Create a remuxer reading sample payloads from `source`.
    pub fn new(source: R) -> Self {
        Self::with_options(source, RemuxOptions::default())
    }

    pub fn with_options(source: R, options: RemuxOptions) -> Self {
        Self { source, options }
    }

    /// Write a fast-start MP4 at `out_path` containing the given tracks.
    ///
    /// Fails with [`Error::EmptyCut`] before creating the file when no
    /// track has samples; any error after creation removes the partial
    /// output.
    pub fn write_file(&mut self, out_path: &Path, tracks: &[Track]) -> Result<()> {
        if tracks.iter().all(|t| t.samples.is_empty()) {
            return Err(Error::EmptyCut);
        }

        let out = File::create(out_path)?;
        let result = self.write_to(BufWriter::new(out), tracks);
        if result.is_err() {
            let _ = fs::remove_file(out_path);
        }
        result
    }

    fn write_to<W: Write>(&mut self, mut out: W, tracks: &[Track]) -> Result<()> {
        let interleaved = build_interleaved_order(tracks);
        let payload_size: u64 = interleaved.iter().map(|s| s.size).sum();
        tracing::debug!(
            samples = interleaved.len(),
            tracks = tracks.len(),
            payload_size,
            "built interleave plan"
        );

        if payload_size + MDAT_HEADER_SIZE > u64::from(u32::MAX) {
            return Err(Error::unsupported(
                "mdat payload too large for a 32-bit box header",
            ));
        }
        let long_offsets = needs_long_offsets(payload_size);

        // The mvhd/tkhd/mdhd duration fields are 32-bit. Reject rather
        // than truncate when a track's duration cannot be represented,
        // in either the media or the movie timescale.
        for track in tracks {
            let media_duration = track.media_duration();
            let movie_duration =
                convert_time(media_duration, track.timescale, boxes::MOVIE_TIMESCALE);
            if media_duration > u64::from(u32::MAX) || movie_duration > u64::from(u32::MAX) {
                return Err(Error::unsupported(
                    "track duration exceeds 32-bit box field",
                ));
            }
        }

        // Pass 1: a placeholder moov with zeroed offsets fixes the size.
        let zero_offsets: Vec<Vec<u64>> = tracks
            .iter()
            .map(|t| vec![0u64; t.samples.len()])
            .collect();
        let placeholder = self.build_moov(tracks, &zero_offsets, long_offsets);
        let moov_size = placeholder.serialize().len() as u64;

        // Pass 2: absolute offsets by prefix sum over the interleaved
        // write order, starting right after the mdat header.
        let mdat_start = FTYP_SIZE + moov_size + MDAT_HEADER_SIZE;
        let mut track_offsets = zero_offsets;
        let mut position = mdat_start;
        for entry in &interleaved {
            track_offsets[entry.track_index][entry.sample_index] = position;
            position += entry.size;
        }

        let moov_bytes = self
            .build_moov(tracks, &track_offsets, long_offsets)
            .serialize();
        debug_assert_eq!(moov_bytes.len() as u64, moov_size);

        out.write_all(&boxes::ftyp_bytes())?;
        out.write_all(&moov_bytes)?;
        out.write_all(&((payload_size + MDAT_HEADER_SIZE) as u32).to_be_bytes())?;
        out.write_all(b"mdat")?;

        tracing::debug!(bytes = payload_size, "copying interleaved mdat payload");
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        for entry in &interleaved {
            self.source.seek(SeekFrom::Start(entry.source_offset))?;
            let mut remaining = entry.size;
            while remaining > 0 {
                let chunk = buffer.len().min(remaining as usize);
                self.source.read_exact(&mut buffer[..chunk])?;
                out.write_all(&buffer[..chunk])?;
                remaining -= chunk as u64;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn build_moov(&self, tracks: &[Track], offsets: &[Vec<u64>], long_offsets: bool) -> BoxNode {
        let mut children = Vec::with_capacity(tracks.len() + 1);
        children.push(boxes::mvhd(tracks));
        for (i, track) in tracks.iter().enumerate() {
            children.push(self.build_trak(track, i as u32 + 1, &offsets[i], long_offsets));
        }
        BoxNode::container(AtomType::MOOV, children)
    }

    fn build_trak(
        &self,
        track: &Track,
        track_id: u32,
        offsets: &[u64],
        long_offsets: bool,
    ) -> BoxNode {
        let mut stbl_children = vec![
            BoxNode::leaf(AtomType::STSD, track.stsd.clone()),
            boxes::stts(track),
            boxes::stsz(track),
            boxes::chunk_offsets(offsets, long_offsets),
            boxes::stsc(),
        ];
        if track.kind().is_video() {
            stbl_children.push(boxes::stss(track));
        }
        if !track.cts_offsets.is_empty() {
            stbl_children.push(boxes::ctts(&track.cts_offsets));
        }

        let mut minf_children = Vec::with_capacity(3);
        if let Some(header) = &track.media_header {
            let kind = if track.kind().is_audio() {
                AtomType::SMHD
            } else {
                AtomType::VMHD
            };
            minf_children.push(BoxNode::leaf(kind, header.clone()));
        }
        minf_children.push(boxes::dinf());
        minf_children.push(BoxNode::container(AtomType::STBL, stbl_children));

        let mdia = BoxNode::container(
            AtomType::MDIA,
            vec![
                boxes::mdhd(track),
                BoxNode::leaf(AtomType::HDLR, track.hdlr.clone()),
                BoxNode::container(AtomType::MINF, minf_children),
            ],
        );

        let mut trak_children = vec![boxes::tkhd(track, track_id)];
        if self.options.edit_list == EditListPolicy::Preserve && !track.edit_list.is_empty() {
            trak_children.push(boxes::edts(&track.edit_list));
        }
        trak_children.push(mdia);
        BoxNode::container(AtomType::TRAK, trak_children)
    }
}

fn needs_long_offsets(payload_size: u64) -> bool {
    payload_size > CO64_THRESHOLD
}

/// Flatten all tracks into one list ordered by presentation time, ties
/// broken by track index, so audio and video land interleaved in the
/// output mdat. The sort is stable, preserving decode order per track.
fn build_interleaved_order(tracks: &[Track]) -> Vec<InterleavedSample> {
    let mut all = Vec::with_capacity(tracks.iter().map(|t| t.samples.len()).sum());
    for (track_index, track) in tracks.iter().enumerate() {
        let timescale = if track.timescale == 0 {
            1000.0
        } else {
            f64::from(track.timescale)
        };
        for (sample_index, sample) in track.samples.iter().enumerate() {
            all.push(InterleavedSample {
                track_index,
                sample_index,
                time_seconds: sample.decode_time as f64 / timescale,
                source_offset: sample.offset,
                size: sample.size,
            });
        }
    }
    all.sort_by(|a, b| {
        a.time_seconds
            .total_cmp(&b.time_seconds)
            .then(a.track_index.cmp(&b.track_index))
    });
    all
}
