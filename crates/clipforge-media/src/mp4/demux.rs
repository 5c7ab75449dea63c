//! Track extraction from the movie box.
//!
//! The demuxer walks the trak children of moov in document order and
//! assembles one [`Track`] per parsable trak. It is lenient per track
//! (a bad trak is logged and skipped) and strict per table (a malformed
//! sample table fails that trak).

use super::sample_table::SampleTableBuilder;
use super::{Atom, AtomType, EditListEntry, Sample, Track, TrackKind};
use crate::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// Maximum allowed atom payload size (64 MiB), guarding payload reads
/// against absurd declared sizes in corrupt files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Sample-table and track-metadata parser over a seekable source.
pub struct Demuxer<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Demuxer<R> {
    /// Create a demuxer over a readable, seekable source.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        Ok(Self { reader, file_size })
    }

    /// Consume the demuxer and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Extract one track per parsable trak child of `moov`.
    ///
    /// A trak that fails to parse is skipped with a warning; the call
    /// fails only when no valid track remains.
    pub fn extract_tracks(&mut self, moov: &Atom) -> Result<Vec<Track>> {
        if moov.find_child(AtomType::MVEX).is_some() {
            return Err(Error::unsupported("fragmented movie (mvex present)"));
        }

        let mut tracks = Vec::new();
        for trak in moov
            .children
            .iter()
            .filter(|c| c.atom_type == AtomType::TRAK)
        {
            match self.parse_trak(trak) {
                Ok(track) => tracks.push(track),
                Err(err) => {
                    tracing::warn!(offset = trak.offset, error = %err, "skipping unparsable trak");
                }
            }
        }

        if tracks.is_empty() {
            return Err(Error::malformed(moov.offset, "no parsable trak in moov"));
        }
        Ok(tracks)
    }

    /// Read and validate an atom payload.
    fn read_payload(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::malformed(
                atom.offset,
                format!("{} payload of {size} bytes exceeds the 64 MiB limit", atom.atom_type),
            ));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset()))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::UnexpectedEof(atom.data_offset())
            } else {
                Error::Io(err)
            }
        })?;
        Ok(data)
    }

    fn parse_trak(&mut self, trak: &Atom) -> Result<Track> {
        let mut track = Track::default();

        let tkhd = trak
            .find_child(AtomType::TKHD)
            .ok_or(Error::MissingAtom("tkhd"))?;
        let tkhd_payload = self.read_payload(tkhd)?;
        parse_tkhd(&tkhd_payload, tkhd.offset, &mut track)?;
        track.tkhd = tkhd_payload;

        if let Some(elst) = trak
            .find_child(AtomType::EDTS)
            .and_then(|edts| edts.find_child(AtomType::ELST))
        {
            let data = self.read_payload(elst)?;
            let entries = parse_elst(&data, elst.offset)?;
            track.media_time_offset = entries
                .iter()
                .find(|e| e.media_time >= 0)
                .map_or(0, |e| e.media_time);
            tracing::debug!(
                entries = entries.len(),
                media_time_offset = track.media_time_offset,
                "parsed edit list"
            );
            track.edit_list = entries;
        }

        let mdia = trak
            .find_child(AtomType::MDIA)
            .ok_or(Error::MissingAtom("mdia"))?;

        let mdhd = mdia
            .find_child(AtomType::MDHD)
            .ok_or(Error::MissingAtom("mdhd"))?;
        let data = self.read_payload(mdhd)?;
        let (timescale, duration) = parse_mdhd(&data, mdhd.offset)?;
        if timescale == 0 {
            return Err(Error::malformed(mdhd.offset, "media timescale is zero"));
        }
        track.timescale = timescale;
        track.duration = duration;

        let hdlr = mdia
            .find_child(AtomType::HDLR)
            .ok_or(Error::MissingAtom("hdlr"))?;
        let data = self.read_payload(hdlr)?;
        if data.len() >= 12 {
            let mut handler = [0u8; 4];
            handler.copy_from_slice(&data[8..12]);
            track.kind = Some(TrackKind::from_handler(handler));
        }
        track.hdlr = data;

        let minf = mdia
            .find_child(AtomType::MINF)
            .ok_or(Error::MissingAtom("minf"))?;

        let header_type = match track.kind() {
            TrackKind::Video => Some(AtomType::VMHD),
            TrackKind::Audio => Some(AtomType::SMHD),
            _ => None,
        };
        if let Some(header) = header_type.and_then(|t| minf.find_child(t)) {
            track.media_header = Some(self.read_payload(header)?);
        }

        let stbl = minf
            .find_child(AtomType::STBL)
            .ok_or(Error::MissingAtom("stbl"))?;
        track.samples = self.map_samples(stbl)?;

        if let Some(stsd) = stbl.find_child(AtomType::STSD) {
            let data = self.read_payload(stsd)?;
            // stsd payload: fullbox(4) + entry_count(4) + entry size(4)
            // + entry type(4), which is the codec tag.
            if data.len() >= 16 {
                let mut tag = [0u8; 4];
                tag.copy_from_slice(&data[12..16]);
                track.codec_tag = Some(tag);
            }
            track.stsd = data;
        }

        if let Some(ctts) = stbl.find_child(AtomType::CTTS) {
            let data = self.read_payload(ctts)?;
            let mut offsets = Vec::new();
            for (count, offset) in parse_ctts(&data, ctts.offset)? {
                offsets.extend(std::iter::repeat(offset).take(count as usize));
            }
            if !offsets.is_empty() && offsets.len() != track.samples.len() {
                tracing::warn!(
                    ctts = offsets.len(),
                    samples = track.samples.len(),
                    "ctts entry count does not match sample count"
                );
            }
            track.cts_offsets = offsets;
        }

        tracing::debug!(
            id = track.id,
            kind = %track.kind(),
            timescale = track.timescale,
            samples = track.samples.len(),
            codec = track.codec_str().unwrap_or("?"),
            "parsed track"
        );

        Ok(track)
    }

    /// Flatten the stbl tables into resolved samples.
    fn map_samples(&mut self, stbl: &Atom) -> Result<Vec<Sample>> {
        let stts = stbl
            .find_child(AtomType::STTS)
            .ok_or(Error::MissingAtom("stts"))?;
        let stsz = stbl
            .find_child(AtomType::STSZ)
            .ok_or(Error::MissingAtom("stsz"))?;
        let stsc = stbl
            .find_child(AtomType::STSC)
            .ok_or(Error::MissingAtom("stsc"))?;
        let (chunk_atom, long_offsets) = stbl
            .find_child(AtomType::STCO)
            .map(|a| (a, false))
            .or_else(|| stbl.find_child(AtomType::CO64).map(|a| (a, true)))
            .ok_or(Error::MissingAtom("stco"))?;

        let mut builder = SampleTableBuilder::new(stbl.offset, self.file_size);

        let data = self.read_payload(stts)?;
        builder.set_stts(parse_stts(&data, stts.offset)?);

        let data = self.read_payload(stsz)?;
        let (default_size, sizes) = parse_stsz(&data, stsz.offset)?;
        builder.set_stsz(default_size, sizes);

        let data = self.read_payload(stsc)?;
        builder.set_stsc(parse_stsc(&data, stsc.offset)?);

        let data = self.read_payload(chunk_atom)?;
        builder.set_chunk_offsets(parse_chunk_offsets(&data, chunk_atom.offset, long_offsets)?);

        if let Some(stss) = stbl.find_child(AtomType::STSS) {
            let data = self.read_payload(stss)?;
            builder.set_sync_samples(parse_stss(&data, stss.offset)?);
        }

        builder.build()
    }
}

fn be_u16(data: &[u8], at: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&data[at..at + 2]);
    u16::from_be_bytes(b)
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[at..at + 4]);
    u32::from_be_bytes(b)
}

fn be_u64(data: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(b)
}

fn be_i16(data: &[u8], at: usize) -> i16 {
    be_u16(data, at) as i16
}

fn be_i32(data: &[u8], at: usize) -> i32 {
    be_u32(data, at) as i32
}

fn be_i64(data: &[u8], at: usize) -> i64 {
    be_u64(data, at) as i64
}

/// Validate a FullBox table payload and return (entry_count, entries body).
fn table_body<'a>(
    data: &'a [u8],
    offset: u64,
    kind: &str,
    header_len: usize,
    entry_size: usize,
) -> Result<(usize, &'a [u8])> {
    if data.len() < header_len {
        return Err(Error::malformed(offset, format!("{kind} payload too short")));
    }
    let count = be_u32(data, header_len - 4) as usize;
    let body = &data[header_len..];
    let need = count
        .checked_mul(entry_size)
        .ok_or_else(|| Error::malformed(offset, format!("{kind} entry count overflows")))?;
    if body.len() < need {
        return Err(Error::malformed(
            offset,
            format!("{kind} declares {count} entries but holds {}", body.len() / entry_size),
        ));
    }
    Ok((count, body))
}

/// Parse tkhd: track id, dimensions, and volume by version.
fn parse_tkhd(data: &[u8], offset: u64, track: &mut Track) -> Result<()> {
    if data.is_empty() {
        return Err(Error::malformed(offset, "tkhd payload empty"));
    }
    // After the FullBox header: v0 packs times/id/duration into 20
    // bytes, v1 into 32 (64-bit times). Both then carry 8 reserved
    // bytes, 8 bytes of layer/group/volume/reserved, a 36-byte matrix,
    // and the 16.16 width and height.
    let (id_at, volume_at, dims_at, need) = match data[0] {
        0 => (12, 36, 76, 84),
        1 => (20, 48, 88, 96),
        v => {
            return Err(Error::malformed(offset, format!("unknown tkhd version {v}")));
        }
    };
    if data.len() < need {
        return Err(Error::malformed(offset, "tkhd payload truncated"));
    }
    track.id = be_u32(data, id_at);
    track.volume = be_u16(data, volume_at);
    track.width = be_u32(data, dims_at);
    track.height = be_u32(data, dims_at + 4);
    Ok(())
}

/// Parse mdhd into (timescale, duration).
fn parse_mdhd(data: &[u8], offset: u64) -> Result<(u32, u64)> {
    if data.is_empty() {
        return Err(Error::malformed(offset, "mdhd payload empty"));
    }
    match data[0] {
        0 if data.len() >= 20 => Ok((be_u32(data, 12), u64::from(be_u32(data, 16)))),
        1 if data.len() >= 32 => Ok((be_u32(data, 20), be_u64(data, 24))),
        0 | 1 => Err(Error::malformed(offset, "mdhd payload truncated")),
        v => Err(Error::malformed(offset, format!("unknown mdhd version {v}"))),
    }
}

/// Parse elst entries by version.
fn parse_elst(data: &[u8], offset: u64) -> Result<Vec<EditListEntry>> {
    if data.len() < 8 {
        return Err(Error::malformed(offset, "elst payload too short"));
    }
    let version = data[0];
    let entry_size = if version == 1 { 20 } else { 12 };
    let (count, body) = table_body(data, offset, "elst", 8, entry_size)?;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let at = i * entry_size;
        let entry = if version == 1 {
            EditListEntry {
                segment_duration: be_u64(body, at),
                media_time: be_i64(body, at + 8),
                media_rate_int: be_i16(body, at + 16),
                media_rate_frac: be_i16(body, at + 18),
            }
        } else {
            EditListEntry {
                segment_duration: u64::from(be_u32(body, at)),
                media_time: i64::from(be_i32(body, at + 4)),
                media_rate_int: be_i16(body, at + 8),
                media_rate_frac: be_i16(body, at + 10),
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}

fn parse_stts(data: &[u8], offset: u64) -> Result<Vec<(u32, u32)>> {
    let (count, body) = table_body(data, offset, "stts", 8, 8)?;
    Ok((0..count)
        .map(|i| (be_u32(body, i * 8), be_u32(body, i * 8 + 4)))
        .collect())
}

fn parse_stss(data: &[u8], offset: u64) -> Result<Vec<u32>> {
    let (count, body) = table_body(data, offset, "stss", 8, 4)?;
    Ok((0..count).map(|i| be_u32(body, i * 4)).collect())
}

fn parse_stsc(data: &[u8], offset: u64) -> Result<Vec<(u32, u32, u32)>> {
    let (count, body) = table_body(data, offset, "stsc", 8, 12)?;
    Ok((0..count)
        .map(|i| {
            let at = i * 12;
            (be_u32(body, at), be_u32(body, at + 4), be_u32(body, at + 8))
        })
        .collect())
}

/// Parse stsz into (default_size, explicit sizes).
fn parse_stsz(data: &[u8], offset: u64) -> Result<(u32, Vec<u32>)> {
    if data.len() < 12 {
        return Err(Error::malformed(offset, "stsz payload too short"));
    }
    let default_size = be_u32(data, 4);
    if default_size != 0 {
        return Ok((default_size, Vec::new()));
    }
    let (count, body) = table_body(data, offset, "stsz", 12, 4)?;
    Ok((0, (0..count).map(|i| be_u32(body, i * 4)).collect()))
}

fn parse_chunk_offsets(data: &[u8], offset: u64, long_offsets: bool) -> Result<Vec<u64>> {
    if long_offsets {
        let (count, body) = table_body(data, offset, "co64", 8, 8)?;
        Ok((0..count).map(|i| be_u64(body, i * 8)).collect())
    } else {
        let (count, body) = table_body(data, offset, "stco", 8, 4)?;
        Ok((0..count).map(|i| u64::from(be_u32(body, i * 4))).collect())
    }
}

/// Parse ctts into (count, offset) runs. Version 0 stores unsigned
/// offsets that widen into the same signed bit pattern.
fn parse_ctts(data: &[u8], offset: u64) -> Result<Vec<(u32, i32)>> {
    if data.is_empty() {
        return Err(Error::malformed(offset, "ctts payload empty"));
    }
    let version = data[0];
    let (count, body) = table_body(data, offset, "ctts", 8, 8)?;
    Ok((0..count)
        .map(|i| {
            let at = i * 8;
            let sample_offset = match version {
                0 => be_u32(body, at + 4) as i32,
                _ => be_i32(body, at + 4),
            };
            (be_u32(body, at), sample_offset)
        })
        .collect())
}
