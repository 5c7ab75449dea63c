//! MP4 container parsing.
//!
//! This module provides the shared box model, the structural probe, and
//! the track demuxer that flattens sample tables into per-sample arrays.

mod atoms;
mod demux;
mod probe;
mod sample_table;
mod track;

#[cfg(test)]
pub(crate) mod test_support;

pub use atoms::{find_atom, Atom, AtomType};
pub use demux::Demuxer;
pub use probe::probe;
pub use sample_table::SampleTableBuilder;
pub use track::{EditListEntry, Sample, Track, TrackKind};

use crate::{Error, Result};
use std::io::{Read, Seek};

/// A parsed MP4 file: the box tree plus the extracted tracks.
#[derive(Debug)]
pub struct Mp4File {
    /// Top-level atoms in file order.
    pub atoms: Vec<Atom>,
    /// Tracks in trak document order.
    pub tracks: Vec<Track>,
}

impl Mp4File {
    /// Probe and demux a file from a reader.
    ///
    /// The reader is left positioned arbitrarily; callers that go on to
    /// remux reuse the same handle afterwards.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let atoms = probe(reader)?;

        if find_atom(&atoms, AtomType::MOOF).is_some() {
            return Err(Error::unsupported("fragmented movie (moof present)"));
        }
        let moov = find_atom(&atoms, AtomType::MOOV).ok_or(Error::MissingAtom("moov"))?;

        let tracks = Demuxer::new(&mut *reader)?.extract_tracks(moov)?;
        Ok(Self { atoms, tracks })
    }
}
