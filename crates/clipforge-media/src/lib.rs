//! Clipforge-Media: MP4 probing, sample-table demuxing, and zero-copy
//! remuxing.
//!
//! This crate is the bit-stream surgeon behind clipforge. It reads an
//! ISO Base Media File Format container, flattens its compressed sample
//! tables into per-sample arrays, narrows them to a keyframe-aligned
//! time window, and writes a new, valid, fast-start MP4 whose media
//! payload is bit-copied from the source. Nothing is decoded or
//! re-encoded.
//!
//! # Modules
//!
//! - `mp4` - box-tree probe, shared atom model, and track demuxer
//! - `cutter` - multi-track time-window selection with keyframe snapping
//! - `remux` - interleaved two-pass container writer
//!
//! # Pipeline
//!
//! ```text
//! file      → probe   → box tree
//! box tree  → Demuxer → Vec<Track> with flat samples
//! Vec<Track> + [t0,t1] → Cutter  → narrowed Vec<Track>
//! Vec<Track> + file    → Remuxer → output file
//! ```
//!
//! The phases run strictly in sequence over a single shared source
//! handle: all parsing completes before the remuxer starts copying.

pub mod cutter;
pub mod error;
pub mod mp4;
pub mod remux;

pub use cutter::{CutReport, Cutter};
pub use error::{Error, Result};
pub use mp4::{probe, Atom, AtomType, Demuxer, Mp4File, Sample, Track, TrackKind};
pub use remux::{EditListPolicy, RemuxOptions, Remuxer};
