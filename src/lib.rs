//! Clipforge: keyframe-accurate MP4 cutting without re-encoding.
//!
//! The heavy lifting lives in the `clipforge-media` crate; this crate
//! orchestrates the probe → demux → cut → remux pipeline and presents
//! results to the CLI.

pub mod pipeline;

pub use pipeline::cut_file;
