//! End-to-end cut pipeline.
//!
//! The input file is opened exactly once. The demuxer reads table
//! payloads through the handle while parsing; once parsing is done the
//! same handle moves to the remuxer for sample copies, so the two phases
//! never interleave seeks.

use anyhow::{bail, Context, Result};
use clipforge_media::{CutReport, Cutter, Mp4File, RemuxOptions, Remuxer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Cut `[start_secs, end_secs]` out of `input` into a new file at
/// `output`, returning one report per source track.
pub fn cut_file(
    input: &Path,
    output: &Path,
    start_secs: f64,
    end_secs: f64,
    options: RemuxOptions,
) -> Result<Vec<CutReport>> {
    if !(start_secs >= 0.0 && end_secs > start_secs) {
        bail!("invalid cut window: [{start_secs}, {end_secs}]");
    }

    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut reader = BufReader::new(file);

    tracing::info!(input = %input.display(), "probing container");
    let mp4 = Mp4File::parse(&mut reader).context("probe/demux failed")?;
    tracing::info!(tracks = mp4.tracks.len(), "extracted tracks");

    tracing::info!(start_secs, end_secs, "selecting cut window");
    let (tracks, reports) = Cutter::new(mp4.tracks).cut(start_secs, end_secs);

    let mut remuxer = Remuxer::with_options(reader, options);
    remuxer
        .write_file(output, &tracks)
        .context("remux failed")?;
    tracing::info!(output = %output.display(), "wrote output file");

    Ok(reports)
}
