//! Sample-table flattening.
//!
//! The stbl child tables describe samples in compressed form:
//! - stts: run-length sample durations (decode time)
//! - stsz: sample sizes (uniform or per-sample)
//! - stsc: sample-to-chunk mapping rules
//! - stco/co64: chunk byte offsets
//! - stss: sync sample numbers (keyframes)
//!
//! The builder resolves them into one dense `Sample` array with absolute
//! byte offsets, decode times, durations, sizes, and keyframe flags.

use super::Sample;
use crate::{Error, Result};
use std::collections::HashSet;

/// Builder for flattening raw sample tables into resolved samples.
pub struct SampleTableBuilder {
    /// Offset of the stbl atom, used in diagnostics.
    stbl_offset: u64,
    /// Source file size; samples must not extend past it.
    file_size: u64,
    // stts: (sample_count, sample_duration)
    stts_entries: Vec<(u32, u32)>,
    // stss: 1-based sync sample numbers
    sync_samples: Vec<u32>,
    // stsc: (first_chunk, samples_per_chunk, sample_description_id)
    stsc_entries: Vec<(u32, u32, u32)>,
    // stsz: uniform size, or 0 with per-sample sizes
    default_size: u32,
    sample_sizes: Vec<u32>,
    // stco/co64 chunk offsets
    chunk_offsets: Vec<u64>,
}

impl SampleTableBuilder {
    /// Create a builder for a sample table at `stbl_offset` in a file of
    /// `file_size` bytes.
    pub fn new(stbl_offset: u64, file_size: u64) -> Self {
        Self {
            stbl_offset,
            file_size,
            stts_entries: Vec::new(),
            sync_samples: Vec::new(),
            stsc_entries: Vec::new(),
            default_size: 0,
            sample_sizes: Vec::new(),
            chunk_offsets: Vec::new(),
        }
    }

    /// Set stts (decoding time to sample) entries.
    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Set stss (sync sample) entries. An empty table means every sample
    /// is a sync sample.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = samples;
    }

    /// Set stsc (sample to chunk) entries.
    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz (sample size) data.
    pub fn set_stsz(&mut self, default_size: u32, sizes: Vec<u32>) {
        self.default_size = default_size;
        self.sample_sizes = sizes;
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::malformed(self.stbl_offset, reason)
    }

    /// Resolve the tables into a dense sample array.
    pub fn build(self) -> Result<Vec<Sample>> {
        let total: u64 = self.stts_entries.iter().map(|(count, _)| u64::from(*count)).sum();
        let total = usize::try_from(total)
            .map_err(|_| self.malformed("stts sample count exceeds addressable range"))?;

        if self.default_size == 0 && self.sample_sizes.len() != total {
            return Err(self.malformed(format!(
                "stsz lists {} sizes but stts describes {} samples",
                self.sample_sizes.len(),
                total
            )));
        }

        if total == 0 {
            return Ok(Vec::new());
        }

        // stsc rules apply from first_chunk until the next rule; the walk
        // below requires strictly ascending first_chunk.
        for pair in self.stsc_entries.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(self.malformed("stsc entries not sorted by first_chunk"));
            }
        }

        let sync_set: HashSet<u32> = self.sync_samples.iter().copied().collect();
        let all_sync = self.sync_samples.is_empty();

        let mut samples = Vec::with_capacity(total);
        let mut decode_time = 0u64;
        for &(count, duration) in &self.stts_entries {
            for _ in 0..count {
                let id = samples.len() as u32 + 1;
                let size = if self.default_size != 0 {
                    u64::from(self.default_size)
                } else {
                    u64::from(self.sample_sizes[samples.len()])
                };
                samples.push(Sample {
                    id,
                    is_keyframe: all_sync || sync_set.contains(&id),
                    offset: 0,
                    size,
                    decode_time,
                    duration: u64::from(duration),
                });
                decode_time += u64::from(duration);
            }
        }

        // Walk chunks assigning byte offsets. Each chunk takes its
        // samples_per_chunk from the last stsc rule whose first_chunk is
        // at or below the 1-based chunk index.
        let mut sample_idx = 0usize;
        let mut rule_idx: Option<usize> = None;
        for (i, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            if sample_idx == total {
                break;
            }
            let chunk_number = i as u32 + 1;
            while self
                .stsc_entries
                .get(rule_idx.map_or(0, |r| r + 1))
                .is_some_and(|e| e.0 <= chunk_number)
            {
                rule_idx = Some(rule_idx.map_or(0, |r| r + 1));
            }
            let samples_per_chunk = match rule_idx {
                Some(r) => self.stsc_entries[r].1,
                None => {
                    return Err(
                        self.malformed(format!("chunk {chunk_number} has no stsc rule"))
                    )
                }
            };

            let mut offset = chunk_offset;
            for _ in 0..samples_per_chunk {
                if sample_idx == total {
                    break;
                }
                let sample = &mut samples[sample_idx];
                sample.offset = offset;
                if offset + sample.size > self.file_size {
                    return Err(self.malformed(format!(
                        "sample {} extends past end of file ({} + {} > {})",
                        sample.id, offset, sample.size, self.file_size
                    )));
                }
                offset += sample.size;
                sample_idx += 1;
            }
        }

        if sample_idx < total {
            return Err(self.malformed(format!(
                "chunk table covers {sample_idx} of {total} samples"
            )));
        }

        Ok(samples)
    }
}
