//! Synthetic MP4 construction for unit tests.
//!
//! Files are laid out mdat-first so chunk offsets are known before the
//! moov is assembled.

use bytes::{BufMut, BytesMut};

/// Wrap a payload in a box header.
pub fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u32((8 + payload.len()) as u32);
    buf.put_slice(kind);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Wrap child boxes in a container box.
pub fn container(kind: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = children.iter().flatten().copied().collect();
    boxed(kind, &payload)
}

/// The standard 24-byte ftyp box.
pub fn ftyp_box() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u32(24);
    buf.put_slice(b"ftyp");
    buf.put_slice(b"isom");
    buf.put_u32(512);
    buf.put_slice(b"isom");
    buf.put_slice(b"mp41");
    buf.to_vec()
}

/// A version-0 tkhd payload (84 bytes).
pub fn tkhd_payload(id: u32, width: u32, height: u32, volume: u16) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(84);
    buf.put_u32(0x0000_0003); // version 0, flags enabled|in_movie
    buf.put_u32(0); // creation
    buf.put_u32(0); // modification
    buf.put_u32(id);
    buf.put_u32(0); // reserved
    buf.put_u32(0); // duration
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(volume);
    buf.put_u16(0); // reserved
    put_identity_matrix(&mut buf);
    buf.put_u32(width);
    buf.put_u32(height);
    buf.to_vec()
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(value);
    }
}

#[derive(Debug, Clone)]
pub struct VideoTrackSpec {
    pub timescale: u32,
    pub sample_count: u32,
    pub sample_duration: u32,
    pub sample_size: u32,
    /// 1-based sync sample numbers; empty omits the stss box.
    pub keyframes: Vec<u32>,
    /// Version-0 elst entries as (segment_duration, media_time).
    pub edit_list: Vec<(u32, i32)>,
    /// Per-sample composition offsets; empty omits the ctts box.
    pub cts_offsets: Vec<i32>,
}

impl Default for VideoTrackSpec {
    fn default() -> Self {
        Self {
            timescale: 600,
            sample_count: 0,
            sample_duration: 40,
            sample_size: 100,
            keyframes: Vec::new(),
            edit_list: Vec::new(),
            cts_offsets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioTrackSpec {
    pub timescale: u32,
    pub sample_count: u32,
    pub sample_duration: u32,
    pub sample_size: u32,
}

#[derive(Debug, Clone)]
pub enum TrackSpec {
    Video(VideoTrackSpec),
    Audio(AudioTrackSpec),
}

impl TrackSpec {
    fn sample_count(&self) -> u32 {
        match self {
            Self::Video(v) => v.sample_count,
            Self::Audio(a) => a.sample_count,
        }
    }

    fn sample_size(&self) -> u32 {
        match self {
            Self::Video(v) => v.sample_size,
            Self::Audio(a) => a.sample_size,
        }
    }
}

/// Deterministic sample payload byte for (track, sample) pairs.
pub fn sample_fill(track_index: usize, sample_index: u32) -> u8 {
    (track_index as u32 * 31 + sample_index) as u8
}

/// Build a complete file: ftyp + mdat (one chunk per track) + moov.
pub fn build_file(specs: &[TrackSpec]) -> Vec<u8> {
    build_file_inner(specs, None, false)
}

/// Build a file whose moov carries an extra, raw trak box.
pub fn build_file_with_extra_trak(specs: &[TrackSpec], extra_trak: &[u8]) -> Vec<u8> {
    build_file_inner(specs, Some(extra_trak), false)
}

/// Build a file whose moov carries an mvex box (fragmented marker).
pub fn build_file_with_mvex(specs: &[TrackSpec]) -> Vec<u8> {
    build_file_inner(specs, None, true)
}

fn build_file_inner(specs: &[TrackSpec], extra_trak: Option<&[u8]>, with_mvex: bool) -> Vec<u8> {
    let ftyp = ftyp_box();

    // mdat: each track's samples form one contiguous chunk.
    let mut mdat_payload = Vec::new();
    let mut chunk_offsets = Vec::with_capacity(specs.len());
    for (track_index, spec) in specs.iter().enumerate() {
        chunk_offsets.push(ftyp.len() as u64 + 8 + mdat_payload.len() as u64);
        for sample in 0..spec.sample_count() {
            let fill = sample_fill(track_index, sample);
            mdat_payload.extend(std::iter::repeat(fill).take(spec.sample_size() as usize));
        }
    }
    let mdat = boxed(b"mdat", &mdat_payload);

    let mut moov_children = vec![boxed(b"mvhd", &mvhd_payload())];
    for (track_index, spec) in specs.iter().enumerate() {
        moov_children.push(trak_box(spec, track_index as u32 + 1, chunk_offsets[track_index]));
    }
    if let Some(extra) = extra_trak {
        moov_children.push(extra.to_vec());
    }
    if with_mvex {
        moov_children.push(container(b"mvex", &[]));
    }
    let moov = container(b"moov", &moov_children);

    let mut file = ftyp;
    file.extend_from_slice(&mdat);
    file.extend_from_slice(&moov);
    file
}

fn mvhd_payload() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(100);
    buf.put_u32(0); // version + flags
    buf.put_u32(0); // creation
    buf.put_u32(0); // modification
    buf.put_u32(1000); // timescale
    buf.put_u32(0); // duration
    buf.put_u32(0x0001_0000); // rate
    buf.put_u16(0x0100); // volume
    buf.put_bytes(0, 10); // reserved
    put_identity_matrix(&mut buf);
    buf.put_bytes(0, 24); // pre-defined
    buf.put_u32(2); // next track id
    buf.to_vec()
}

fn trak_box(spec: &TrackSpec, track_id: u32, chunk_offset: u64) -> Vec<u8> {
    match spec {
        TrackSpec::Video(v) => video_trak(v, track_id, chunk_offset),
        TrackSpec::Audio(a) => audio_trak(a, track_id, chunk_offset),
    }
}

fn video_trak(spec: &VideoTrackSpec, track_id: u32, chunk_offset: u64) -> Vec<u8> {
    let tkhd = boxed(b"tkhd", &tkhd_payload(track_id, 640 << 16, 480 << 16, 0));

    let mut stbl_children = vec![
        boxed(b"stsd", &stsd_payload(b"avc1")),
        boxed(
            b"stts",
            &stts_payload(spec.sample_count, spec.sample_duration),
        ),
        boxed(b"stsz", &stsz_payload(spec.sample_size, spec.sample_count)),
        boxed(b"stsc", &stsc_payload(spec.sample_count)),
        boxed(b"stco", &stco_payload(chunk_offset)),
    ];
    if !spec.keyframes.is_empty() {
        stbl_children.push(boxed(b"stss", &stss_payload(&spec.keyframes)));
    }
    if !spec.cts_offsets.is_empty() {
        stbl_children.push(boxed(b"ctts", &ctts_payload(&spec.cts_offsets)));
    }

    let minf = container(
        b"minf",
        &[
            boxed(b"vmhd", &[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]),
            dinf_box(),
            container(b"stbl", &stbl_children),
        ],
    );
    let mdia = container(
        b"mdia",
        &[
            boxed(b"mdhd", &mdhd_payload(spec.timescale)),
            boxed(b"hdlr", &hdlr_payload(b"vide", b"VideoHandler")),
            minf,
        ],
    );

    let mut trak_children = vec![tkhd];
    if !spec.edit_list.is_empty() {
        let elst = boxed(b"elst", &elst_payload(&spec.edit_list));
        trak_children.push(container(b"edts", &[elst]));
    }
    trak_children.push(mdia);
    container(b"trak", &trak_children)
}

fn audio_trak(spec: &AudioTrackSpec, track_id: u32, chunk_offset: u64) -> Vec<u8> {
    let tkhd = boxed(b"tkhd", &tkhd_payload(track_id, 0, 0, 0x0100));
    let stbl = container(
        b"stbl",
        &[
            boxed(b"stsd", &stsd_payload(b"mp4a")),
            boxed(
                b"stts",
                &stts_payload(spec.sample_count, spec.sample_duration),
            ),
            boxed(b"stsz", &stsz_payload(spec.sample_size, spec.sample_count)),
            boxed(b"stsc", &stsc_payload(spec.sample_count)),
            boxed(b"stco", &stco_payload(chunk_offset)),
        ],
    );
    let minf = container(
        b"minf",
        &[
            boxed(b"smhd", &[0, 0, 0, 0, 0, 0, 0, 0]),
            dinf_box(),
            stbl,
        ],
    );
    let mdia = container(
        b"mdia",
        &[
            boxed(b"mdhd", &mdhd_payload(spec.timescale)),
            boxed(b"hdlr", &hdlr_payload(b"soun", b"SoundHandler")),
            minf,
        ],
    );
    container(b"trak", &[tkhd, mdia])
}

fn dinf_box() -> Vec<u8> {
    let dref = boxed(
        b"dref",
        &[
            0, 0, 0, 0, // version + flags
            0, 0, 0, 1, // entry count
            0, 0, 0, 12, b'u', b'r', b'l', b' ', 0, 0, 0, 1,
        ],
    );
    container(b"dinf", &[dref])
}

fn mdhd_payload(timescale: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u32(0); // version + flags
    buf.put_u32(0); // creation
    buf.put_u32(0); // modification
    buf.put_u32(timescale);
    buf.put_u32(0); // duration
    buf.put_u16(0x55c4); // language
    buf.put_u16(0);
    buf.to_vec()
}

fn hdlr_payload(handler: &[u8; 4], name: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0); // version + flags
    buf.put_u32(0); // pre-defined
    buf.put_slice(handler);
    buf.put_bytes(0, 12); // reserved
    buf.put_slice(name);
    buf.put_u8(0);
    buf.to_vec()
}

fn stsd_payload(codec: &[u8; 4]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0); // version + flags
    buf.put_u32(1); // entry count
    buf.put_u32(16); // entry size
    buf.put_slice(codec);
    buf.put_bytes(0, 8);
    buf.to_vec()
}

fn stts_payload(count: u32, duration: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0);
    buf.put_u32(1); // entry count
    buf.put_u32(count);
    buf.put_u32(duration);
    buf.to_vec()
}

fn stsz_payload(size: u32, count: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0);
    buf.put_u32(0); // per-sample sizes
    buf.put_u32(count);
    for _ in 0..count {
        buf.put_u32(size);
    }
    buf.to_vec()
}

fn stsc_payload(samples_per_chunk: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0);
    buf.put_u32(1); // entry count
    buf.put_u32(1); // first chunk
    buf.put_u32(samples_per_chunk);
    buf.put_u32(1); // sample description id
    buf.to_vec()
}

fn stco_payload(offset: u64) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0);
    buf.put_u32(1); // entry count
    buf.put_u32(offset as u32);
    buf.to_vec()
}

fn stss_payload(keyframes: &[u32]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0);
    buf.put_u32(keyframes.len() as u32);
    for &kf in keyframes {
        buf.put_u32(kf);
    }
    buf.to_vec()
}

fn elst_payload(entries: &[(u32, i32)]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(0); // version 0
    buf.put_u32(entries.len() as u32);
    for &(segment_duration, media_time) in entries {
        buf.put_u32(segment_duration);
        buf.put_i32(media_time);
        buf.put_i16(1);
        buf.put_i16(0);
    }
    buf.to_vec()
}

fn ctts_payload(offsets: &[i32]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(1); // version 1: signed offsets
    buf.put_bytes(0, 3);
    buf.put_u32(offsets.len() as u32);
    for &offset in offsets {
        buf.put_u32(1);
        buf.put_i32(offset);
    }
    buf.to_vec()
}
