//! MP4 atom definitions: the shared box model.

use serde::{Serialize, Serializer};

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MOOF: Self = Self(*b"moof");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Whether atoms of this type hold child atoms instead of a payload.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            Self::MOOV
                | Self::TRAK
                | Self::MDIA
                | Self::MINF
                | Self::DINF
                | Self::STBL
                | Self::MVEX
                | Self::EDTS
        )
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for AtomType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A node in the parsed box tree.
///
/// Atoms reference source-file ranges; payloads are read lazily by the
/// demuxer, never stored in the tree.
#[derive(Debug, Clone, Serialize)]
pub struct Atom {
    /// Atom type code.
    #[serde(rename = "type")]
    pub atom_type: AtomType,
    /// File offset of the atom header.
    pub offset: u64,
    /// Total atom size including the header.
    pub size: u64,
    /// Header length in bytes (8, or 16 for extended-size atoms).
    pub header_len: u8,
    /// Child atoms, populated only for container types.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Atom>,
}

impl Atom {
    /// File offset where the payload (or first child) starts.
    pub fn data_offset(&self) -> u64 {
        self.offset + u64::from(self.header_len)
    }

    /// Payload size (total size minus header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(u64::from(self.header_len))
    }

    /// Find the first direct child of the given type.
    pub fn find_child(&self, atom_type: AtomType) -> Option<&Atom> {
        self.children.iter().find(|c| c.atom_type == atom_type)
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] @ {} (size {})", self.atom_type, self.offset, self.size)
    }
}

/// Find the first top-level atom of the given type.
pub fn find_atom(atoms: &[Atom], atom_type: AtomType) -> Option<&Atom> {
    atoms.iter().find(|a| a.atom_type == atom_type)
}
