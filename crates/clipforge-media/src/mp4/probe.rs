//! Box-tree probe: structural traversal without payload reads.

use super::{Atom, AtomType};
use crate::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom};

fn eof_at(offset: u64) -> impl FnOnce(io::Error) -> Error {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof(offset)
        } else {
            Error::Io(err)
        }
    }
}

/// Probe the container structure of a file.
///
/// Returns the top-level atoms in file order, with recognized container
/// types expanded recursively. Only headers are read; payloads stay on
/// disk and are referenced by offset.
pub fn probe<R: Read + Seek>(reader: &mut R) -> Result<Vec<Atom>> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    parse_atoms(reader, 0, file_size)
}

/// Recursively parse the atoms in `[start, end)`.
fn parse_atoms<R: Read + Seek>(reader: &mut R, start: u64, end: u64) -> Result<Vec<Atom>> {
    let mut atoms = Vec::new();
    let mut offset = start;

    while offset < end {
        reader.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        reader.read_exact(&mut header).map_err(eof_at(offset))?;

        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let atom_type = AtomType::from_bytes([header[4], header[5], header[6], header[7]]);

        let (size, header_len) = match size32 {
            // Extended 64-bit size follows the standard header.
            1 => {
                let mut ext = [0u8; 8];
                reader.read_exact(&mut ext).map_err(eof_at(offset))?;
                (u64::from_be_bytes(ext), 16u8)
            }
            // Size 0: atom extends to the end of the enclosing range.
            0 => (end - offset, 8u8),
            n => (u64::from(n), 8u8),
        };

        if size < u64::from(header_len) {
            return Err(Error::malformed(
                offset,
                format!("box size {size} smaller than its {header_len}-byte header"),
            ));
        }
        if offset + size > end {
            // Declared size runs past the readable range: truncated box.
            return Err(Error::UnexpectedEof(offset));
        }

        let children = if atom_type.is_container() {
            parse_atoms(reader, offset + u64::from(header_len), offset + size)?
        } else {
            Vec::new()
        };

        atoms.push(Atom {
            atom_type,
            offset,
            size,
            header_len,
            children,
        });

        offset += size;
    }

    Ok(atoms)
}
