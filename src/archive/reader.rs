//! Random-access reads from a sealed archive.
//!
//! The header is written only at finalize, so an unsealed run leaves
//! nothing parseable behind; opening implies the archive was sealed.
//! Lookups binary-search the in-memory directory, then seek straight to
//! the tile's byte range.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::archive::format::{deserialize_directory, find_tile, Compression, Entry, Header};
use crate::encode::gunzip;
use crate::error::{PipelineError, Result};
use crate::types::TileCoord;

pub struct ArchiveReader {
    file: File,
    header: Header,
    entries: Vec<Entry>,
    metadata: serde_json::Value,
}

impl ArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let header = Header::read_from(&mut file)?;

        let mut directory = vec![0u8; header.root_directory_length as usize];
        file.seek(SeekFrom::Start(header.root_directory_offset))?;
        file.read_exact(&mut directory)?;
        let directory = match header.internal_compression {
            Compression::None => directory,
            Compression::Gzip => gunzip(&directory)?,
        };
        let entries = deserialize_directory(&directory)?;

        let mut metadata_bytes = vec![0u8; header.json_metadata_length as usize];
        file.seek(SeekFrom::Start(header.json_metadata_offset))?;
        file.read_exact(&mut metadata_bytes)?;
        let metadata_bytes = match header.internal_compression {
            Compression::None => metadata_bytes,
            Compression::Gzip => gunzip(&metadata_bytes)?,
        };
        let metadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| PipelineError::Malformed(format!("metadata is not JSON: {e}")))?;

        Ok(Self { file, header, entries, metadata })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        find_tile(&self.entries, coord.tile_id()).is_some()
    }

    /// Every coordinate addressed by the directory, in tile-id order.
    pub fn coords(&self) -> Vec<TileCoord> {
        self.entries
            .iter()
            .flat_map(|e| {
                (0..u64::from(e.run_length)).filter_map(move |i| TileCoord::from_tile_id(e.tile_id + i))
            })
            .collect()
    }

    /// Raw stored bytes for one tile, or `None` when absent.
    pub fn get(&mut self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        let Some((offset, length)) = find_tile(&self.entries, coord.tile_id()) else {
            return Ok(None);
        };
        if offset + u64::from(length) > self.header.tile_data_length {
            return Err(PipelineError::Malformed(format!(
                "tile {coord} range reaches past the data section"
            )));
        }
        self.file
            .seek(SeekFrom::Start(self.header.tile_data_offset + offset))?;
        let mut buf = vec![0u8; length as usize];
        self.file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    /// Tile payload with the archive's tile compression undone.
    pub fn get_tile(&mut self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        match self.get(coord)? {
            None => Ok(None),
            Some(raw) => match self.header.tile_compression {
                Compression::None => Ok(Some(raw)),
                Compression::Gzip => Ok(Some(gunzip(&raw)?)),
            },
        }
    }
}
