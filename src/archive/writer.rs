//! Archive writing: collect finalized tile payloads, then seal them into
//! a seekable archive in one atomic step.
//!
//! The writer has two states, Open and Sealed, and the transition is
//! one-way through `finalize`. Nothing touches the output path until
//! finalize succeeds: the file is assembled in a temp file next to the
//! target and renamed into place, so a partial or corrupt archive is
//! never observable.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};

use ahash::AHasher;
use bytes::Bytes;
use serde_json::json;
use tracing::info;

use crate::archive::format::{
    push_entry, serialize_directory, Compression, Entry, Header, TileType, HEADER_BYTES,
};
use crate::error::{PipelineError, Result};
use crate::types::{LayerDecl, TileCoord};

/// Global archive metadata recorded at finalize.
#[derive(Debug, Clone, Default)]
pub struct ArchiveMetadata {
    pub name: String,
    pub layers: Vec<LayerDecl>,
    /// Per-layer attribute schema hints: attribute key -> type name.
    pub fields: BTreeMap<String, BTreeMap<String, String>>,
    /// [min_lon, min_lat, max_lon, max_lat] of the written data.
    pub bounds: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveState {
    Open,
    Sealed,
}

/// Write-side of the tile archive.
pub struct TileArchiveWriter {
    path: PathBuf,
    state: ArchiveState,
    tiles: BTreeMap<u64, (TileCoord, Bytes)>,
}

impl TileArchiveWriter {
    /// Open a writer targeting `path`. The path is not created until
    /// `finalize`.
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: ArchiveState::Open,
            tiles: BTreeMap::new(),
        }
    }

    /// Accept one encoded tile. Tiles may arrive in any order.
    pub fn put(&mut self, coord: TileCoord, payload: Bytes) -> Result<()> {
        if self.state == ArchiveState::Sealed {
            return Err(PipelineError::ArchiveSealed);
        }
        let tile_id = coord.tile_id();
        if self.tiles.contains_key(&tile_id) {
            return Err(PipelineError::DuplicateTile(coord));
        }
        self.tiles.insert(tile_id, (coord, payload));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Seal the archive: build the directory and metadata, write
    /// everything to disk atomically, and refuse any further writes.
    pub fn finalize(&mut self, metadata: &ArchiveMetadata) -> Result<()> {
        if self.state == ArchiveState::Sealed {
            return Err(PipelineError::ArchiveSealed);
        }
        if self.tiles.is_empty() {
            return Err(PipelineError::EmptyArchive);
        }
        self.state = ArchiveState::Sealed;

        let tiles = std::mem::take(&mut self.tiles);

        // Identical payloads share one byte range; BTreeMap iteration
        // gives ascending tile ids, so the data section is clustered.
        let mut data = Vec::new();
        let mut entries: Vec<Entry> = Vec::new();
        let mut ranges_by_hash: BTreeMap<u64, (u64, u32)> = BTreeMap::new();
        let mut num_tile_content = 0u64;
        let num_addressed_tiles = tiles.len() as u64;

        let mut min_zoom = u8::MAX;
        let mut max_zoom = u8::MIN;

        for (tile_id, (coord, payload)) in &tiles {
            min_zoom = min_zoom.min(coord.z);
            max_zoom = max_zoom.max(coord.z);

            let mut hasher = AHasher::default();
            payload.hash(&mut hasher);
            let hash = hasher.finish();

            let (offset, length) = match ranges_by_hash.get(&hash) {
                Some(&range) => range,
                None => {
                    let offset = data.len() as u64;
                    let length = payload.len() as u32;
                    data.extend_from_slice(payload);
                    num_tile_content += 1;
                    ranges_by_hash.insert(hash, (offset, length));
                    (offset, length)
                }
            };
            push_entry(&mut entries, *tile_id, offset, length);
        }

        let directory = serialize_directory(&entries);
        let metadata_json = self.metadata_json(metadata, min_zoom, max_zoom);
        let metadata_bytes = serde_json::to_vec(&metadata_json)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;

        let root_directory_offset = HEADER_BYTES as u64;
        let json_metadata_offset = root_directory_offset + directory.len() as u64;
        let tile_data_offset = json_metadata_offset + metadata_bytes.len() as u64;

        let bounds = metadata.bounds.unwrap_or([-180.0, -85.051_129, 180.0, 85.051_129]);
        let header = Header {
            root_directory_offset,
            root_directory_length: directory.len() as u64,
            json_metadata_offset,
            json_metadata_length: metadata_bytes.len() as u64,
            leaf_directories_offset: tile_data_offset,
            leaf_directories_length: 0,
            tile_data_offset,
            tile_data_length: data.len() as u64,
            num_addressed_tiles,
            num_tile_entries: entries.len() as u64,
            num_tile_content,
            clustered: true,
            internal_compression: Compression::None,
            tile_compression: Compression::Gzip,
            tile_type: TileType::Mvt,
            min_zoom,
            max_zoom,
            min_longitude: bounds[0],
            min_latitude: bounds[1],
            max_longitude: bounds[2],
            max_latitude: bounds[3],
            center_zoom: (min_zoom + max_zoom) / 2,
            center_longitude: (bounds[0] + bounds[2]) / 2.0,
            center_latitude: (bounds[1] + bounds[3]) / 2.0,
        };

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        header.write_to(tmp.as_file_mut())?;
        tmp.write_all(&directory)?;
        tmp.write_all(&metadata_bytes)?;
        tmp.write_all(&data)?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| PipelineError::Io(e.error))?;

        info!(
            path = %self.path.display(),
            tiles = num_addressed_tiles,
            entries = entries.len(),
            bytes = data.len(),
            "archive sealed"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn metadata_json(
        &self,
        metadata: &ArchiveMetadata,
        min_zoom: u8,
        max_zoom: u8,
    ) -> serde_json::Value {
        let vector_layers: Vec<serde_json::Value> = metadata
            .layers
            .iter()
            .map(|decl| {
                let fields = metadata
                    .fields
                    .get(decl.name.as_ref())
                    .cloned()
                    .unwrap_or_default();
                json!({
                    "id": decl.name.as_ref(),
                    "fields": fields,
                    "minzoom": decl.zoom.min(),
                    "maxzoom": decl.zoom.max(),
                })
            })
            .collect();

        json!({
            "name": metadata.name,
            "format": "pbf",
            "type": "overlay",
            "minzoom": min_zoom,
            "maxzoom": max_zoom,
            "vector_layers": vector_layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::*;

    fn payload(byte: u8) -> Bytes {
        Bytes::from(vec![byte; 64])
    }

    #[test]
    fn duplicate_coordinate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TileArchiveWriter::create(dir.path().join("out.pmtiles"));
        let coord = TileCoord::new(3, 1, 2);
        writer.put(coord, payload(1)).unwrap();
        let err = writer.put(coord, payload(2)).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateTile(c) if c == coord));
    }

    #[test]
    fn finalize_of_empty_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TileArchiveWriter::create(dir.path().join("out.pmtiles"));
        let err = writer.finalize(&ArchiveMetadata::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyArchive));
        assert!(!dir.path().join("out.pmtiles").exists());
    }

    #[test]
    fn put_after_finalize_fails_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TileArchiveWriter::create(dir.path().join("out.pmtiles"));
        writer.put(TileCoord::new(0, 0, 0), payload(1)).unwrap();
        writer.finalize(&ArchiveMetadata::default()).unwrap();

        let err = writer.put(TileCoord::new(1, 0, 0), payload(2)).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveSealed));
        let err = writer.finalize(&ArchiveMetadata::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveSealed));
    }

    #[test]
    fn failed_finalize_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pmtiles");
        let mut writer = TileArchiveWriter::create(&target);
        assert!(writer.finalize(&ArchiveMetadata::default()).is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn identical_payloads_share_a_byte_range() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pmtiles");
        let mut writer = TileArchiveWriter::create(&target);
        writer.put(TileCoord::new(1, 0, 0), payload(9)).unwrap();
        writer.put(TileCoord::new(1, 1, 0), payload(9)).unwrap();
        writer.put(TileCoord::new(1, 1, 1), payload(5)).unwrap();
        writer.finalize(&ArchiveMetadata::default()).unwrap();

        let header = Header::read_from(&mut File::open(&target).unwrap()).unwrap();
        assert_eq!(header.num_addressed_tiles, 3);
        assert_eq!(header.num_tile_content, 2);
        assert_eq!(header.tile_data_length, 128);
    }
}
