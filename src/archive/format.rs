//! On-disk layout of the tile archive (PMTiles v3).
//!
//! A fixed 127-byte header is followed by the root directory, a JSON
//! metadata section, and the tile data section. The directory maps
//! Hilbert tile ids to byte ranges inside the data section using
//! run-length entries with varint delta encoding.

use std::io::{Read, Write};

use crate::error::{PipelineError, Result};

pub const MAGIC: &[u8; 7] = b"PMTiles";
pub const SPEC_VERSION: u8 = 3;
pub const HEADER_BYTES: usize = 127;

const LAT_LNG_FACTOR: f64 = 10_000_000.0;

/// Compression applied to a section of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    fn to_u8(self) -> u8 {
        match self {
            Compression::None => 0x01,
            Compression::Gzip => 0x02,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Compression::None),
            0x02 => Ok(Compression::Gzip),
            other => Err(PipelineError::Malformed(format!(
                "unsupported compression tag {other:#04x}"
            ))),
        }
    }
}

/// Payload type of the archive's tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileType {
    Mvt,
}

impl TileType {
    fn to_u8(self) -> u8 {
        0x01
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(TileType::Mvt),
            other => Err(PipelineError::Malformed(format!(
                "unsupported tile type tag {other:#04x}"
            ))),
        }
    }
}

/// Parsed archive header. Offsets are absolute file positions.
#[derive(Debug, Clone)]
pub struct Header {
    pub root_directory_offset: u64,
    pub root_directory_length: u64,
    pub json_metadata_offset: u64,
    pub json_metadata_length: u64,
    pub leaf_directories_offset: u64,
    pub leaf_directories_length: u64,
    pub tile_data_offset: u64,
    pub tile_data_length: u64,
    pub num_addressed_tiles: u64,
    pub num_tile_entries: u64,
    pub num_tile_content: u64,
    pub clustered: bool,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub min_longitude: f64,
    pub min_latitude: f64,
    pub max_longitude: f64,
    pub max_latitude: f64,
    pub center_zoom: u8,
    pub center_longitude: f64,
    pub center_latitude: f64,
}

fn put_i32_e7(buf: &mut Vec<u8>, degrees: f64) {
    let value = (degrees * LAT_LNG_FACTOR) as i32;
    buf.extend_from_slice(&value.to_le_bytes());
}

fn get_i32_e7(buf: &[u8]) -> f64 {
    let value = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    f64::from(value) / LAT_LNG_FACTOR
}

fn get_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes(buf[..8].try_into().expect("8 bytes"))
}

impl Header {
    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(HEADER_BYTES);
        buf.extend_from_slice(MAGIC);
        buf.push(SPEC_VERSION);
        for value in [
            self.root_directory_offset,
            self.root_directory_length,
            self.json_metadata_offset,
            self.json_metadata_length,
            self.leaf_directories_offset,
            self.leaf_directories_length,
            self.tile_data_offset,
            self.tile_data_length,
            self.num_addressed_tiles,
            self.num_tile_entries,
            self.num_tile_content,
        ] {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf.push(u8::from(self.clustered));
        buf.push(self.internal_compression.to_u8());
        buf.push(self.tile_compression.to_u8());
        buf.push(self.tile_type.to_u8());
        buf.push(self.min_zoom);
        buf.push(self.max_zoom);
        put_i32_e7(&mut buf, self.min_longitude);
        put_i32_e7(&mut buf, self.min_latitude);
        put_i32_e7(&mut buf, self.max_longitude);
        put_i32_e7(&mut buf, self.max_latitude);
        buf.push(self.center_zoom);
        put_i32_e7(&mut buf, self.center_longitude);
        put_i32_e7(&mut buf, self.center_latitude);
        debug_assert_eq!(buf.len(), HEADER_BYTES);
        out.write_all(&buf)
    }

    pub fn read_from(input: &mut impl Read) -> Result<Self> {
        let mut buf = [0u8; HEADER_BYTES];
        input.read_exact(&mut buf)?;
        if &buf[..7] != MAGIC {
            return Err(PipelineError::Malformed("bad magic, not a tile archive".into()));
        }
        if buf[7] != SPEC_VERSION {
            return Err(PipelineError::Malformed(format!(
                "unsupported spec version {}",
                buf[7]
            )));
        }
        Ok(Self {
            root_directory_offset: get_u64(&buf[8..]),
            root_directory_length: get_u64(&buf[16..]),
            json_metadata_offset: get_u64(&buf[24..]),
            json_metadata_length: get_u64(&buf[32..]),
            leaf_directories_offset: get_u64(&buf[40..]),
            leaf_directories_length: get_u64(&buf[48..]),
            tile_data_offset: get_u64(&buf[56..]),
            tile_data_length: get_u64(&buf[64..]),
            num_addressed_tiles: get_u64(&buf[72..]),
            num_tile_entries: get_u64(&buf[80..]),
            num_tile_content: get_u64(&buf[88..]),
            clustered: buf[96] != 0,
            internal_compression: Compression::from_u8(buf[97])?,
            tile_compression: Compression::from_u8(buf[98])?,
            tile_type: TileType::from_u8(buf[99])?,
            min_zoom: buf[100],
            max_zoom: buf[101],
            min_longitude: get_i32_e7(&buf[102..]),
            min_latitude: get_i32_e7(&buf[106..]),
            max_longitude: get_i32_e7(&buf[110..]),
            max_latitude: get_i32_e7(&buf[114..]),
            center_zoom: buf[118],
            center_longitude: get_i32_e7(&buf[119..]),
            center_latitude: get_i32_e7(&buf[123..]),
        })
    }
}

/// One directory entry: a run of `run_length` consecutive tile ids that
/// all resolve to the same byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

/// Append an entry, extending the previous run when the id is consecutive
/// and the range identical.
pub fn push_entry(entries: &mut Vec<Entry>, tile_id: u64, offset: u64, length: u32) {
    if let Some(last) = entries.last_mut() {
        if tile_id == last.tile_id + u64::from(last.run_length)
            && last.offset == offset
            && last.length == length
        {
            last.run_length += 1;
            return;
        }
    }
    entries.push(Entry { tile_id, offset, length, run_length: 1 });
}

pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| PipelineError::Malformed("truncated varint".into()))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(PipelineError::Malformed("varint overflow".into()));
        }
    }
}

/// Serialize a directory: entry count, tile id deltas, run lengths,
/// lengths, then offsets (zero means "contiguous with previous entry").
pub fn serialize_directory(entries: &[Entry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 6 + 8);
    write_varint(&mut buf, entries.len() as u64);

    let mut last_id = 0u64;
    for entry in entries {
        write_varint(&mut buf, entry.tile_id - last_id);
        last_id = entry.tile_id;
    }
    for entry in entries {
        write_varint(&mut buf, u64::from(entry.run_length));
    }
    for entry in entries {
        write_varint(&mut buf, u64::from(entry.length));
    }
    let mut prev: Option<&Entry> = None;
    for entry in entries {
        match prev {
            Some(p) if entry.offset == p.offset + u64::from(p.length) => {
                write_varint(&mut buf, 0);
            }
            _ => write_varint(&mut buf, entry.offset + 1),
        }
        prev = Some(entry);
    }
    buf
}

pub fn deserialize_directory(buf: &[u8]) -> Result<Vec<Entry>> {
    let mut pos = 0usize;
    let count = read_varint(buf, &mut pos)? as usize;

    let mut entries = Vec::with_capacity(count);
    let mut tile_id = 0u64;
    for _ in 0..count {
        tile_id += read_varint(buf, &mut pos)?;
        entries.push(Entry { tile_id, offset: 0, length: 0, run_length: 0 });
    }
    for entry in entries.iter_mut() {
        entry.run_length = read_varint(buf, &mut pos)? as u32;
    }
    for entry in entries.iter_mut() {
        entry.length = read_varint(buf, &mut pos)? as u32;
    }
    for i in 0..count {
        let raw = read_varint(buf, &mut pos)?;
        entries[i].offset = if raw == 0 {
            if i == 0 {
                return Err(PipelineError::Malformed(
                    "first directory entry has no offset".into(),
                ));
            }
            entries[i - 1].offset + u64::from(entries[i - 1].length)
        } else {
            raw - 1
        };
    }
    Ok(entries)
}

/// Resolve a tile id to its byte range. Entries must be sorted by id.
pub fn find_tile(entries: &[Entry], tile_id: u64) -> Option<(u64, u32)> {
    let idx = match entries.binary_search_by(|e| e.tile_id.cmp(&tile_id)) {
        Ok(idx) => idx,
        Err(0) => return None,
        Err(idx) => idx - 1,
    };
    let entry = &entries[idx];
    if tile_id < entry.tile_id + u64::from(entry.run_length) {
        Some((entry.offset, entry.length))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            root_directory_offset: 127,
            root_directory_length: 42,
            json_metadata_offset: 169,
            json_metadata_length: 100,
            leaf_directories_offset: 269,
            leaf_directories_length: 0,
            tile_data_offset: 269,
            tile_data_length: 4096,
            num_addressed_tiles: 10,
            num_tile_entries: 8,
            num_tile_content: 7,
            clustered: true,
            internal_compression: Compression::None,
            tile_compression: Compression::Gzip,
            tile_type: TileType::Mvt,
            min_zoom: 0,
            max_zoom: 14,
            min_longitude: 4.0,
            min_latitude: 57.9,
            max_longitude: 31.1,
            max_latitude: 71.2,
            center_zoom: 7,
            center_longitude: 17.55,
            center_latitude: 64.55,
        }
    }

    #[test]
    fn header_round_trips() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_BYTES);

        let back = Header::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back.tile_data_offset, 269);
        assert_eq!(back.num_addressed_tiles, 10);
        assert!(back.clustered);
        assert_eq!(back.tile_compression, Compression::Gzip);
        assert!((back.min_longitude - 4.0).abs() < 1e-6);
        assert!((back.max_latitude - 71.2).abs() < 1e-6);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = vec![0u8; HEADER_BYTES];
        buf[..7].copy_from_slice(b"NOTiles");
        assert!(Header::read_from(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn varint_round_trips() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut pos = 0;
            assert_eq!(read_varint(&buf, &mut pos).unwrap(), value);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn push_entry_merges_consecutive_runs() {
        let mut entries = Vec::new();
        push_entry(&mut entries, 10, 0, 100);
        push_entry(&mut entries, 11, 0, 100);
        push_entry(&mut entries, 12, 0, 100);
        push_entry(&mut entries, 20, 100, 50);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].run_length, 3);
        assert_eq!(entries[1].tile_id, 20);
    }

    #[test]
    fn directory_round_trips() {
        let mut entries = Vec::new();
        push_entry(&mut entries, 0, 0, 120);
        push_entry(&mut entries, 1, 120, 400);
        push_entry(&mut entries, 2, 120, 400); // shared content, same range
        push_entry(&mut entries, 77, 520, 33);
        let buf = serialize_directory(&entries);
        let back = deserialize_directory(&buf).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn find_tile_respects_run_length() {
        let entries = vec![
            Entry { tile_id: 5, offset: 0, length: 10, run_length: 3 },
            Entry { tile_id: 20, offset: 10, length: 7, run_length: 1 },
        ];
        assert_eq!(find_tile(&entries, 5), Some((0, 10)));
        assert_eq!(find_tile(&entries, 7), Some((0, 10)));
        assert_eq!(find_tile(&entries, 8), None);
        assert_eq!(find_tile(&entries, 20), Some((10, 7)));
        assert_eq!(find_tile(&entries, 4), None);
        assert_eq!(find_tile(&entries, 21), None);
    }
}
