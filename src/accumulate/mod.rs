//! Per-tile accumulation of clipped fragments.
//!
//! Workers push fragments into sharded buckets keyed by tile coordinate
//! (`DashMap`), so workers touching disjoint tiles never contend. The
//! merge is deterministic regardless of arrival order: at drain time the
//! fragments of each tile are sorted by (layer declaration order, input
//! sequence) before encoding.
//!
//! The size budget applies to the encoded, compressed payload. While a
//! tile is over budget the drop policy removes one fragment at a time:
//! explicitly low-priority fragments first, then by ascending tile-space
//! area; equal areas break ties by descending input sequence, so later
//! input drops first. The last fragment of a tile is never dropped — a
//! tile that is still over budget with one fragment left is reported as
//! `TileTooLarge`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use rayon::prelude::*;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::cover::FragmentGeometry;
use crate::encode::{encode_tile, TileLayerPlan};
use crate::error::{PipelineError, Result};
use crate::types::{AttrValue, LayerDecl, TileCoord};

/// One feature's clipped geometry destined for one tile.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Stable input-order index of the originating feature.
    pub seq: u64,
    pub layer: Arc<str>,
    pub geometry: FragmentGeometry,
    pub attrs: BTreeMap<String, AttrValue>,
    pub area_px: f64,
    pub low_priority: bool,
}

/// Encoded output of the accumulator for one tile.
#[derive(Debug)]
pub struct AccumulatedTile {
    pub coord: TileCoord,
    pub payload: Bytes,
}

/// Drop-policy and budget tallies from a drain.
#[derive(Debug, Default)]
pub struct AccumStats {
    pub features_dropped: u64,
    pub oversize_tiles: u64,
}

pub struct TileAccumulator {
    buckets: DashMap<TileCoord, Vec<Fragment>>,
    layer_rank: HashMap<Arc<str>, usize>,
    tile_extent: u32,
    max_tile_bytes: usize,
    strict: bool,
}

impl TileAccumulator {
    pub fn new(config: &PipelineConfig, layers: &[LayerDecl]) -> Self {
        let layer_rank = layers
            .iter()
            .enumerate()
            .map(|(rank, decl)| (decl.name.clone(), rank))
            .collect();
        Self {
            buckets: DashMap::new(),
            layer_rank,
            tile_extent: config.tile_extent,
            max_tile_bytes: config.max_tile_bytes,
            strict: config.strict,
        }
    }

    /// Add one fragment to its tile bucket. Callable from many workers.
    pub fn push(&self, coord: TileCoord, fragment: Fragment) {
        self.buckets.entry(coord).or_default().push(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Declaration rank of a layer; undeclared layers sort after declared
    /// ones, by name.
    fn rank(&self, layer: &Arc<str>) -> (usize, Arc<str>) {
        match self.layer_rank.get(layer) {
            Some(&rank) => (rank, layer.clone()),
            None => (self.layer_rank.len(), layer.clone()),
        }
    }

    /// Merge, encode, and budget every bucket. Tiles come back sorted by
    /// tile id so downstream writes are deterministic.
    pub fn drain(mut self) -> Result<(Vec<AccumulatedTile>, AccumStats)> {
        let map = std::mem::take(&mut self.buckets);
        let mut buckets: Vec<(TileCoord, Vec<Fragment>)> = map.into_iter().collect();
        buckets.sort_by_key(|(coord, _)| coord.tile_id());

        let results: Vec<Result<(Option<AccumulatedTile>, AccumStats)>> = buckets
            .into_par_iter()
            .map(|(coord, fragments)| self.encode_bucket(coord, fragments))
            .collect();

        let mut tiles = Vec::with_capacity(results.len());
        let mut stats = AccumStats::default();
        for result in results {
            let (tile, tile_stats) = result?;
            stats.features_dropped += tile_stats.features_dropped;
            stats.oversize_tiles += tile_stats.oversize_tiles;
            if let Some(tile) = tile {
                tiles.push(tile);
            }
        }
        Ok((tiles, stats))
    }

    fn encode_bucket(
        &self,
        coord: TileCoord,
        mut fragments: Vec<Fragment>,
    ) -> Result<(Option<AccumulatedTile>, AccumStats)> {
        let mut stats = AccumStats::default();

        fragments.sort_by(|a, b| {
            self.rank(&a.layer)
                .cmp(&self.rank(&b.layer))
                .then(a.seq.cmp(&b.seq))
        });

        loop {
            let payload = self.encode_fragments(&fragments)?;
            if payload.len() <= self.max_tile_bytes {
                return Ok((Some(AccumulatedTile { coord, payload }), stats));
            }
            if fragments.len() <= 1 {
                let err = PipelineError::TileTooLarge {
                    coord,
                    size: payload.len(),
                    budget: self.max_tile_bytes,
                };
                if self.strict {
                    return Err(err);
                }
                warn!(tile = %coord, size = payload.len(), budget = self.max_tile_bytes,
                    "tile over size budget after drop policy, writing best-effort");
                stats.oversize_tiles += 1;
                return Ok((Some(AccumulatedTile { coord, payload }), stats));
            }

            let victim = Self::pick_victim(&fragments);
            fragments.remove(victim);
            stats.features_dropped += 1;
        }
    }

    /// Index of the fragment the drop policy removes next: low-priority
    /// first, then smallest area, then latest input order.
    fn pick_victim(fragments: &[Fragment]) -> usize {
        let mut victim = 0usize;
        for (i, frag) in fragments.iter().enumerate().skip(1) {
            let best = &fragments[victim];
            let candidate_key = (!frag.low_priority, frag.area_px);
            let best_key = (!best.low_priority, best.area_px);
            if candidate_key < best_key
                || (candidate_key == best_key && frag.seq > best.seq)
            {
                victim = i;
            }
        }
        victim
    }

    fn encode_fragments(&self, fragments: &[Fragment]) -> Result<Bytes> {
        // Fragments arrive sorted by layer rank; group adjacent runs.
        let mut plans: Vec<TileLayerPlan<'_>> = Vec::new();
        for fragment in fragments {
            match plans.last_mut() {
                Some(plan) if plan.name == fragment.layer.as_ref() => {
                    plan.fragments.push(fragment);
                }
                _ => plans.push(TileLayerPlan {
                    name: fragment.layer.as_ref(),
                    fragments: vec![fragment],
                }),
            }
        }
        encode_tile(&plans, self.tile_extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZoomRange;

    fn config(max_tile_bytes: usize) -> PipelineConfig {
        PipelineConfig { max_tile_bytes, ..PipelineConfig::default() }
    }

    fn layers() -> Vec<LayerDecl> {
        vec![LayerDecl::new("land", ZoomRange::new(0, 10).unwrap())]
    }

    fn fragment(seq: u64, side: i32) -> Fragment {
        Fragment {
            seq,
            layer: Arc::from("land"),
            geometry: FragmentGeometry::Polygons(vec![vec![vec![
                (0, 0),
                (side, 0),
                (side, side),
                (0, side),
            ]]]),
            attrs: BTreeMap::new(),
            area_px: f64::from(side) * f64::from(side),
            low_priority: false,
        }
    }

    #[test]
    fn fragments_merge_in_input_order_regardless_of_arrival() {
        let acc = TileAccumulator::new(&config(1 << 20), &layers());
        let coord = TileCoord::new(2, 1, 1);
        for seq in [5u64, 1, 3, 2, 4] {
            acc.push(coord, fragment(seq, 64));
        }
        let (tiles, stats) = acc.drain().unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(stats.features_dropped, 0);

        let raw = crate::encode::gunzip(&tiles[0].payload).unwrap();
        let reader = mvt_reader::Reader::new(raw).unwrap();
        let features = reader.get_features(0).unwrap();
        let ids: Vec<Option<u64>> = features.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    }

    #[test]
    fn drain_is_deterministic() {
        let run = || {
            let acc = TileAccumulator::new(&config(1 << 20), &layers());
            for seq in 0..20u64 {
                let coord = TileCoord::new(3, (seq % 4) as u32, (seq % 3) as u32);
                acc.push(coord, fragment(seq, 32 + (seq as i32 % 5)));
            }
            let (tiles, _) = acc.drain().unwrap();
            tiles
                .into_iter()
                .map(|t| (t.coord, t.payload.to_vec()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn drop_policy_removes_smallest_area_first() {
        // Budget small enough to force drops but big enough for one
        // fragment.
        let acc = TileAccumulator::new(&config(120), &layers());
        let coord = TileCoord::new(0, 0, 0);
        acc.push(coord, fragment(0, 2048));
        acc.push(coord, fragment(1, 8));
        acc.push(coord, fragment(2, 16));
        let (tiles, stats) = acc.drain().unwrap();
        assert_eq!(tiles.len(), 1);
        assert!(stats.features_dropped >= 1);

        // Largest fragment survives.
        let raw = crate::encode::gunzip(&tiles[0].payload).unwrap();
        let reader = mvt_reader::Reader::new(raw).unwrap();
        let features = reader.get_features(0).unwrap();
        assert!(features.iter().any(|f| f.id == Some(0)));
    }

    #[test]
    fn low_priority_drops_before_small_area() {
        let mut low = fragment(0, 2048);
        low.low_priority = true;
        let high = fragment(1, 8);
        let victim = TileAccumulator::pick_victim(&[low, high]);
        assert_eq!(victim, 0);
    }

    #[test]
    fn equal_areas_drop_latest_input_first() {
        let victim = TileAccumulator::pick_victim(&[
            fragment(3, 64),
            fragment(9, 64),
            fragment(5, 64),
        ]);
        assert_eq!(victim, 1);
    }

    #[test]
    fn strict_mode_fails_on_oversize_tile() {
        let mut cfg = config(16);
        cfg.strict = true;
        let acc = TileAccumulator::new(&cfg, &layers());
        acc.push(TileCoord::new(0, 0, 0), fragment(0, 2048));
        let err = acc.drain().unwrap_err();
        assert!(matches!(err, PipelineError::TileTooLarge { .. }));
    }

    #[test]
    fn oversize_tile_written_best_effort_when_not_strict() {
        let acc = TileAccumulator::new(&config(16), &layers());
        acc.push(TileCoord::new(0, 0, 0), fragment(0, 2048));
        let (tiles, stats) = acc.drain().unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(stats.oversize_tiles, 1);
    }
}
