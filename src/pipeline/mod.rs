//! Pipeline orchestration.
//!
//! A worker pool runs Classifier → Simplifier → Coverer over batches of
//! input features and emits fragments into the accumulator's sharded
//! buckets. The source read and the archive write stay single-threaded.
//! Cancellation is cooperative: the token is checked between batches, and
//! a cancelled run never reaches `finalize`, so no partial archive is
//! ever observable.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use geo::BoundingRect;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::accumulate::{Fragment, TileAccumulator};
use crate::archive::{ArchiveMetadata, TileArchiveWriter};
use crate::classify::FeatureClassifier;
use crate::config::PipelineConfig;
use crate::cover::cover_feature;
use crate::error::{PipelineError, Result};
use crate::geom::{simplify_geometry, tolerance_for_zoom};
use crate::source::FeatureSource;
use crate::types::Feature;

/// Cooperative cancellation signal, checked between feature batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-category tallies of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub features_read: u64,
    pub invalid_geometry: u64,
    pub classifier_failures: u64,
    pub empty_geometries: u64,
    pub degenerate_clips: u64,
    pub features_dropped: u64,
    pub oversize_tiles: u64,
    pub tiles_written: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} features in, {} tiles out ({} invalid, {} classifier failures, \
             {} collapsed, {} degenerate clips, {} dropped by budget, {} oversize)",
            self.features_read,
            self.tiles_written,
            self.invalid_geometry,
            self.classifier_failures,
            self.empty_geometries,
            self.degenerate_clips,
            self.features_dropped,
            self.oversize_tiles,
        )
    }
}

#[derive(Default)]
struct Stats {
    invalid_geometry: AtomicU64,
    classifier_failures: AtomicU64,
    empty_geometries: AtomicU64,
    degenerate_clips: AtomicU64,
}

impl Stats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Attribute type observed for one (layer, key) pair. Mixed types decay
/// to String so the merged hint is order-independent.
const SEEN_TEXT: u8 = 1;
const SEEN_NUMBER: u8 = 2;
const SEEN_BOOL: u8 = 4;

pub struct Pipeline {
    config: PipelineConfig,
    classifier: Arc<dyn FeatureClassifier>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, classifier: Arc<dyn FeatureClassifier>) -> Self {
        Self { config, classifier }
    }

    /// Run the full pipeline: read every feature from `source`, build the
    /// tile pyramid, and seal the archive at `output`.
    pub fn run(
        &self,
        source: &mut dyn FeatureSource,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<RunSummary> {
        let layers = self.classifier.declared_layers();
        let accumulator = TileAccumulator::new(&self.config, &layers);
        let stats = Stats::default();
        let field_hints: DashMap<(Arc<str>, String), u8> = DashMap::new();

        // Stage 1: pull the whole source, stamping input order. This is
        // one of the two blocking-I/O stages.
        let mut features: Vec<Feature> = Vec::new();
        let mut bounds: Option<[f64; 4]> = None;
        while let Some(mut feature) = source.next_feature()? {
            feature.seq = features.len() as u64;
            if let Some(rect) = feature.geometry.bounding_rect() {
                let b = bounds.get_or_insert([f64::MAX, f64::MAX, f64::MIN, f64::MIN]);
                b[0] = b[0].min(rect.min().x);
                b[1] = b[1].min(rect.min().y);
                b[2] = b[2].max(rect.max().x);
                b[3] = b[3].max(rect.max().y);
            }
            features.push(feature);
        }
        let features_read = features.len() as u64;
        info!(features = features_read, "source read complete");

        // Stage 2: parallel classify/simplify/cover over batches.
        features
            .par_chunks(self.config.batch_size.max(1))
            .try_for_each(|batch| -> Result<()> {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                for feature in batch {
                    self.process_feature(feature, &accumulator, &stats, &field_hints);
                }
                Ok(())
            })?;

        if cancel.is_cancelled() {
            // In-flight buckets are discarded with the accumulator.
            return Err(PipelineError::Cancelled);
        }

        // Stage 3: drain buckets, enforce budgets, write and seal. Single
        // writer; this is the other blocking-I/O stage.
        let (tiles, accum_stats) = accumulator.drain()?;
        let mut writer = TileArchiveWriter::create(output);
        for tile in &tiles {
            writer.put(tile.coord, tile.payload.clone())?;
        }

        let metadata = ArchiveMetadata {
            name: output
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("tilepress")
                .to_string(),
            layers,
            fields: merge_field_hints(field_hints),
            bounds,
        };
        writer.finalize(&metadata)?;

        let summary = RunSummary {
            features_read,
            invalid_geometry: stats.invalid_geometry.load(Ordering::Relaxed),
            classifier_failures: stats.classifier_failures.load(Ordering::Relaxed),
            empty_geometries: stats.empty_geometries.load(Ordering::Relaxed),
            degenerate_clips: stats.degenerate_clips.load(Ordering::Relaxed),
            features_dropped: accum_stats.features_dropped,
            oversize_tiles: accum_stats.oversize_tiles,
            tiles_written: tiles.len() as u64,
        };
        info!(%summary, "run complete");
        Ok(summary)
    }

    fn process_feature(
        &self,
        feature: &Feature,
        accumulator: &TileAccumulator,
        stats: &Stats,
        field_hints: &DashMap<(Arc<str>, String), u8>,
    ) {
        let classified = match self.classifier.classify(feature) {
            Ok(classified) => classified,
            Err(PipelineError::InvalidGeometry { seq, wanted }) => {
                debug!(seq, ?wanted, "skipping feature with unusable geometry");
                Stats::bump(&stats.invalid_geometry, 1);
                return;
            }
            Err(err) => {
                debug!(seq = feature.seq, %err, "classifier failed, skipping feature");
                Stats::bump(&stats.classifier_failures, 1);
                return;
            }
        };

        for out in classified {
            for (key, value) in &out.attrs {
                let bit = match value.type_name() {
                    "Number" => SEEN_NUMBER,
                    "Boolean" => SEEN_BOOL,
                    _ => SEEN_TEXT,
                };
                field_hints
                    .entry((out.layer.clone(), key.clone()))
                    .and_modify(|mask| *mask |= bit)
                    .or_insert(bit);
            }

            for zoom in out.zoom.iter() {
                let tolerance = tolerance_for_zoom(zoom, self.config.tolerance_factor);
                let geometry = match simplify_geometry(&out.geometry, tolerance) {
                    Ok(geometry) => geometry,
                    Err(PipelineError::EmptyGeometry { .. }) => {
                        Stats::bump(&stats.empty_geometries, 1);
                        continue;
                    }
                    Err(err) => {
                        debug!(seq = out.seq, zoom, %err, "simplification failed");
                        Stats::bump(&stats.empty_geometries, 1);
                        continue;
                    }
                };

                let buffer_px = out.buffer_px.unwrap_or(self.config.default_buffer_px);
                let outcome =
                    cover_feature(&geometry, zoom, buffer_px, self.config.tile_extent);
                Stats::bump(&stats.degenerate_clips, outcome.degenerate_clips);
                for tile in outcome.tiles {
                    let area_px = tile.geometry.area_px();
                    accumulator.push(
                        tile.coord,
                        Fragment {
                            seq: out.seq,
                            layer: out.layer.clone(),
                            geometry: tile.geometry,
                            attrs: out.attrs.clone(),
                            area_px,
                            low_priority: out.low_priority,
                        },
                    );
                }
            }
        }
    }
}

/// Collapse observed type bitmasks into per-layer field hint maps.
fn merge_field_hints(
    hints: DashMap<(Arc<str>, String), u8>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut fields: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for ((layer, key), mask) in hints {
        let name = match mask {
            m if m == SEEN_NUMBER => "Number",
            m if m == SEEN_BOOL => "Boolean",
            _ => "String",
        };
        fields
            .entry(layer.as_ref().to_string())
            .or_default()
            .insert(key, name.to_string());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_trips_once_set() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn field_hints_decay_to_string_on_mixed_types() {
        let hints: DashMap<(Arc<str>, String), u8> = DashMap::new();
        hints.insert((Arc::from("land"), "a".to_string()), SEEN_NUMBER);
        hints.insert((Arc::from("land"), "b".to_string()), SEEN_NUMBER | SEEN_TEXT);
        hints.insert((Arc::from("land"), "c".to_string()), SEEN_BOOL);
        let merged = merge_field_hints(hints);
        assert_eq!(merged["land"]["a"], "Number");
        assert_eq!(merged["land"]["b"], "String");
        assert_eq!(merged["land"]["c"], "Boolean");
    }

    #[test]
    fn summary_display_is_compact() {
        let summary = RunSummary { features_read: 10, tiles_written: 4, ..Default::default() };
        let text = summary.to_string();
        assert!(text.contains("10 features in"));
        assert!(text.contains("4 tiles out"));
    }
}
