use std::sync::Arc;

use anyhow::{ensure, Context, Result};

use tilepress::{
    AttributeCopyProfile, CancelToken, GeoJsonSource, Pipeline, PipelineConfig, ZoomRange,
};

use crate::cli::{Cli, RunArgs};

pub fn run(_cli: &Cli, args: &RunArgs) -> Result<()> {
    ensure!(
        args.source.exists(),
        "source file does not exist: {}",
        args.source.display()
    );

    let zoom = ZoomRange::new(args.min_zoom, args.max_zoom)
        .context("invalid zoom range")?;
    let profile = AttributeCopyProfile::new(
        args.layer.as_str(),
        args.attrs.clone(),
        zoom,
        args.buffer,
    );

    let config = PipelineConfig {
        default_buffer_px: args.buffer,
        max_tile_bytes: args.max_tile_kib * 1024,
        strict: args.strict,
        ..PipelineConfig::default()
    };

    let mut source = GeoJsonSource::open(&args.source)
        .with_context(|| format!("failed to read {}", args.source.display()))?;

    let pipeline = Pipeline::new(config, Arc::new(profile));
    let cancel = CancelToken::new();
    let summary = pipeline.run(&mut source, &args.output, &cancel)?;

    println!("{summary}");
    println!("wrote {}", args.output.display());
    Ok(())
}
