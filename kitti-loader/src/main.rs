use anyhow::{Context, Result};
use kitti_loader::{Batch, Config, Loader};
use std::{env, path::PathBuf, time::Instant};
use structopt::StructOpt;
use tracing::{debug, info, trace_span, Instrument};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

#[derive(Debug, Clone, StructOpt)]
/// Prefetch KITTI batches and report their shapes
struct Args {
    #[structopt(long, default_value = "kitti-loader.json5")]
    /// configuration file
    pub config_file: PathBuf,
    #[structopt(long, default_value = "10")]
    /// number of batches to load
    pub num_batches: usize,
    #[structopt(long)]
    /// load validation samples at these indices instead of running the queue
    pub specified: Option<Vec<usize>>,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    // parse arguments
    let Args {
        config_file,
        num_batches,
        specified,
    } = Args::from_args();
    let config = Config::open(&config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;
    debug!("configuration\n{}", serde_json::to_string_pretty(&config)?);

    let mut loader = Loader::new(config).await?;
    info!(
        "{} training samples, {} validation samples, image shape {:?}",
        loader.len(),
        loader.valid_len(),
        loader.image_shape()
    );

    if let Some(indices) = specified {
        let batch = loader.load_specified(Some(indices.as_slice()))?;
        report(0, &batch);
        return Ok(());
    }

    let instant = Instant::now();
    let mut count = 0;

    while count < num_batches {
        let batch = match loader.load().instrument(trace_span!("load")).await {
            Some(batch) => batch,
            None => {
                info!("end of stream");
                break;
            }
        };
        report(count, &batch);
        count += 1;
    }

    let elapsed = instant.elapsed();
    if count > 0 {
        info!(
            "loaded {} batches in {:?} ({:.2} batches/s)",
            count,
            elapsed,
            count as f64 / elapsed.as_secs_f64()
        );
    }

    loader.close();
    loader.join().await?;
    Ok(())
}

fn report(step: usize, batch: &Batch) {
    let voxels: Vec<_> = batch.voxels.iter().map(|voxel| voxel.feature.dim()).collect();
    let doubled: Vec<_> = batch
        .doubled_voxels
        .iter()
        .map(|voxel| voxel.feature.dim())
        .collect();
    info!(
        "batch {}: tags {:?}, images {:?}, voxels {:?}, doubled voxels {:?}",
        step,
        batch.tags,
        batch.images.dim(),
        voxels,
        doubled
    );
}
