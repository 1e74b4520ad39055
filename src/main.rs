use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{debug, error, info, warn};

use nonce_worker::compute::ComputeContext;
use nonce_worker::config::{Cli, Config, Invocation};
use nonce_worker::connection::TcpAcceptor;
use nonce_worker::cpu::CpuExec;
use nonce_worker::gpu::{self, GpuExec};
use nonce_worker::logging;
use nonce_worker::metrics::MetricsCollector;
use nonce_worker::orchestrator::Orchestrator;
use nonce_worker::types::WorkDims;

// Batches run inline on this thread; job switches land on batch boundaries.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli, |key| std::env::var(key).ok())?;
    logging::init(&config.log_level);
    if let Ok(json) = serde_json::to_string(&config) {
        debug!(config = %json, "Resolved configuration");
    }

    let compute: Box<dyn ComputeContext> = match config.invocation() {
        Invocation::ListPlatforms => {
            warn!("No platform ID given; run with --help for usage");
            println!("Platforms:");
            for (i, name) in gpu::platform_names()?.iter().enumerate() {
                println!("ID {i}:\t{name}");
            }
            return Ok(());
        }
        Invocation::ListDevices { platform } => {
            println!("Devices:");
            for (i, name) in gpu::device_names(platform)?.iter().enumerate() {
                println!("ID {i}:\t{name}");
            }
            return Ok(());
        }
        Invocation::ShowMaxDims { platform, device } => {
            let [x, y, z] = gpu::max_work_item_sizes(platform, device)?;
            println!("Max Dimensions: [{x}, {y}, {z}]");
            return Ok(());
        }
        Invocation::Run { platform, device, dims } => open_device(platform, device, dims)?,
        Invocation::RunCpu { dims } => {
            info!(?dims, "Using host backend");
            Box::new(CpuExec::new(dims))
        }
    };

    let metrics = Arc::new(MetricsCollector::new());
    let mut orchestrator = Orchestrator::new(compute, metrics)
        .with_stats_interval(config.stats_interval_batches);

    let bind_addr = config.bind_addr()?;
    let mut acceptor = TcpAcceptor::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, batch_size = orchestrator.batch_size(), "Listening");

    if let Err(e) = orchestrator.serve(&mut acceptor).await {
        error!("Stopping: {e}");
        // Releases every device buffer, the kernel and the queue.
        drop(orchestrator);
        return Err(e.into());
    }
    Ok(())
}

fn open_device(platform: usize, device: usize, dims: WorkDims) -> anyhow::Result<Box<dyn ComputeContext>> {
    let max = gpu::max_work_item_sizes(platform, device)?;
    let (dims, clamped) = dims.clamp_to(max);
    for i in clamped {
        warn!("Work Dim {i} is greater than the maximum for dimension {i}, setting to {}", max[i]);
    }

    match GpuExec::new(platform, device, dims) {
        Ok(g) => Ok(Box::new(g)),
        Err(e) => {
            #[cfg(feature = "cpu-fallback")]
            {
                warn!("OpenCL setup failed ({e}); falling back to the host backend");
                Ok(Box::new(CpuExec::new(dims)))
            }
            #[cfg(not(feature = "cpu-fallback"))]
            { Err(anyhow::Error::new(e).context("failed to setup miner")) }
        }
    }
}
