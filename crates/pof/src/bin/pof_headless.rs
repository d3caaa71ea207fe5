//! # POF Headless
//!
//! Runs a scene file against the in-memory device and prints what happened.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug pof_headless --scene scene.toml --frames 120
//! ```

use std::process::ExitCode;

use pof::{PofConfig, PofRuntime};
use pof_core::HeadlessDevice;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut scene: Option<String> = None;
    let mut frames: Option<u32> = None;
    let mut max_dimension: Option<u32> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--scene" | "-s" => {
                if i + 1 < args.len() {
                    scene = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--frames" | "-f" => {
                if i + 1 < args.len() {
                    frames = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--max-dimension" | "-m" => {
                if i + 1 < args.len() {
                    max_dimension = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: pof_headless [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --scene <FILE>           Scene TOML (default: empty scene)");
                println!("  -f, --frames <NUM>           Frames to run (default: from scene, else 60)");
                println!("  -m, --max-dimension <PX>     Reject framebuffers larger than this");
                println!("  -h, --help                   Show this help");
                return ExitCode::SUCCESS;
            }
            other => tracing::warn!(arg = other, "ignoring unknown argument"),
        }
        i += 1;
    }

    let config = match &scene {
        Some(path) => match PofConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%err, "can't load scene");
                return ExitCode::FAILURE;
            }
        },
        None => PofConfig::default(),
    };
    let frames = frames.unwrap_or(config.run.frames);
    let mut device = match max_dimension.or(config.run.max_dimension) {
        Some(max) => HeadlessDevice::with_max_dimension(max),
        None => HeadlessDevice::new(),
    };

    let mut runtime = match PofRuntime::new(config) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "can't start runtime");
            return ExitCode::FAILURE;
        }
    };
    runtime.build_scene();

    for _ in 0..frames {
        runtime.run_frame(&mut device);
        for message in runtime.take_host_messages() {
            tracing::info!(node = %message.node, selector = %message.selector, args = %message.joined_args(), "host message");
        }
    }

    let stats = runtime.stats();
    let freed = runtime.shutdown(&mut device);
    let gpu = device.stats();

    println!("┌─ SUMMARY ───────────────────────────────────────────────────────┐");
    println!("│ Frames:             {}", stats.frames);
    println!("│ Framebuffer draws:  {}", stats.framebuffer_draws);
    println!("│ Script draws:       {}", stats.script_draws);
    println!("│ Script errors:      {}", stats.script_errors);
    println!("│ Host messages:      {}", stats.host_messages);
    println!("│ GPU allocations:    {}", gpu.allocations);
    println!("│ GPU failures:       {}", gpu.failures);
    println!("│ GPU destructions:   {} ({} at shutdown)", gpu.destructions, freed);
    println!("│ Live objects:       {}", gpu.live);
    println!("└─────────────────────────────────────────────────────────────────┘");

    if gpu.live == 0 {
        ExitCode::SUCCESS
    } else {
        tracing::error!(live = gpu.live, "GPU objects leaked");
        ExitCode::FAILURE
    }
}
