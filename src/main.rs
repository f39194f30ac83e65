// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use pcb_defect_node::{
    api::{start_server, AppState},
    config::{BackendKind, NodeConfig},
    pipeline::DetectionPipeline,
    vision::OnnxDefectDetector,
};
use std::{env, sync::Arc};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting PCB Defect Node...\n");
    println!("📦 {}", pcb_defect_node::version::get_version_string());
    println!("🔖 BUILD VERSION: {}", pcb_defect_node::version::VERSION);
    println!();

    let config = NodeConfig::from_env().context("invalid configuration")?;

    match &config.backend {
        BackendKind::Supabase { url, .. } => {
            info!("Backend: Supabase at {} (bucket {})", url, config.bucket_name)
        }
        BackendKind::Memory => warn!("Backend: in-memory, nothing will be persisted"),
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

    println!("🧠 Loading defect model...");
    let detector = OnnxDefectDetector::new(config.detector.clone())?;
    println!("✅ Model loaded from {}", config.detector.model_path.display());

    let pipeline = DetectionPipeline::from_config(&config, Arc::new(detector))?;
    let addr = config.listen_addr;
    let state = AppState::new(pipeline, config);

    let separator = "=".repeat(60);
    println!("\n{}", separator);
    println!("  Health:  http://{}/health", addr);
    println!("  Detect:  POST http://{}/detect", addr);
    println!("\nTest with curl:");
    println!("  curl -F 'file=@board.png;type=image/png' -F 'board_code=PCB-001' \\");
    println!("    http://{}/detect", addr);
    println!("\nPress Ctrl+C to shutdown...");
    println!("{}\n", separator);

    tokio::select! {
        result = start_server(state) => result?,
        _ = signal::ctrl_c() => println!("\n⏹️  Shutting down..."),
    }

    println!("👋 Goodbye!");
    Ok(())
}
