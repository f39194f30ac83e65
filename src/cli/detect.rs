// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::NodeConfig;
use crate::pipeline::{DetectionPipeline, ProcessRequest};
use crate::vision::OnnxDefectDetector;

/// Arguments for detect command
#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Board image to process
    #[arg(long)]
    pub image: PathBuf,

    /// ONNX model artifact (defaults to PCB_MODEL_PATH)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Board identifier stored with the main image
    #[arg(long)]
    pub board_code: Option<String>,

    /// Free-text note stored with the main image
    #[arg(long)]
    pub note: Option<String>,
}

/// Run the full pipeline and print the persisted records as JSON
pub async fn run_detect(args: DetectArgs) -> Result<()> {
    let mut config = NodeConfig::from_env()?;
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }

    let detector = OnnxDefectDetector::new(config.detector.clone())?;
    let pipeline = DetectionPipeline::from_config(&config, Arc::new(detector))?;

    let request = ProcessRequest::new(&args.image, &config.detector.model_path)
        .with_board_code(args.board_code)
        .with_note(args.note);

    let payload = pipeline.process(request).await?;
    info!(
        "Saved main image {} with {} defect crops",
        payload.main_image.id,
        payload.crops.len()
    );

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
