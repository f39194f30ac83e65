// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{DetectorConfig, DEFAULT_MODEL_PATH};
use crate::vision::{DefectDetector, DetectionResult, OnnxDefectDetector};

/// Arguments for inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Board image to process
    #[arg(long)]
    pub image: PathBuf,

    /// ONNX model artifact
    #[arg(long, env = "PCB_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Minimum detection confidence
    #[arg(long, default_value_t = 0.25)]
    pub confidence: f32,

    /// Output directory (created if missing)
    #[arg(long)]
    pub out: PathBuf,
}

pub async fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = DetectorConfig {
        model_path: args.model.clone(),
        confidence_threshold: args.confidence,
        ..DetectorConfig::default()
    };
    config.validate()?;

    let image = args.image.clone();
    let result = tokio::task::spawn_blocking(move || {
        let detector = OnnxDefectDetector::new(config)?;
        detector.detect(&image, detector.model_path())
    })
    .await
    .context("detection task failed")??;

    let written = write_inspection(&result, &args.out).await?;
    info!("Wrote {} files to {}", written.len(), args.out.display());
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

/// Write `annotated.png`, `crop_{n}.png` (1-based) and `detections.json`
pub async fn write_inspection(result: &DetectionResult, out: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    let mut written = Vec::with_capacity(result.crops.len() + 2);

    let annotated = out.join("annotated.png");
    tokio::fs::write(&annotated, &result.annotated.bytes).await?;
    written.push(annotated);

    for (i, crop) in result.crops.iter().enumerate() {
        let path = out.join(format!("crop_{}.png", i + 1));
        tokio::fs::write(&path, &crop.bytes).await?;
        written.push(path);
    }

    let summary = out.join("detections.json");
    tokio::fs::write(&summary, serde_json::to_vec_pretty(result)?).await?;
    written.push(summary);

    Ok(written)
}
