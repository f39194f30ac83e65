// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod records;
pub mod storage;
pub mod version;
pub mod vision;

// Re-export main types
pub use config::{ConfigError, DetectorConfig, NodeConfig};
pub use pipeline::{DetectionPipeline, PipelineError, ProcessRequest, ResultPayload};
pub use vision::{DefectDetector, DetectionError, DetectionResult};
