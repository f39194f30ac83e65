// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration sourced from environment variables
//!
//! Loaded once at startup and shared read-only for the process lifetime.

use std::env;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use thiserror::Error;

/// Default storage bucket for annotated images and crops
pub const DEFAULT_BUCKET_NAME: &str = "pcb-images";

/// Default ONNX model artifact
pub const DEFAULT_MODEL_PATH: &str = "pcb_model/best.onnx";

/// Default class labels of the PCB defect model, in model output order
pub const DEFAULT_CLASS_NAMES: &[&str] = &[
    "missing_hole",
    "mouse_bite",
    "open_circuit",
    "short",
    "spur",
    "spurious_copper",
];

/// Maximum multipart body size (10MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Which storage/database backend the node talks to
#[derive(Debug, Clone, PartialEq)]
pub enum BackendKind {
    /// Supabase Storage + PostgREST
    Supabase { url: String, api_key: String },
    /// Process-local in-memory stores (development and tests)
    Memory,
}

/// Detector tuning
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Path to the ONNX model artifact
    pub model_path: PathBuf,
    /// Minimum class confidence kept after decoding
    pub confidence_threshold: f32,
    /// IoU above which overlapping same-class boxes are suppressed
    pub iou_threshold: f32,
    /// Square input side of the model
    pub input_size: u32,
    /// Class labels, indexed by model class id
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Top-level node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub backend: BackendKind,
    /// Storage bucket name
    pub bucket_name: String,
    pub detector: DetectorConfig,
    /// HTTP listen address
    pub listen_addr: SocketAddr,
    /// Directory for temporary upload copies
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Timeout applied to every backend HTTP call
    pub backend_timeout_secs: u64,
}

impl NodeConfig {
    /// Load configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();

        let backend = match env::var("PCB_BACKEND")
            .unwrap_or_else(|_| "supabase".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => BackendKind::Memory,
            "supabase" => {
                let url = env::var("SUPABASE_URL").map_err(|_| ConfigError::Missing("SUPABASE_URL"))?;
                let api_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
                    .or_else(|_| env::var("SUPABASE_KEY"))
                    .map_err(|_| ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?;
                BackendKind::Supabase { url, api_key }
            }
            other => {
                return Err(ConfigError::Invalid {
                    field: "PCB_BACKEND",
                    message: format!("expected 'supabase' or 'memory', got '{}'", other),
                })
            }
        };

        let defaults = DetectorConfig::default();
        let detector = DetectorConfig {
            model_path: env::var("PCB_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            confidence_threshold: parse_var("PCB_CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?,
            iou_threshold: parse_var("PCB_IOU_THRESHOLD", defaults.iou_threshold)?,
            input_size: parse_var("PCB_INPUT_SIZE", defaults.input_size)?,
            class_names: env::var("PCB_CLASS_NAMES")
                .map(|v| parse_class_names(&v))
                .unwrap_or(defaults.class_names),
        };

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = parse_var("API_PORT", 8080)?;
        let listen_addr = resolve_listen_addr(&host, port)?;

        let config = Self {
            backend,
            bucket_name: env::var("SUPABASE_BUCKET_NAME")
                .unwrap_or_else(|_| DEFAULT_BUCKET_NAME.to_string()),
            detector,
            listen_addr,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            backend_timeout_secs: parse_var("BACKEND_TIMEOUT_SECS", 30)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration for local runs against the in-memory backend
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            detector: DetectorConfig::default(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            backend_timeout_secs: 30,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let BackendKind::Supabase { url, api_key } = &self.backend {
            let parsed = url::Url::parse(url).map_err(|e| ConfigError::Invalid {
                field: "SUPABASE_URL",
                message: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::Invalid {
                    field: "SUPABASE_URL",
                    message: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
            if api_key.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "SUPABASE_SERVICE_ROLE_KEY",
                    message: "credential is empty".to_string(),
                });
            }
        }
        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "SUPABASE_BUCKET_NAME",
                message: "bucket name is empty".to_string(),
            });
        }
        self.detector.validate()
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "PCB_CONFIDENCE_THRESHOLD",
                message: format!("must be within [0, 1], got {}", self.confidence_threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::Invalid {
                field: "PCB_IOU_THRESHOLD",
                message: format!("must be within [0, 1], got {}", self.iou_threshold),
            });
        }
        if self.input_size == 0 {
            return Err(ConfigError::Invalid {
                field: "PCB_INPUT_SIZE",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.class_names.is_empty() {
            return Err(ConfigError::Invalid {
                field: "PCB_CLASS_NAMES",
                message: "at least one class name is required".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            field: name,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Bind address from `API_HOST`: an IP literal (v4 or bare v6) or a host name
fn resolve_listen_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let invalid = |message: String| ConfigError::Invalid {
        field: "API_HOST",
        message,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| invalid(format!("{} has no addresses", host)))
}

fn parse_class_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
