// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Relational records for processed boards
//!
//! One `pcb_main_images` row per processed upload, and one
//! `pcb_defect_crops` row per detected defect referencing it. Rows are
//! insert-only.

pub mod memory;
pub mod postgrest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::vision::BoundingBox;

pub use memory::MemoryRecordStore;
pub use postgrest::PostgrestRecordStore;

pub const MAIN_IMAGES_TABLE: &str = "pcb_main_images";
pub const DEFECT_CROPS_TABLE: &str = "pcb_defect_crops";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Authentication error: {0}")]
    Unauthorized(String),
    #[error("Insert into {0} returned no id")]
    MissingId(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Identifier generated by the database on insert
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

/// Fields of a new `pcb_main_images` row; absent options are written as null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMainImage {
    pub storage_path: String,
    pub public_url: String,
    pub width: u32,
    pub height: u32,
    pub original_filename: Option<String>,
    pub board_code: Option<String>,
    pub note: Option<String>,
}

/// Bounding box as four nullable columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BboxColumns {
    pub bbox_x: Option<u32>,
    pub bbox_y: Option<u32>,
    pub bbox_width: Option<u32>,
    pub bbox_height: Option<u32>,
}

impl From<Option<BoundingBox>> for BboxColumns {
    fn from(bbox: Option<BoundingBox>) -> Self {
        match bbox {
            Some(b) => Self {
                bbox_x: Some(b.x),
                bbox_y: Some(b.y),
                bbox_width: Some(b.width),
                bbox_height: Some(b.height),
            },
            None => Self::default(),
        }
    }
}

/// Fields of a new `pcb_defect_crops` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDefectCrop {
    pub main_image_id: RecordId,
    pub crop_storage_path: String,
    pub crop_public_url: String,
    pub crop_width: u32,
    pub crop_height: u32,
    pub prediction: String,
    pub confidence: f32,
    #[serde(flatten)]
    pub bbox: BboxColumns,
}

/// Insert-only record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one main image row and return its id
    async fn insert_main(&self, row: &NewMainImage) -> Result<RecordId, PersistenceError>;

    /// Insert one crop row referencing an existing main image
    async fn insert_crop(&self, row: &NewDefectCrop) -> Result<RecordId, PersistenceError>;
}
