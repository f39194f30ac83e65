// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detect response types

use serde::{Deserialize, Serialize};

use crate::pipeline::ResultPayload;

pub const SUCCESS_MESSAGE: &str = "Image processed and saved to Supabase.";

/// Response to a successful detection upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectResponse {
    /// Always "ok"
    pub status: String,
    pub message: String,
    pub board_code: Option<String>,
    pub note: Option<String>,
    pub original_filename: Option<String>,
    /// Persisted records, only with `?detail=full`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<ResultPayload>,
}

impl DetectResponse {
    pub fn new(
        board_code: Option<String>,
        note: Option<String>,
        original_filename: Option<String>,
    ) -> Self {
        Self {
            status: "ok".to_string(),
            message: SUCCESS_MESSAGE.to_string(),
            board_code,
            note,
            original_filename,
            result: None,
        }
    }

    pub fn with_result(mut self, result: ResultPayload) -> Self {
        self.result = Some(result);
        self
    }
}
