// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the PCB Defect Node

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-yolo-supabase-2025-11-02";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-11-02";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "yolo-onnx-detection",
    "annotated-composite",
    "defect-crops",
    "supabase-storage",
    "postgrest-records",
    "multipart-upload",
    "full-detail-response",
];

/// Get formatted version string
pub fn get_version_string() -> String {
    format!("PCB Defect Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}
