// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Defect detection API endpoint module
//!
//! Provides POST /detect for multipart board image uploads.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::detect_handler;
pub use request::{DetectForm, DetectQuery};
pub use response::DetectResponse;
