// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared Supabase client handle
//!
//! Built once at startup from [`NodeConfig`] and shared read-only by the
//! object store and record store for the process lifetime.

use std::time::Duration;

use crate::config::{BackendKind, NodeConfig};

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        bucket: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// Build the client for a Supabase-backed config, `None` for the memory backend
    pub fn from_config(config: &NodeConfig) -> Result<Option<Self>, reqwest::Error> {
        match &config.backend {
            BackendKind::Supabase { url, api_key } => Self::new(
                url,
                api_key,
                &config.bucket_name,
                Duration::from_secs(config.backend_timeout_secs),
            )
            .map(Some),
            BackendKind::Memory => Ok(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Storage API endpoint for writing `path` into the bucket
    pub fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    /// Unauthenticated read URL for `path` (bucket must be public)
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    /// PostgREST endpoint for `table`
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Start a request carrying the service credential
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
    }
}
