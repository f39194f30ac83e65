// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod inspect;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// PCB defect node CLI
#[derive(Parser, Debug)]
#[command(name = "pcb-cli")]
#[command(version)]
#[command(about = "One-off PCB defect detection runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect, upload and record one image against the configured backend
    Detect(detect::DetectArgs),

    /// Run detection only and write the outputs to a local directory
    Inspect(inspect::InspectArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Detect(args) => detect::run_detect(args).await,
        Commands::Inspect(args) => inspect::run_inspect(args).await,
    }
}
