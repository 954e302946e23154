// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scene knowledge base CLI
#[derive(Parser, Debug)]
#[command(name = "scenerag-cli")]
#[command(version)]
#[command(about = "Build, inspect and query scene knowledge bases", long_about = None)]
pub struct Cli {
    /// Root directory holding one subdirectory per scene
    #[arg(long, global = true, env = "RAG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Scene to operate on (e.g. campus, psychology)
    #[arg(long, global = true, env = "RAG_SCENE")]
    pub scene: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which index files exist for the scene
    Status,

    /// Show entry, vector and processed counts
    Stats,

    /// Copy the scene directory into the backup root
    Backup,

    /// Delete every image entry of the scene
    PurgeImages,

    /// Rebuild the scene from a directory of documents
    Build(commands::SourceArgs),

    /// Add new or changed documents from a directory
    Insert(commands::SourceArgs),

    /// Query the scene
    Retrieve(commands::RetrieveArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = commands::load_config(cli.data_dir, cli.scene)?;
    match cli.command {
        Commands::Status => commands::status(&config).await,
        Commands::Stats => commands::stats(&config).await,
        Commands::Backup => commands::backup(&config).await,
        Commands::PurgeImages => commands::purge_images(&config).await,
        Commands::Build(args) => commands::build(&config, args).await,
        Commands::Insert(args) => commands::insert(&config, args).await,
        Commands::Retrieve(args) => commands::retrieve(&config, args).await,
    }
}
