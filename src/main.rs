// Copyright 2026 Fontgrab Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod browser;
mod cli;
mod pipeline;

#[derive(Parser)]
#[command(
    name = "fontgrab",
    about = "Fontgrab — scrape Fontshare font families into one flat folder",
    version,
    after_help = "Run 'fontgrab <command> --help' for details on each command."
)]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, download and normalize font families
    Grab {
        /// Stop after this many families (omit for all)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_fonts: Option<u64>,
        /// Output directory for archives and merged files
        #[arg(long, default_value = "fonts")]
        out: PathBuf,
        /// Leave downloaded archives as-is (skip extraction and merge)
        #[arg(long)]
        skip_normalize: bool,
    },
    /// Extract, flatten and merge archives already in the output directory
    Normalize {
        /// Output directory containing *.zip archives
        #[arg(long, default_value = "fonts")]
        out: PathBuf,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.quiet {
        std::env::set_var("FONTGRAB_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("FONTGRAB_VERBOSE", "1");
    }

    let default_level = if cli.verbose {
        "fontgrab=debug"
    } else if cli.quiet {
        "fontgrab=warn"
    } else {
        "fontgrab=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().unwrap()),
        )
        .init();

    let result = match cli.command {
        Commands::Grab {
            max_fonts,
            out,
            skip_normalize,
        } => cli::grab_cmd::run(max_fonts.map(|n| n as usize), &out, skip_normalize).await,
        Commands::Normalize { out } => cli::normalize_cmd::run(&out).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "fontgrab", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
