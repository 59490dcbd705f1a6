// src/main.rs
//! Caravel Package Manager - CLI Entry Point

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "caravel")]
#[command(author = "Caravel Project")]
#[command(version)]
#[command(about = "A source-based C/C++ package manager driving CMake ports", long_about = None)]
struct Cli {
    /// Root directory (defaults to $CARAVEL_ROOT, then the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and install packages
    Install {
        /// Packages to install, e.g. zlib or curl[ssl]:x64-windows
        #[arg(required = true)]
        packages: Vec<String>,

        /// Triplet for packages that do not name one
        #[arg(short, long)]
        triplet: Option<String>,

        /// Print the plan without executing it
        #[arg(long)]
        dry_run: bool,

        /// Build the latest upstream sources instead of the pinned version
        #[arg(long)]
        head: bool,

        /// Forbid portfiles from downloading anything
        #[arg(long)]
        no_downloads: bool,

        /// Allow removing and rebuilding installed packages
        #[arg(long)]
        recurse: bool,

        /// Continue past failures and print a summary at the end
        #[arg(long)]
        keep_going: bool,
    },

    /// Build a single package whose dependencies are already installed
    Build {
        /// Package to build, e.g. zlib:x64-windows
        package: String,

        /// Triplet to use when the spec does not name one
        #[arg(short, long)]
        triplet: Option<String>,

        /// Only run the post-build checks against an existing staging tree
        #[arg(long)]
        checks_only: bool,
    },

    /// Remove installed packages
    Remove {
        /// Packages to remove
        #[arg(required = true)]
        packages: Vec<String>,

        /// Triplet for packages that do not name one
        #[arg(short, long)]
        triplet: Option<String>,

        /// Remove even when installed packages depend on the target
        #[arg(long)]
        recurse: bool,

        /// Print what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// List installed packages
    List {},

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let root = cli.root.clone();

    let result = match cli.command {
        Some(Commands::Install {
            packages,
            triplet,
            dry_run,
            head,
            no_downloads,
            recurse,
            keep_going,
        }) => commands::cmd_install(
            root,
            packages,
            triplet,
            dry_run,
            head,
            no_downloads,
            recurse,
            keep_going,
        ),

        Some(Commands::Build { package, triplet, checks_only }) => {
            commands::cmd_build(root, package, triplet, checks_only)
        }

        Some(Commands::Remove { packages, triplet, recurse, dry_run }) => {
            commands::cmd_remove(root, packages, triplet, recurse, dry_run)
        }

        Some(Commands::List {}) => commands::cmd_list(root),

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "caravel", &mut io::stdout());
            Ok(())
        }

        None => {
            println!("Caravel Package Manager v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'caravel --help' for usage information");
            Ok(())
        }
    };

    if let Ok(metrics) = caravel::metrics::global().lock() {
        metrics.flush();
    }

    result
}
