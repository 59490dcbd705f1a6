// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: root directory
fn root_arg() -> Arg {
    Arg::new("root")
        .long("root")
        .value_name("DIR")
        .help("Root directory (defaults to $CARAVEL_ROOT, then the current directory)")
}

/// Common argument: default triplet
fn triplet_arg() -> Arg {
    Arg::new("triplet")
        .short('t')
        .long("triplet")
        .help("Triplet for packages that do not name one")
}

fn build_cli() -> Command {
    Command::new("caravel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Caravel Contributors")
        .about("Source-based C/C++ package manager driving CMake ports")
        .subcommand_required(false)
        .arg(root_arg())
        .subcommand(
            Command::new("install")
                .about("Build and install packages")
                .arg(Arg::new("packages").required(true).num_args(1..).help("Packages to install"))
                .arg(triplet_arg())
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the plan without executing it"),
                )
                .arg(
                    Arg::new("head")
                        .long("head")
                        .action(clap::ArgAction::SetTrue)
                        .help("Build the latest upstream sources"),
                )
                .arg(
                    Arg::new("no_downloads")
                        .long("no-downloads")
                        .action(clap::ArgAction::SetTrue)
                        .help("Forbid portfiles from downloading anything"),
                )
                .arg(
                    Arg::new("recurse")
                        .long("recurse")
                        .action(clap::ArgAction::SetTrue)
                        .help("Allow removing and rebuilding installed packages"),
                )
                .arg(
                    Arg::new("keep_going")
                        .long("keep-going")
                        .action(clap::ArgAction::SetTrue)
                        .help("Continue past failures and print a summary"),
                ),
        )
        .subcommand(
            Command::new("build")
                .about("Build a single package whose dependencies are already installed")
                .arg(Arg::new("package").required(true).help("Package to build"))
                .arg(triplet_arg())
                .arg(
                    Arg::new("checks_only")
                        .long("checks-only")
                        .action(clap::ArgAction::SetTrue)
                        .help("Only run the post-build checks"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(Arg::new("packages").required(true).num_args(1..).help("Packages to remove"))
                .arg(triplet_arg())
                .arg(
                    Arg::new("recurse")
                        .long("recurse")
                        .action(clap::ArgAction::SetTrue)
                        .help("Remove even when installed packages depend on the target"),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print what would be removed"),
                ),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("caravel.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
