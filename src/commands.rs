// src/commands.rs
//! Command handlers for the Caravel CLI

use anyhow::{bail, Context, Result};
use caravel::build::{
    read_build_info, BuildPackageConfig, BuildPackageOptions, BuildResult, PreBuildInfo,
};
use caravel::control::load_port;
use caravel::install::{perform_plan, KeepGoing, PrintSummary};
use caravel::plan::{create_install_plan, print_plan, AnyAction, RemovePlanType};
use caravel::remove::{self, Purge};
use caravel::{
    database_load_check, metrics, CaravelPaths, FullPackageSpec, PackageSpec, Triplet,
};
use std::path::PathBuf;
use tracing::info;

/// The triplet used when a spec does not name one.
pub fn default_triplet() -> Triplet {
    if let Ok(name) = std::env::var("CARAVEL_DEFAULT_TRIPLET") {
        return Triplet::from_canonical_name(name);
    }
    let name = if cfg!(windows) {
        "x64-windows"
    } else if cfg!(target_os = "macos") {
        "x64-osx"
    } else {
        "x64-linux"
    };
    Triplet::from_canonical_name(name)
}

/// The root directory this invocation operates on.
pub fn resolve_root(root: Option<PathBuf>) -> Result<CaravelPaths> {
    let root = match root {
        Some(dir) => dir,
        None => match std::env::var_os("CARAVEL_ROOT") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        },
    };
    CaravelPaths::create(&root)
        .with_context(|| format!("invalid root directory: {}", root.display()))
}

fn check_triplet(paths: &CaravelPaths, spec: &PackageSpec) -> Result<()> {
    if !paths.is_valid_triplet(paths.get_filesystem(), spec.triplet()) {
        bail!("unknown triplet '{}' for {}", spec.triplet(), spec);
    }
    Ok(())
}

fn parse_full_specs(
    paths: &CaravelPaths,
    packages: &[String],
    triplet: Option<&str>,
) -> Result<Vec<FullPackageSpec>> {
    let default = triplet
        .map(Triplet::from_canonical_name)
        .unwrap_or_else(default_triplet);
    let mut specs = Vec::new();
    for package in packages {
        let spec = FullPackageSpec::parse(package, &default)?;
        check_triplet(paths, &spec.package_spec)?;
        specs.push(spec);
    }
    Ok(specs)
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_install(
    root: Option<PathBuf>,
    packages: Vec<String>,
    triplet: Option<String>,
    dry_run: bool,
    use_head: bool,
    no_downloads: bool,
    recurse: bool,
    keep_going: bool,
) -> Result<()> {
    let paths = resolve_root(root)?;
    let fs = paths.get_filesystem();
    let specs = parse_full_specs(&paths, &packages, triplet.as_deref())?;

    let mut status_db = database_load_check(fs, &paths.vcpkg_dir)?;
    let plan = create_install_plan(fs, &paths, &specs, &status_db)?;
    anyhow::ensure!(!plan.is_empty(), "install plan cannot be empty");

    let plan_string = plan
        .iter()
        .map(|action| match action {
            AnyAction::Install(i) => i.spec.to_string(),
            AnyAction::Remove(r) => format!("R${}", r.spec),
        })
        .collect::<Vec<_>>()
        .join(",");
    metrics::track_property("installplan", plan_string);
    info!("planned {} action(s)", plan.len());

    print_plan(&plan, recurse)?;
    if dry_run {
        return Ok(());
    }

    let options = BuildPackageOptions {
        use_head_version: use_head,
        allow_downloads: !no_downloads,
    };
    let summary = perform_plan(
        &plan,
        options,
        KeepGoing::from(keep_going),
        PrintSummary::from(keep_going),
        &paths,
        &mut status_db,
    )?;

    if summary.aborted {
        bail!("installation aborted");
    }
    Ok(())
}

pub fn cmd_build(
    root: Option<PathBuf>,
    package: String,
    triplet: Option<String>,
    checks_only: bool,
) -> Result<()> {
    let paths = resolve_root(root)?;
    let fs = paths.get_filesystem();
    let specs = parse_full_specs(&paths, &[package], triplet.as_deref())?;
    let full_spec = &specs[0];
    let spec = &full_spec.package_spec;

    if checks_only {
        let pre_build_info = PreBuildInfo::from_triplet_file(&paths, spec.triplet())?;
        let build_info = read_build_info(fs, &paths.build_info_file_path(spec))?;
        let error_count = caravel::build::lint::perform_all_checks(
            spec,
            &paths,
            &pre_build_info,
            &build_info,
            fs,
        )?;
        anyhow::ensure!(error_count == 0, "{} post-build check problem(s) found", error_count);
        return Ok(());
    }

    let scf = load_port(fs, &paths.port_dir(spec.name()))?;
    anyhow::ensure!(
        scf.core_paragraph.name == spec.name(),
        "the Source field inside the CONTROL does not match the port directory: '{}' != '{}'",
        scf.core_paragraph.name,
        spec.name()
    );

    let status_db = database_load_check(fs, &paths.vcpkg_dir)?;
    let feature_list: Vec<String> = full_spec.features.iter().cloned().collect();
    let config = BuildPackageConfig {
        scf: &scf,
        triplet: spec.triplet().clone(),
        port_dir: paths.port_dir(spec.name()),
        options: BuildPackageOptions { use_head_version: false, allow_downloads: true },
        feature_list: &feature_list,
    };

    let start = std::time::Instant::now();
    let result = caravel::build::build_package(&paths, &config, &status_db)?;
    println!(
        "Elapsed time for package {}: {:.3} s",
        spec,
        start.elapsed().as_secs_f64()
    );

    match result.code {
        BuildResult::Succeeded => Ok(()),
        BuildResult::CascadedDueToMissingDependencies => {
            println!("The build command requires all dependencies to be already installed.");
            println!("The following dependencies are missing:");
            println!();
            for dep in &result.unmet_dependencies {
                println!("    {}", dep);
            }
            println!();
            bail!("missing dependencies for {}", spec);
        }
        code => {
            println!("{}", caravel::build::create_error_message(code, spec));
            println!("{}", caravel::build::create_user_troubleshooting_message(spec));
            bail!("building {} failed", spec);
        }
    }
}

pub fn cmd_remove(
    root: Option<PathBuf>,
    packages: Vec<String>,
    triplet: Option<String>,
    recurse: bool,
    dry_run: bool,
) -> Result<()> {
    let paths = resolve_root(root)?;
    let fs = paths.get_filesystem();

    let default = triplet
        .map(Triplet::from_canonical_name)
        .unwrap_or_else(default_triplet);
    let mut specs = Vec::new();
    for package in &packages {
        let full = FullPackageSpec::parse(package, &default)?;
        anyhow::ensure!(
            full.features.is_empty(),
            "remove does not accept feature lists: {}",
            package
        );
        check_triplet(&paths, &full.package_spec)?;
        specs.push(full.package_spec);
    }

    let mut status_db = database_load_check(fs, &paths.vcpkg_dir)?;
    let plan = remove::create_remove_plan(&specs, &status_db);

    for action in &plan {
        if action.plan_type != RemovePlanType::Remove {
            continue;
        }
        let dependents: Vec<PackageSpec> = remove::find_dependents(&status_db, &action.spec)
            .into_iter()
            .filter(|d| !specs.contains(d))
            .collect();
        if !dependents.is_empty() && !recurse {
            println!("The following packages depend on {}:", action.spec);
            for dependent in dependents {
                println!("    {}", dependent);
            }
            bail!("refusing to remove without --recurse");
        }
    }

    println!("The following packages will be removed:");
    for action in &plan {
        println!("    {}", action.spec);
    }
    if dry_run {
        return Ok(());
    }

    for action in &plan {
        remove::perform_remove_plan_action(&paths, action, Purge::Yes, &mut status_db)?;
    }
    Ok(())
}

pub fn cmd_list(root: Option<PathBuf>) -> Result<()> {
    let paths = resolve_root(root)?;
    let status_db = database_load_check(paths.get_filesystem(), &paths.vcpkg_dir)?;

    let mut lines: Vec<String> = status_db
        .iter_installed()
        .map(|spgh| {
            let description = spgh.package.description.lines().next().unwrap_or("");
            format!(
                "{:<48} {:<16} {}",
                spgh.package.displayname(),
                spgh.package.version,
                description
            )
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("No packages are installed.");
        return Ok(());
    }
    for line in lines {
        println!("{}", line.trim_end());
    }
    Ok(())
}
