// src/install/driver.rs

//! The install driver
//!
//! Walks an action plan in order, dispatching each step to the build,
//! install, or remove executor, timing it, and collecting a per-package
//! result. A failure aborts the run unless keep-going was requested, in
//! which case the remaining actions still execute and the summary reports
//! everything at the end.

use crate::build::{
    self, build_package, BuildPackageConfig, BuildPackageOptions, BuildResult,
    BUILD_RESULT_VALUES,
};
use crate::control::BinaryControlFile;
use crate::error::{Error, Result};
use crate::internal_error;
use crate::paths::CaravelPaths;
use crate::plan::{AnyAction, InstallPlanAction, InstallPlanType, RequestType};
use crate::remove::{self, Purge};
use crate::spec::PackageSpec;
use crate::status_db::StatusDatabase;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepGoing {
    Yes,
    No,
}

impl From<bool> for KeepGoing {
    fn from(value: bool) -> Self {
        if value {
            KeepGoing::Yes
        } else {
            KeepGoing::No
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintSummary {
    Yes,
    No,
}

impl From<bool> for PrintSummary {
    fn from(value: bool) -> Self {
        if value {
            PrintSummary::Yes
        } else {
            PrintSummary::No
        }
    }
}

/// What happened to one plan entry.
#[derive(Debug)]
pub struct SpecSummary {
    pub spec: PackageSpec,
    pub result: BuildResult,
    pub elapsed: Duration,
}

/// Results of driving a whole plan.
#[derive(Debug, Default)]
pub struct InstallSummary {
    pub results: Vec<SpecSummary>,
    /// True when a failure stopped the run before the plan was exhausted.
    pub aborted: bool,
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3} s", elapsed.as_secs_f64())
}

impl InstallSummary {
    pub fn failed(&self) -> bool {
        self.aborted
            || self
                .results
                .iter()
                .any(|r| !matches!(r.result, BuildResult::Succeeded | BuildResult::NullValue))
    }

    /// Per-package lines in plan order, then an aggregate count per result.
    pub fn print(&self) {
        for entry in &self.results {
            println!("{}: {}: {}", entry.spec, entry.result, format_elapsed(entry.elapsed));
        }

        println!();
        println!();
        println!("SUMMARY");
        for value in BUILD_RESULT_VALUES {
            let count = self.results.iter().filter(|r| r.result == value).count();
            println!("    {}: {}", value, count);
        }
    }
}

/// Execute one install action and report its terminal result.
pub fn perform_install_plan_action(
    paths: &CaravelPaths,
    action: &InstallPlanAction,
    options: BuildPackageOptions,
    status_db: &mut StatusDatabase,
) -> Result<BuildResult> {
    let display_name = action.spec.to_string();
    let display_name_with_features = action.displayname();
    let is_user_requested = action.request_type == RequestType::UserRequested;

    match action.plan_type {
        InstallPlanType::AlreadyInstalled => {
            if options.use_head_version && is_user_requested {
                println!(
                    "Package {} is already installed -- not building from HEAD",
                    display_name
                );
            } else {
                println!("Package {} is already installed", display_name);
            }
            Ok(BuildResult::Succeeded)
        }

        InstallPlanType::BuildAndInstall => {
            if options.use_head_version {
                println!("Building package {} from HEAD... ", display_name_with_features);
            } else {
                println!("Building package {}... ", display_name_with_features);
            }

            let scf = action
                .source_control_file
                .as_ref()
                .ok_or_else(|| internal_error!("build action without a source control file"))?;
            let config = BuildPackageConfig {
                scf,
                triplet: action.spec.triplet().clone(),
                port_dir: paths.port_dir(action.spec.name()),
                options,
                feature_list: &action.feature_list,
            };
            let result = build_package(paths, &config, status_db)?;
            if result.code != BuildResult::Succeeded {
                println!("{}", build::create_error_message(result.code, &action.spec));
                if result.code == BuildResult::CascadedDueToMissingDependencies {
                    println!("The following dependencies are missing:");
                    println!();
                    for dep in &result.unmet_dependencies {
                        println!("    {}", dep);
                    }
                    println!();
                }
                return Ok(result.code);
            }
            println!("Building package {}... done", display_name_with_features);

            let control_path = paths.package_dir(&action.spec).join("CONTROL");
            let bcf = BinaryControlFile::load(paths.get_filesystem(), &control_path)?;
            install_loaded_package(paths, &display_name, &bcf, status_db)
        }

        InstallPlanType::Install => {
            if options.use_head_version && is_user_requested {
                println!(
                    "Package {} is already built -- not building from HEAD",
                    display_name
                );
            }
            let bcf = action
                .binary_control_file
                .as_ref()
                .ok_or_else(|| internal_error!("install action without a binary control file"))?;
            install_loaded_package(paths, &display_name, bcf, status_db)
        }
    }
}

fn install_loaded_package(
    paths: &CaravelPaths,
    display_name: &str,
    bcf: &BinaryControlFile,
    status_db: &mut StatusDatabase,
) -> Result<BuildResult> {
    println!("Installing package {}... ", display_name);
    match super::install_package(paths, bcf, status_db)? {
        super::InstallResult::Success => {
            println!("Installing package {}... done", display_name);
            Ok(BuildResult::Succeeded)
        }
        super::InstallResult::FileConflicts => Ok(BuildResult::FileConflicts),
    }
}

/// Refuse to touch packages a previous crash left half done.
fn check_for_half_complete_packages(
    plan: &[AnyAction],
    status_db: &StatusDatabase,
) -> Result<()> {
    for action in plan {
        if let AnyAction::Install(install_action) = action {
            if status_db.find_half_complete(&install_action.spec).is_some() {
                return Err(Error::HalfCompleteState(install_action.spec.to_string()));
            }
        }
    }
    Ok(())
}

/// Drive the whole plan.
pub fn perform_plan(
    plan: &[AnyAction],
    options: BuildPackageOptions,
    keep_going: KeepGoing,
    print_summary: PrintSummary,
    paths: &CaravelPaths,
    status_db: &mut StatusDatabase,
) -> Result<InstallSummary> {
    check_for_half_complete_packages(plan, status_db)?;

    let mut summary = InstallSummary::default();
    let total_timer = Instant::now();
    let package_count = plan.len();

    for (counter, action) in plan.iter().enumerate() {
        let build_timer = Instant::now();
        let display_name = action.spec().to_string();
        println!("Starting package {}/{}: {}", counter + 1, package_count, display_name);

        let result = match action {
            AnyAction::Install(install_action) => {
                perform_install_plan_action(paths, install_action, options, status_db)?
            }
            AnyAction::Remove(remove_action) => {
                remove::perform_remove_plan_action(paths, remove_action, Purge::Yes, status_db)?;
                BuildResult::NullValue
            }
        };

        let elapsed = build_timer.elapsed();
        println!("Elapsed time for package {}: {}", display_name, format_elapsed(elapsed));
        summary.results.push(SpecSummary {
            spec: action.spec().clone(),
            result,
            elapsed,
        });

        let failed = !matches!(result, BuildResult::Succeeded | BuildResult::NullValue);
        if failed && keep_going == KeepGoing::No {
            println!("{}", build::create_user_troubleshooting_message(action.spec()));
            summary.aborted = true;
            break;
        }
    }

    println!("Total time taken: {}", format_elapsed(total_timer.elapsed()));
    if print_summary == PrintSummary::Yes {
        summary.print();
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Triplet;

    fn spec(name: &str) -> PackageSpec {
        PackageSpec::from_name_and_triplet(name, Triplet::from_canonical_name("x64-windows"))
            .unwrap()
    }

    #[test]
    fn test_summary_failed_detection() {
        let mut summary = InstallSummary::default();
        summary.results.push(SpecSummary {
            spec: spec("zlib"),
            result: BuildResult::Succeeded,
            elapsed: Duration::from_millis(5),
        });
        assert!(!summary.failed());

        summary.results.push(SpecSummary {
            spec: spec("curl"),
            result: BuildResult::BuildFailed,
            elapsed: Duration::from_millis(5),
        });
        assert!(summary.failed());
    }

    #[test]
    fn test_summary_removes_are_not_failures() {
        let mut summary = InstallSummary::default();
        summary.results.push(SpecSummary {
            spec: spec("zlib"),
            result: BuildResult::NullValue,
            elapsed: Duration::from_millis(1),
        });
        assert!(!summary.failed());
    }

    #[test]
    fn test_keep_going_conversion() {
        assert_eq!(KeepGoing::from(true), KeepGoing::Yes);
        assert_eq!(KeepGoing::from(false), KeepGoing::No);
        assert_eq!(PrintSummary::from(true), PrintSummary::Yes);
    }
}
