// src/plan.rs

//! Action plan construction
//!
//! Turns the user's requested specs plus the status database into an
//! ordered list of remove/install actions: dependencies before dependents,
//! every remove before every install, ties broken by `(name, triplet)` so
//! the plan is deterministic. Cycles in the port graph are fatal and name
//! the cycle.

use crate::control::{load_port, BinaryControlFile, SourceControlFile};
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::paths::CaravelPaths;
use crate::spec::{FullPackageSpec, PackageSpec, Triplet};
use crate::status_db::StatusDatabase;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// How an install step will be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPlanType {
    /// Nothing to do; the package is present with the requested features.
    AlreadyInstalled,
    /// A staged binary package exists and only needs committing.
    Install,
    /// The port must be built first.
    BuildAndInstall,
}

/// Whether the user named this spec or the resolver pulled it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    UserRequested,
    AutoSelected,
}

#[derive(Debug, Clone)]
pub struct InstallPlanAction {
    pub spec: PackageSpec,
    pub plan_type: InstallPlanType,
    pub request_type: RequestType,
    pub feature_list: Vec<String>,
    /// Present for `BuildAndInstall`.
    pub source_control_file: Option<SourceControlFile>,
    /// Present for `Install`.
    pub binary_control_file: Option<BinaryControlFile>,
}

impl InstallPlanAction {
    pub fn displayname(&self) -> String {
        if self.feature_list.is_empty() {
            self.spec.to_string()
        } else {
            format!(
                "{}[{}]:{}",
                self.spec.name(),
                self.feature_list.join(","),
                self.spec.triplet()
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovePlanType {
    /// Nothing to remove.
    NotInstalled,
    Remove,
}

#[derive(Debug, Clone)]
pub struct RemovePlanAction {
    pub spec: PackageSpec,
    pub plan_type: RemovePlanType,
    pub request_type: RequestType,
}

/// One step of an action plan.
#[derive(Debug, Clone)]
pub enum AnyAction {
    Install(InstallPlanAction),
    Remove(RemovePlanAction),
}

impl AnyAction {
    pub fn spec(&self) -> &PackageSpec {
        match self {
            AnyAction::Install(a) => &a.spec,
            AnyAction::Remove(a) => &a.spec,
        }
    }
}

struct PlanNode {
    features: BTreeSet<String>,
    deps: BTreeSet<PackageSpec>,
    plan_type: InstallPlanType,
    rebuild: bool,
    scf: Option<SourceControlFile>,
    bcf: Option<BinaryControlFile>,
}

/// Build the ordered action plan for the requested specs.
pub fn create_install_plan(
    fs: &dyn Filesystem,
    paths: &CaravelPaths,
    specs: &[FullPackageSpec],
    status_db: &StatusDatabase,
) -> Result<Vec<AnyAction>> {
    let mut nodes: BTreeMap<PackageSpec, PlanNode> = BTreeMap::new();
    let mut user_requested: BTreeSet<PackageSpec> = BTreeSet::new();
    let mut queue: VecDeque<PackageSpec> = VecDeque::new();

    // Requested feature sets, merged per package before classification.
    let mut requested_features: BTreeMap<PackageSpec, BTreeSet<String>> = BTreeMap::new();
    for full_spec in specs {
        user_requested.insert(full_spec.package_spec.clone());
        requested_features
            .entry(full_spec.package_spec.clone())
            .or_default()
            .extend(full_spec.features.iter().cloned());
        queue.push_back(full_spec.package_spec.clone());
    }

    while let Some(spec) = queue.pop_front() {
        if nodes.contains_key(&spec) {
            continue;
        }
        if !paths.is_valid_triplet(fs, spec.triplet()) {
            return Err(Error::UnknownTriplet(spec.triplet().canonical_name().to_string()));
        }

        let node = classify(fs, paths, &spec, requested_features.remove(&spec), status_db)?;
        for dep in &node.deps {
            if !nodes.contains_key(dep) {
                queue.push_back(dep.clone());
            }
        }
        nodes.insert(spec, node);
    }

    let order = topological_order(&nodes)?;

    let mut actions = Vec::new();
    for spec in order.iter().rev() {
        let node = &nodes[spec];
        if node.rebuild {
            actions.push(AnyAction::Remove(RemovePlanAction {
                spec: spec.clone(),
                plan_type: RemovePlanType::Remove,
                request_type: request_type_of(spec, &user_requested),
            }));
        }
    }
    for spec in &order {
        let node = &nodes[spec];
        actions.push(AnyAction::Install(InstallPlanAction {
            spec: spec.clone(),
            plan_type: node.plan_type,
            request_type: request_type_of(spec, &user_requested),
            feature_list: node.features.iter().cloned().collect(),
            source_control_file: node.scf.clone(),
            binary_control_file: node.bcf.clone(),
        }));
    }
    Ok(actions)
}

fn request_type_of(spec: &PackageSpec, user_requested: &BTreeSet<PackageSpec>) -> RequestType {
    if user_requested.contains(spec) {
        RequestType::UserRequested
    } else {
        RequestType::AutoSelected
    }
}

fn classify(
    fs: &dyn Filesystem,
    paths: &CaravelPaths,
    spec: &PackageSpec,
    requested_features: Option<BTreeSet<String>>,
    status_db: &StatusDatabase,
) -> Result<PlanNode> {
    let triplet = spec.triplet().clone();
    let requested = requested_features.unwrap_or_default();

    if let Some(installed) = status_db.find_installed(spec.name(), triplet.canonical_name()) {
        let installed_features =
            status_db.installed_features(spec.name(), triplet.canonical_name());

        if requested.is_subset(&installed_features) {
            // Satisfied; dependencies come from the recorded paragraph so
            // the plan stays ordered even when the port tree moved on.
            let deps = installed
                .package
                .depends
                .iter()
                .map(|name| PackageSpec::from_name_and_triplet(name, triplet.clone()))
                .collect::<Result<BTreeSet<_>>>()?;
            return Ok(PlanNode {
                features: installed_features.iter().cloned().collect(),
                deps,
                plan_type: InstallPlanType::AlreadyInstalled,
                rebuild: false,
                scf: None,
                bcf: None,
            });
        }

        // Feature set grew: remove and rebuild with the union.
        let scf = load_port(fs, &paths.port_dir(spec.name()))?;
        let mut features = installed_features;
        features.extend(requested);
        let deps = dependencies_of(&scf, &triplet, &features)?;
        return Ok(PlanNode {
            features,
            deps,
            plan_type: InstallPlanType::BuildAndInstall,
            rebuild: true,
            scf: Some(scf),
            bcf: None,
        });
    }

    let scf = load_port(fs, &paths.port_dir(spec.name()))?;
    let features: BTreeSet<String> = if requested.is_empty() {
        scf.core_paragraph.default_features.iter().cloned().collect()
    } else {
        requested
    };
    let deps = dependencies_of(&scf, &triplet, &features)?;

    let cached_control = paths.package_dir(spec).join("CONTROL");
    if fs.exists(&cached_control) {
        let bcf = BinaryControlFile::load(fs, &cached_control)?;
        return Ok(PlanNode {
            features,
            deps,
            plan_type: InstallPlanType::Install,
            rebuild: false,
            scf: None,
            bcf: Some(bcf),
        });
    }

    Ok(PlanNode {
        features,
        deps,
        plan_type: InstallPlanType::BuildAndInstall,
        rebuild: false,
        scf: Some(scf),
        bcf: None,
    })
}

fn dependencies_of(
    scf: &SourceControlFile,
    triplet: &Triplet,
    features: &BTreeSet<String>,
) -> Result<BTreeSet<PackageSpec>> {
    let mut names: BTreeSet<String> =
        crate::control::filter_dependencies(&scf.core_paragraph.depends, triplet)
            .into_iter()
            .collect();
    for feature in features {
        if let Some(fpgh) = scf.find_feature(feature) {
            names.extend(crate::control::filter_dependencies(&fpgh.depends, triplet));
        }
    }
    names
        .into_iter()
        .map(|name| PackageSpec::from_name_and_triplet(name, triplet.clone()))
        .collect()
}

fn topological_order(nodes: &BTreeMap<PackageSpec, PlanNode>) -> Result<Vec<PackageSpec>> {
    let mut order = Vec::new();
    let mut visited: BTreeSet<PackageSpec> = BTreeSet::new();
    let mut stack: Vec<PackageSpec> = Vec::new();

    fn visit(
        spec: &PackageSpec,
        nodes: &BTreeMap<PackageSpec, PlanNode>,
        visited: &mut BTreeSet<PackageSpec>,
        stack: &mut Vec<PackageSpec>,
        order: &mut Vec<PackageSpec>,
    ) -> Result<()> {
        if visited.contains(spec) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|s| s == spec) {
            let cycle: Vec<String> = stack[pos..]
                .iter()
                .chain(std::iter::once(spec))
                .map(|s| s.to_string())
                .collect();
            return Err(Error::DependencyCycle(cycle.join(" -> ")));
        }
        stack.push(spec.clone());
        if let Some(node) = nodes.get(spec) {
            for dep in &node.deps {
                visit(dep, nodes, visited, stack, order)?;
            }
        }
        stack.pop();
        visited.insert(spec.clone());
        order.push(spec.clone());
        Ok(())
    }

    for spec in nodes.keys() {
        visit(spec, nodes, &mut visited, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn to_output_string(request_type: RequestType, name: &str) -> String {
    match request_type {
        RequestType::AutoSelected => format!("  * {}", name),
        RequestType::UserRequested => format!("    {}", name),
    }
}

/// Print the plan grouped by category. Fails with [`Error::RecurseRequired`]
/// when the plan rebuilds installed packages and `--recurse` was not given.
pub fn print_plan(plan: &[AnyAction], is_recursive: bool) -> Result<()> {
    let mut remove_specs: BTreeSet<&PackageSpec> = BTreeSet::new();
    let mut rebuilt = Vec::new();
    let mut only_install = Vec::new();
    let mut new_plans = Vec::new();
    let mut already_installed = Vec::new();
    let mut has_auto_selected = false;

    for action in plan {
        match action {
            AnyAction::Remove(r) => {
                remove_specs.insert(&r.spec);
            }
            AnyAction::Install(i) => {
                if i.request_type == RequestType::AutoSelected {
                    has_auto_selected = true;
                }
                // Removes are ordered before installs, so the rebuild pair
                // is already known by the time its install shows up.
                if remove_specs.contains(&i.spec) {
                    rebuilt.push(i);
                    continue;
                }
                match i.plan_type {
                    InstallPlanType::Install => only_install.push(i),
                    InstallPlanType::BuildAndInstall => new_plans.push(i),
                    InstallPlanType::AlreadyInstalled => {
                        if i.request_type == RequestType::UserRequested {
                            already_installed.push(i);
                        }
                    }
                }
            }
        }
    }

    for group in [&mut rebuilt, &mut only_install, &mut new_plans, &mut already_installed] {
        group.sort_by(|a, b| a.spec.cmp(&b.spec));
    }

    let print_group = |heading: &str, group: &[&InstallPlanAction]| {
        if group.is_empty() {
            return;
        }
        println!("{}", heading);
        for action in group {
            println!("{}", to_output_string(action.request_type, &action.displayname()));
        }
    };

    print_group("The following packages are already installed:", &already_installed);
    print_group("The following packages will be rebuilt:", &rebuilt);
    print_group("The following packages will be built and installed:", &new_plans);
    print_group("The following packages will be directly installed:", &only_install);

    if has_auto_selected {
        println!("Additional packages (*) will be installed to complete this operation.");
    }

    if !remove_specs.is_empty() && !is_recursive {
        return Err(Error::RecurseRequired);
    }
    Ok(())
}
