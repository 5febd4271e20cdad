//! Argument groups shared by the resolving commands.

use cairn_resolver::UninstallOptions;
use cairn_types::{
    BlockerPolicy, CircularPolicy, ContinueOnFailure, DepsPolicy, DowngradePolicy, MaskKind,
    NewSlotsPolicy, PackageSpec, ReinstallPolicy, ResolverOptions, SuggestedPolicy, UpgradePolicy,
};
use clap::Args;

/// Resolver flags. Anything left unset keeps the config file's value.
#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Resolution")]
pub struct ResolutionArgs {
    /// When to reinstall packages that are already installed
    #[arg(long = "dl-reinstall", value_name = "POLICY")]
    pub reinstall: Option<ReinstallPolicy>,

    /// Rebuild packages named on the command line even when installed
    #[arg(long = "dl-reinstall-targets", value_name = "BOOL")]
    pub reinstall_targets: Option<bool>,

    /// Move dependencies to their best version (always, as-needed)
    #[arg(long = "dl-upgrade", value_name = "POLICY")]
    pub upgrade: Option<UpgradePolicy>,

    /// What to do about downgrades (as-needed, warning, error)
    #[arg(long = "dl-downgrade", value_name = "POLICY")]
    pub downgrade: Option<DowngradePolicy>,

    /// Prefer the best slot over the installed one (always, as-needed)
    #[arg(long = "dl-new-slots", value_name = "POLICY")]
    pub new_slots: Option<NewSlotsPolicy>,

    #[arg(long = "dl-installed-deps-pre", value_name = "POLICY")]
    pub installed_deps_pre: Option<DepsPolicy>,

    #[arg(long = "dl-installed-deps-runtime", value_name = "POLICY")]
    pub installed_deps_runtime: Option<DepsPolicy>,

    #[arg(long = "dl-installed-deps-post", value_name = "POLICY")]
    pub installed_deps_post: Option<DepsPolicy>,

    #[arg(long = "dl-uninstalled-deps-pre", value_name = "POLICY")]
    pub uninstalled_deps_pre: Option<DepsPolicy>,

    #[arg(long = "dl-uninstalled-deps-runtime", value_name = "POLICY")]
    pub uninstalled_deps_runtime: Option<DepsPolicy>,

    #[arg(long = "dl-uninstalled-deps-post", value_name = "POLICY")]
    pub uninstalled_deps_post: Option<DepsPolicy>,

    /// What to do with suggested dependencies (show, discard, install)
    #[arg(long = "dl-suggested", value_name = "POLICY")]
    pub suggested: Option<SuggestedPolicy>,

    /// What to do with dependency cycles (error, discard)
    #[arg(long = "dl-circular", value_name = "POLICY")]
    pub circular: Option<CircularPolicy>,

    /// What to do with blockers (error, discard, pretend-satisfied)
    #[arg(long = "dl-blocks", value_name = "POLICY")]
    pub blocks: Option<BlockerPolicy>,

    /// Mask kinds that may be overridden (keyword, repository)
    #[arg(long, value_delimiter = ',', value_name = "KINDS")]
    pub override_masks: Vec<MaskKind>,

    /// Allow removing installed packages that are blocked
    #[arg(long)]
    pub permit_uninstall: bool,

    /// Packages that must stay exactly as installed
    #[arg(long, value_name = "SPEC")]
    pub keep: Vec<PackageSpec>,

    /// Install by way of binary packages
    #[arg(long)]
    pub make_binaries: bool,

    /// Give up after this many restarts
    #[arg(long, value_name = "N")]
    pub max_restarts: Option<usize>,
}

macro_rules! overlay {
    ($args:expr => $options:ident: $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $args.$field {
                $options.$field = value;
            }
        )+
    };
}

impl ResolutionArgs {
    /// Layer the flags that were given over `options`.
    pub fn apply(&self, options: &mut ResolverOptions) {
        overlay!(self => options:
            reinstall,
            reinstall_targets,
            upgrade,
            downgrade,
            new_slots,
            installed_deps_pre,
            installed_deps_runtime,
            installed_deps_post,
            uninstalled_deps_pre,
            uninstalled_deps_runtime,
            uninstalled_deps_post,
            suggested,
            circular,
            blocks,
            max_restarts,
        );
        if !self.override_masks.is_empty() {
            options.override_masks = self.override_masks.clone();
        }
        options.permit_uninstall |= self.permit_uninstall;
        options.make_binaries |= self.make_binaries;
        options.keep.extend(self.keep.iter().cloned());
    }
}

#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Execution")]
pub struct ExecArgs {
    /// Which jobs still run after a failure
    /// (never, if-fetch-only, if-satisfied, if-independent, always)
    #[arg(long, value_name = "POLICY")]
    pub continue_on_failure: Option<ContinueOnFailure>,

    /// Only fetch distfiles
    #[arg(long)]
    pub fetch: bool,

    /// Show what would be done and stop
    #[arg(short, long)]
    pub pretend: bool,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Packages or @sets to install
    #[arg(required = true, value_name = "SPEC")]
    pub specs: Vec<String>,

    /// Do not add the targets to the world file
    #[arg(long)]
    pub preserve_world: bool,

    #[command(flatten)]
    pub resolution: ResolutionArgs,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Installed packages to remove
    #[arg(required = true, value_name = "SPEC")]
    pub specs: Vec<String>,

    /// Also remove installed packages that depend on the targets
    #[arg(long)]
    pub with_dependencies: bool,

    /// Also remove dependencies nothing else needs
    #[arg(long)]
    pub with_unused_dependencies: bool,

    /// Leave packages that only need a target to build
    #[arg(long)]
    pub exempt_build_dependents: bool,

    #[command(flatten)]
    pub resolution: ResolutionArgs,

    #[command(flatten)]
    pub exec: ExecArgs,
}

impl UninstallArgs {
    pub fn uninstall_options(&self, protected: Vec<PackageSpec>) -> UninstallOptions {
        UninstallOptions {
            with_dependencies: self.with_dependencies,
            with_unused_dependencies: self.with_unused_dependencies,
            exempt_build_dependents: self.exempt_build_dependents,
            protected,
        }
    }
}

#[derive(Args, Debug)]
pub struct UninstallUnusedArgs {
    #[command(flatten)]
    pub resolution: ResolutionArgs,

    #[command(flatten)]
    pub exec: ExecArgs,
}
