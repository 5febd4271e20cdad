//! `cairn install`

use super::args::InstallArgs;
use super::context::Context;
use super::plan;
use super::ui;
use cairn_diagnostics::CairnError;
use cairn_resolver::{Resolver, Target};
use cairn_types::PackageSpec;
use tracing::{debug, info};

/// `@name` is a set, anything else a package spec.
pub fn parse_targets(specs: &[String]) -> Result<Vec<Target>, CairnError> {
    specs
        .iter()
        .map(|raw| match raw.strip_prefix('@') {
            Some(set) if !set.is_empty() => Ok(Target::Set(set.to_string())),
            _ => raw
                .parse::<PackageSpec>()
                .map(Target::Package)
                .map_err(|e| CairnError::invalid_spec(raw, &e)),
        })
        .collect()
}

/// What goes into the world file for a target: its name and slot, nothing else.
fn world_entry(spec: &PackageSpec) -> PackageSpec {
    let entry = PackageSpec::new(spec.name.clone());
    match &spec.slot {
        Some(slot) => entry.with_slot(slot.clone()),
        None => entry,
    }
}

pub async fn install(ctx: &Context, args: InstallArgs) -> Result<(), CairnError> {
    let targets = parse_targets(&args.specs)?;

    let mut options = ctx.config.resolver.clone();
    args.resolution.apply(&mut options);
    debug!("Resolver options: {:?}", options);

    let database = ctx.database()?;
    let spinner = ui::spinner("Resolving dependencies...", ctx.quiet());
    let mut resolver = Resolver::with_options(database, options);
    let result = resolver.add_targets(targets.iter().cloned());
    spinner.finish_and_clear();
    let resolved = result?;

    let executed = plan::carry_out(ctx, resolved, &args.exec).await?;
    if !executed || args.preserve_world || args.exec.fetch {
        return Ok(());
    }

    let mut world = ctx.world()?;
    let mut changed = false;
    for target in &targets {
        if let Target::Package(spec) = target {
            changed |= world.add(&world_entry(spec));
        }
    }
    if changed {
        world.save()?;
        info!("Updated world file {}", world.path().display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::args::{ExecArgs, ResolutionArgs, UninstallArgs};
    use crate::commands::uninstall::uninstall;
    use cairn_repository::{PackageStore, World};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_targets() {
        let targets = parse_targets(&["@system".to_string(), "curl:0".to_string()]).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(matches!(&targets[0], Target::Set(name) if name == "system"));
        assert!(matches!(&targets[1], Target::Package(spec) if spec.name == "curl"));

        let err = parse_targets(&["curl:".to_string()]).unwrap_err();
        assert!(matches!(err, CairnError::InvalidSpec { .. }));
    }

    #[test]
    fn test_world_entry_drops_version() {
        let spec: PackageSpec = "curl@>=8:0".parse().unwrap();
        assert_eq!(world_entry(&spec), PackageSpec::new("curl").with_slot("0"));
    }

    fn sample_root() -> TempDir {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("cairn.toml"), "").unwrap();
        let repos = root.path().join("var/db/cairn/repos");
        fs::create_dir_all(&repos).unwrap();
        fs::write(
            repos.join("core.toml"),
            r#"
[[package]]
name = "zlib"
version = "1.3.0"

[[package]]
name = "curl"
version = "8.5.0"
run = ["zlib"]
"#,
        )
        .unwrap();
        root
    }

    #[tokio::test]
    async fn test_install_then_uninstall() {
        let root = sample_root();
        let ctx = Context::load(root.path().to_path_buf(), None, Some(1), true).unwrap();

        install(
            &ctx,
            InstallArgs {
                specs: vec!["curl".to_string()],
                preserve_world: false,
                resolution: ResolutionArgs::default(),
                exec: ExecArgs::default(),
            },
        )
        .await
        .unwrap();

        let installed = PackageStore::load(&ctx.paths.installed).unwrap();
        let mut names: Vec<&str> = installed.packages().iter().map(|p| p.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["curl", "zlib"]);
        let world = World::load(&ctx.paths.world).unwrap();
        assert_eq!(world.specs(), &[PackageSpec::new("curl")]);

        uninstall(
            &ctx,
            UninstallArgs {
                specs: vec!["curl".to_string()],
                with_dependencies: false,
                with_unused_dependencies: true,
                exempt_build_dependents: false,
                resolution: ResolutionArgs::default(),
                exec: ExecArgs::default(),
            },
        )
        .await
        .unwrap();

        assert!(PackageStore::load(&ctx.paths.installed).unwrap().packages().is_empty());
        assert!(World::load(&ctx.paths.world).unwrap().specs().is_empty());
    }

    #[tokio::test]
    async fn test_pretend_changes_nothing() {
        let root = sample_root();
        let ctx = Context::load(root.path().to_path_buf(), None, None, true).unwrap();

        install(
            &ctx,
            InstallArgs {
                specs: vec!["curl".to_string()],
                preserve_world: false,
                resolution: ResolutionArgs::default(),
                exec: ExecArgs {
                    pretend: true,
                    ..ExecArgs::default()
                },
            },
        )
        .await
        .unwrap();

        assert!(!ctx.paths.installed.exists());
        assert!(!ctx.paths.world.exists());
    }
}
