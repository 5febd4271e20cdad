//! `cairn uninstall` and `cairn uninstall-unused`

use super::args::{ExecArgs, ResolutionArgs, UninstallArgs, UninstallUnusedArgs};
use super::context::Context;
use super::plan;
use super::ui;
use cairn_diagnostics::CairnError;
use cairn_repository::PackageDatabase;
use cairn_resolver::{Resolver, Target};
use cairn_types::PackageSpec;
use tracing::info;

fn resolver(ctx: &Context, resolution: &ResolutionArgs) -> Result<Resolver<PackageDatabase>, CairnError> {
    let mut options = ctx.config.resolver.clone();
    resolution.apply(&mut options);
    Ok(Resolver::with_options(ctx.database()?, options))
}

async fn remove(
    ctx: &Context,
    mut resolver: Resolver<PackageDatabase>,
    targets: Vec<Target>,
    exec: &ExecArgs,
) -> Result<bool, CairnError> {
    let spinner = ui::spinner("Resolving removals...", ctx.quiet());
    let result = resolver.add_targets(targets);
    spinner.finish_and_clear();
    let resolved = result?;
    plan::carry_out(ctx, resolved, exec).await
}

pub async fn uninstall(ctx: &Context, args: UninstallArgs) -> Result<(), CairnError> {
    let specs = args
        .specs
        .iter()
        .map(|raw| raw.parse::<PackageSpec>().map_err(|e| CairnError::invalid_spec(raw, &e)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut world = ctx.world()?;
    let resolver = resolver(ctx, &args.resolution)?;
    let options = args.uninstall_options(world.specs().to_vec());
    let targets = resolver.removal_targets(&specs, &options)?;

    if !remove(ctx, resolver, targets, &args.exec).await? || args.exec.fetch {
        return Ok(());
    }

    let mut changed = false;
    for spec in &specs {
        changed |= world.remove_name(&spec.name);
    }
    if changed {
        world.save()?;
        info!("Updated world file {}", world.path().display());
    }
    Ok(())
}

/// Remove everything installed that the world does not need.
pub async fn uninstall_unused(ctx: &Context, args: UninstallUnusedArgs) -> Result<(), CairnError> {
    let world = ctx.world()?;
    let resolver = resolver(ctx, &args.resolution)?;
    let targets = resolver.unused_targets(world.specs())?;
    if targets.is_empty() {
        ui::success("Nothing to remove");
        return Ok(());
    }
    remove(ctx, resolver, targets, &args.exec).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_repository::PackageStore;
    use cairn_types::{CandidateRecord, DepTree, Version};
    use std::fs;
    use tempfile::TempDir;

    fn installed_root() -> (TempDir, Context) {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("cairn.toml"), "").unwrap();
        let ctx = Context::load(root.path().to_path_buf(), None, None, true).unwrap();

        let mut store = PackageStore::load(&ctx.paths.installed).unwrap();
        store.insert(CandidateRecord::new("zlib", Version::new(1, 3, 0)).installed());
        store.insert(CandidateRecord::new("orphan", Version::new(1, 0, 0)).installed());
        store.insert(
            CandidateRecord::new("curl", Version::new(8, 5, 0))
                .with_run(DepTree::all(vec![DepTree::named("zlib")]))
                .installed(),
        );
        store.save().unwrap();
        fs::create_dir_all(ctx.paths.world.parent().unwrap()).unwrap();
        fs::write(&ctx.paths.world, "curl\n").unwrap();
        (root, ctx)
    }

    fn installed_names(ctx: &Context) -> Vec<String> {
        let mut names: Vec<String> = PackageStore::load(&ctx.paths.installed)
            .unwrap()
            .packages()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_uninstall_unused_keeps_world() {
        let (_root, ctx) = installed_root();
        uninstall_unused(
            &ctx,
            UninstallUnusedArgs {
                resolution: ResolutionArgs::default(),
                exec: ExecArgs::default(),
            },
        )
        .await
        .unwrap();
        assert_eq!(installed_names(&ctx), vec!["curl", "zlib"]);
    }

    #[tokio::test]
    async fn test_uninstall_unknown_package() {
        let (_root, ctx) = installed_root();
        let err = uninstall(
            &ctx,
            UninstallArgs {
                specs: vec!["vim".to_string()],
                with_dependencies: false,
                with_unused_dependencies: false,
                exempt_build_dependents: false,
                resolution: ResolutionArgs::default(),
                exec: ExecArgs::default(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CairnError::NotInstalled { .. }));
        assert_eq!(installed_names(&ctx), vec!["curl", "orphan", "zlib"]);
    }
}
