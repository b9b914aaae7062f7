use crate::output::print_json;
use crate::session::Invocation;
use anyhow::Context;
use retention_core::config::Config;
use retention_core::{paths, InMemoryStore, RecordsManager};

pub fn run(inv: &Invocation, name: Option<&str>) -> anyhow::Result<()> {
    let root = &inv.root;
    let plan_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "File Plan".to_string())
    });

    if !inv.json {
        println!("Initializing records retention in: {}", root.display());
    }

    let config_created = !paths::config_path(root).exists();
    if config_created {
        Config::new(&plan_name)
            .save(root)
            .context("failed to write config.yaml")?;
    }
    let config = Config::load(root).context("failed to load config")?;

    let store_created = !paths::store_path(root).exists();
    let store = if store_created {
        InMemoryStore::new()
    } else {
        InMemoryStore::load(root).context("failed to load store")?
    };
    let mut manager =
        RecordsManager::from_config(store, &config).context("invalid configuration")?;

    let mut ctx = inv.context();
    let (file_plan, plan_created) = match manager.file_plan() {
        Some(plan) => (plan, false),
        None => (manager.create_file_plan(&mut ctx, &config.file_plan.name)?, true),
    };
    if store_created || plan_created {
        manager
            .store()
            .save(root)
            .context("failed to write store.yaml")?;
    }

    if inv.json {
        return print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "file_plan": file_plan,
            "name": config.file_plan.name,
            "created": config_created || plan_created,
        }));
    }

    let status = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", status(config_created), paths::CONFIG_FILE);
    println!("  {} {}", status(store_created), paths::STORE_FILE);
    println!(
        "  {} file plan '{}' [{}]",
        status(plan_created),
        config.file_plan.name,
        file_plan
    );
    Ok(())
}
