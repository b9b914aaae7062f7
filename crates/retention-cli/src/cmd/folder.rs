use crate::output::{fmt_date, print_json};
use crate::session::Invocation;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum FolderSubcommand {
    /// Create a record folder in a category
    Create {
        /// Category path or id
        category: String,
        name: String,
    },
}

pub fn run(inv: &Invocation, subcmd: FolderSubcommand) -> anyhow::Result<()> {
    match subcmd {
        FolderSubcommand::Create { category, name } => create(inv, &category, &name),
    }
}

fn create(inv: &Invocation, category: &str, name: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let category = s.node(category)?;
    let folder = s.manager.create_folder(&mut s.ctx, &category, name)?;
    s.save()?;

    let path = s.label(&folder);
    let next = s.manager.get_next_disposition_action(&folder);
    if inv.json {
        print_json(&serde_json::json!({
            "id": folder,
            "path": path,
            "next_action": next,
        }))?;
    } else {
        println!("Created folder '{path}' [{folder}]");
        if let Some(action) = next {
            println!("  next action: {} (as of {})", action.name, fmt_date(action.as_of));
        }
    }
    Ok(())
}
