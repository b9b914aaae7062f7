use crate::output::print_json;
use crate::session::Invocation;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum CategorySubcommand {
    /// Create a record category
    Create {
        name: String,
        /// Parent category path or id (default: the file plan)
        #[arg(long)]
        parent: Option<String>,
    },
}

pub fn run(inv: &Invocation, subcmd: CategorySubcommand) -> anyhow::Result<()> {
    match subcmd {
        CategorySubcommand::Create { name, parent } => create(inv, &name, parent.as_deref()),
    }
}

fn create(inv: &Invocation, name: &str, parent: Option<&str>) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let parent = match parent {
        Some(reference) => s.node(reference)?,
        None => s.file_plan()?,
    };
    let category = s.manager.create_category(&mut s.ctx, &parent, name)?;
    s.save()?;

    let path = s.label(&category);
    if inv.json {
        print_json(&serde_json::json!({ "id": category, "path": path }))?;
    } else {
        println!("Created category '{path}' [{category}]");
    }
    Ok(())
}
