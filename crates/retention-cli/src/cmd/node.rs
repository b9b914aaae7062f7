use crate::output::{print_json, print_table};
use crate::session::Invocation;
use clap::Subcommand;
use retention_core::model::ASSOC_CONTAINS;
use retention_core::NodeStore;

#[derive(Subcommand)]
pub enum NodeSubcommand {
    /// Show a node's kind, aspects and properties
    Show {
        /// Node path or id
        node: String,
    },
    /// List the contents of a container (default: the file plan)
    List { node: Option<String> },
}

pub fn run(inv: &Invocation, subcmd: NodeSubcommand) -> anyhow::Result<()> {
    match subcmd {
        NodeSubcommand::Show { node } => show(inv, &node),
        NodeSubcommand::List { node } => list(inv, node.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(inv: &Invocation, reference: &str) -> anyhow::Result<()> {
    let s = inv.open()?;
    let id = s.node(reference)?;
    let node = s.manager.store().require(&id)?;
    let path = s.label(&id);
    let holds: Vec<String> = s
        .manager
        .get_holds_for_item(&id)
        .iter()
        .map(|h| s.label(h))
        .collect();

    if inv.json {
        return print_json(&serde_json::json!({
            "id": node.id,
            "kind": node.kind,
            "path": path,
            "aspects": node.aspects,
            "properties": node.properties,
            "holds": holds,
            "frozen": s.manager.is_frozen(&id),
        }));
    }

    println!("{path} [{}]", node.id);
    println!("  kind: {}", node.kind);
    if !node.aspects.is_empty() {
        let aspects: Vec<&str> = node.aspects.iter().map(|a| a.as_str()).collect();
        println!("  aspects: {}", aspects.join(", "));
    }
    if !holds.is_empty() {
        println!("  holds: {}", holds.join(", "));
    }
    println!();
    let rows = node
        .properties
        .iter()
        .map(|(name, value)| vec![name.to_string(), value.to_string()])
        .collect();
    print_table(&["PROPERTY", "VALUE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(inv: &Invocation, reference: Option<&str>) -> anyhow::Result<()> {
    let s = inv.open()?;
    let parent = match reference {
        Some(r) => s.node(r)?,
        None => s.file_plan()?,
    };
    let store = s.manager.store();
    let children = store.children(&parent, Some(&ASSOC_CONTAINS));

    if inv.json {
        let items: Vec<_> = children
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c,
                    "name": store.name(c),
                    "kind": store.kind(c),
                })
            })
            .collect();
        return print_json(&items);
    }

    if children.is_empty() {
        println!("No items.");
        return Ok(());
    }
    let rows = children
        .iter()
        .map(|c| {
            vec![
                store.name(c).unwrap_or_default(),
                store.kind(c).map(|k| k.to_string()).unwrap_or_default(),
                c.to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "KIND", "ID"], rows);
    Ok(())
}
