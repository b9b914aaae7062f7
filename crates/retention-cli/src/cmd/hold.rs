use crate::output::{print_json, print_table};
use crate::session::{Invocation, Session};
use clap::Subcommand;
use retention_core::model::{PROP_DESCRIPTION, PROP_HOLD_REASON};
use retention_core::types::NodeId;
use retention_core::NodeStore;

#[derive(Subcommand)]
pub enum HoldSubcommand {
    /// Create a hold in the file plan
    Create {
        name: String,
        /// Why the items are held
        #[arg(long)]
        reason: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Put a record or folder on hold
    Add {
        /// Hold name or id
        hold: String,
        /// Node path or id
        node: String,
    },
    /// Release a record or folder from a hold
    Remove {
        /// Hold name or id
        hold: String,
        /// Node path or id
        node: String,
    },
    /// List holds, or the holds covering one item
    List {
        /// Only holds covering this node
        #[arg(long)]
        item: Option<String>,
        /// With --item, list the holds that do not cover it
        #[arg(long, requires = "item")]
        excluded: bool,
    },
    /// Show the reason of a hold, or replace it with --set
    Reason {
        /// Hold name or id
        hold: String,
        /// New reason
        #[arg(long)]
        set: Option<String>,
    },
    /// Show a hold and the items it holds
    Show { hold: String },
    /// Delete a hold, releasing everything it holds
    Delete { hold: String },
}

pub fn run(inv: &Invocation, subcmd: HoldSubcommand) -> anyhow::Result<()> {
    match subcmd {
        HoldSubcommand::Create {
            name,
            reason,
            description,
        } => create(inv, &name, &reason, description.as_deref()),
        HoldSubcommand::Add { hold, node } => add(inv, &hold, &node),
        HoldSubcommand::Remove { hold, node } => remove(inv, &hold, &node),
        HoldSubcommand::List { item, excluded } => list(inv, item.as_deref(), !excluded),
        HoldSubcommand::Reason { hold, set } => reason(inv, &hold, set.as_deref()),
        HoldSubcommand::Show { hold } => show(inv, &hold),
        HoldSubcommand::Delete { hold } => delete(inv, &hold),
    }
}

fn hold_json(s: &Session, hold: &NodeId) -> serde_json::Value {
    let store = s.manager.store();
    serde_json::json!({
        "id": hold,
        "name": store.name(hold),
        "reason": store.text_property(hold, &PROP_HOLD_REASON),
        "description": store.text_property(hold, &PROP_DESCRIPTION),
    })
}

// ---------------------------------------------------------------------------
// create / delete
// ---------------------------------------------------------------------------

fn create(inv: &Invocation, name: &str, reason: &str, description: Option<&str>) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let hold = s
        .manager
        .create_hold(&mut s.ctx, name, reason, description)?;
    s.save()?;

    if inv.json {
        print_json(&hold_json(&s, &hold))?;
    } else {
        println!("Created hold '{name}' [{hold}]");
    }
    Ok(())
}

fn delete(inv: &Invocation, reference: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let hold = s.hold(reference)?;
    let released = s.manager.get_held(&hold)?;
    s.manager.delete_hold(&mut s.ctx, &hold)?;
    s.save()?;

    if inv.json {
        print_json(&serde_json::json!({ "deleted": hold, "released": released }))?;
    } else {
        println!("Deleted hold '{reference}', released {} item(s)", released.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// add / remove
// ---------------------------------------------------------------------------

fn add(inv: &Invocation, hold: &str, node: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let hold = s.hold(hold)?;
    let node = s.node(node)?;
    s.manager.add_to_hold(&mut s.ctx, &hold, &node)?;
    s.save()?;

    if inv.json {
        print_json(&serde_json::json!({ "hold": hold, "node": node, "frozen": true }))?;
    } else {
        println!("Added '{}' to hold '{}'", s.label(&node), s.label(&hold));
    }
    Ok(())
}

fn remove(inv: &Invocation, hold: &str, node: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let hold = s.hold(hold)?;
    let node = s.node(node)?;
    s.manager.remove_from_hold(&mut s.ctx, &hold, &node)?;
    s.save()?;

    let frozen = s.manager.is_frozen(&node);
    if inv.json {
        print_json(&serde_json::json!({ "hold": hold, "node": node, "frozen": frozen }))?;
    } else {
        println!("Removed '{}' from hold '{}'", s.label(&node), s.label(&hold));
        if frozen {
            println!("  still held by another hold");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// reason
// ---------------------------------------------------------------------------

fn reason(inv: &Invocation, reference: &str, new_reason: Option<&str>) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let hold = s.hold(reference)?;
    if let Some(new_reason) = new_reason {
        s.manager.set_hold_reason(&mut s.ctx, &hold, new_reason)?;
        s.save()?;
    }
    let current = s.manager.get_hold_reason(&hold)?;

    if inv.json {
        return print_json(&serde_json::json!({ "hold": hold, "reason": current }));
    }
    match (new_reason, current) {
        (Some(_), Some(current)) => println!("Reason of '{reference}' is now: {current}"),
        (None, Some(current)) => println!("{current}"),
        (_, None) => println!("'{reference}' has no reason recorded."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(inv: &Invocation, item: Option<&str>, included: bool) -> anyhow::Result<()> {
    let s = inv.open()?;
    let holds = match item {
        Some(reference) => s.manager.held_by(&s.node(reference)?, included),
        None => s.manager.get_holds(),
    };

    if inv.json {
        let items: Vec<_> = holds.iter().map(|h| hold_json(&s, h)).collect();
        return print_json(&items);
    }
    if holds.is_empty() {
        println!("No holds.");
        return Ok(());
    }
    let store = s.manager.store();
    let rows = holds
        .iter()
        .map(|h| {
            vec![
                store.name(h).unwrap_or_default(),
                store.text_property(h, &PROP_HOLD_REASON).unwrap_or_default(),
                h.to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "REASON", "ID"], rows);
    Ok(())
}

fn show(inv: &Invocation, reference: &str) -> anyhow::Result<()> {
    let s = inv.open()?;
    let hold = s.hold(reference)?;
    let held = s.manager.get_held(&hold)?;

    if inv.json {
        let mut value = hold_json(&s, &hold);
        value["held"] = serde_json::json!(held);
        return print_json(&value);
    }
    let store = s.manager.store();
    println!("{} [{hold}]", store.name(&hold).unwrap_or_default());
    if let Some(reason) = store.text_property(&hold, &PROP_HOLD_REASON) {
        println!("  reason: {reason}");
    }
    if let Some(description) = store.text_property(&hold, &PROP_DESCRIPTION) {
        println!("  description: {description}");
    }
    if held.is_empty() {
        println!("  holds nothing");
    }
    for node in &held {
        println!("  - {}", s.label(node));
    }
    Ok(())
}
