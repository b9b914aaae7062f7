use crate::output::{print_json, print_table};
use crate::session::Invocation;
use anyhow::Context;
use clap::Subcommand;
use retention_core::event::SIMPLE_EVENT_TYPE;

#[derive(Subcommand)]
pub enum EventSubcommand {
    /// List disposition events
    List,
    /// List event types
    Types,
    /// Add a disposition event
    Add {
        /// Event name, e.g. case_closed
        name: String,
        /// Display label
        #[arg(long)]
        label: String,
        /// Event type
        #[arg(long = "type", value_name = "TYPE", default_value = SIMPLE_EVENT_TYPE)]
        event_type: String,
    },
    /// Change an event's label or type
    Edit {
        name: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long = "type", value_name = "TYPE")]
        event_type: Option<String>,
    },
    /// Remove an event no schedule step triggers on
    Remove { name: String },
}

pub fn run(inv: &Invocation, subcmd: EventSubcommand) -> anyhow::Result<()> {
    match subcmd {
        EventSubcommand::List => list(inv),
        EventSubcommand::Types => types(inv),
        EventSubcommand::Add {
            name,
            label,
            event_type,
        } => add(inv, &name, &label, &event_type),
        EventSubcommand::Edit {
            name,
            label,
            event_type,
        } => edit(inv, &name, label, event_type),
        EventSubcommand::Remove { name } => remove(inv, &name),
    }
}

fn list(inv: &Invocation) -> anyhow::Result<()> {
    let s = inv.open()?;
    let events = s.manager.get_events();
    if inv.json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }
    let rows = events
        .iter()
        .map(|e| vec![e.name.clone(), e.display_label.clone(), e.event_type.clone()])
        .collect();
    print_table(&["NAME", "LABEL", "TYPE"], rows);
    Ok(())
}

fn types(inv: &Invocation) -> anyhow::Result<()> {
    let s = inv.open()?;
    let types = s.manager.get_event_types();
    if inv.json {
        return print_json(&types);
    }
    let rows = types
        .iter()
        .map(|t| {
            vec![
                t.name.clone(),
                if t.automatic { "automatic" } else { "manual" }.to_string(),
            ]
        })
        .collect();
    print_table(&["TYPE", "COMPLETION"], rows);
    Ok(())
}

fn add(inv: &Invocation, name: &str, label: &str, event_type: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let event = s.manager.add_event(event_type, name, label)?;
    s.save_events()?;

    if inv.json {
        print_json(&event)?;
    } else {
        println!("Added event '{}' ({})", event.name, event.display_label);
    }
    Ok(())
}

fn edit(
    inv: &Invocation,
    name: &str,
    label: Option<String>,
    event_type: Option<String>,
) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let current = s
        .manager
        .get_event(name)
        .cloned()
        .with_context(|| format!("event '{name}' not found"))?;
    let label = label.unwrap_or(current.display_label);
    let event_type = event_type.unwrap_or(current.event_type);
    let event = s.manager.edit_event(name, &label, &event_type)?;
    s.save_events()?;

    if inv.json {
        print_json(&event)?;
    } else {
        println!("Updated event '{}' ({}, {})", event.name, event.display_label, event.event_type);
    }
    Ok(())
}

fn remove(inv: &Invocation, name: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let event = s.manager.remove_event(name)?;
    s.save_events()?;

    if inv.json {
        print_json(&serde_json::json!({ "removed": event.name }))?;
    } else {
        println!("Removed event '{}'", event.name);
    }
    Ok(())
}
