use crate::output::{fmt_date, print_json, print_table};
use crate::session::Invocation;
use clap::Subcommand;
use retention_core::disposition::{DispositionAction, ExecutionOutcome};

#[derive(Subcommand)]
pub enum DispositionSubcommand {
    /// Show the pending disposition action of a record or folder
    Next {
        /// Node path or id
        node: String,
    },
    /// Complete a trigger event on the pending action
    Fire {
        /// Node path or id
        node: String,
        event: String,
    },
    /// Withdraw a completed trigger event
    Undo {
        /// Node path or id
        node: String,
        event: String,
    },
    /// Run the pending action if it is eligible and the item is not held
    Execute {
        /// Node path or id
        node: String,
    },
    /// Cut off a record or folder now, ahead of its schedule
    Cutoff {
        /// Node path or id
        node: String,
    },
    /// Re-read the pending action against its schedule step
    Refresh {
        /// Node path or id
        node: String,
    },
    /// List completed disposition actions, oldest first
    History {
        /// Node path or id
        node: String,
    },
}

pub fn run(inv: &Invocation, subcmd: DispositionSubcommand) -> anyhow::Result<()> {
    match subcmd {
        DispositionSubcommand::Next { node } => next(inv, &node),
        DispositionSubcommand::Fire { node, event } => fire(inv, &node, &event),
        DispositionSubcommand::Undo { node, event } => undo(inv, &node, &event),
        DispositionSubcommand::Execute { node } => execute(inv, &node),
        DispositionSubcommand::Cutoff { node } => cutoff(inv, &node),
        DispositionSubcommand::Refresh { node } => refresh(inv, &node),
        DispositionSubcommand::History { node } => history(inv, &node),
    }
}

fn print_action(action: &DispositionAction) {
    println!("  step:   {}", action.name);
    println!("  as of:  {}", fmt_date(action.as_of));
    for event in &action.events {
        let state = if event.complete {
            format!(
                "completed {} by {}",
                fmt_date(event.completed_at),
                event.completed_by.as_deref().unwrap_or("-")
            )
        } else {
            "pending".to_string()
        };
        println!("  event:  {} ({state})", event.event_name);
    }
}

// ---------------------------------------------------------------------------
// next
// ---------------------------------------------------------------------------

fn next(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let s = inv.open()?;
    let node = s.node(node)?;
    let action = s.manager.get_next_disposition_action(&node);
    let eligible = s.manager.is_next_disposition_action_eligible(&s.ctx, &node);
    let frozen = s.manager.is_frozen(&node);
    let cut_off = s.manager.is_disposable_item_cutoff(&node);

    if inv.json {
        return print_json(&serde_json::json!({
            "node": node,
            "action": action,
            "eligible": eligible,
            "frozen": frozen,
            "cut_off": cut_off,
        }));
    }

    let path = s.label(&node);
    match action {
        Some(action) => {
            println!("Next action for '{path}':");
            print_action(&action);
            println!("  eligible: {}", if eligible { "yes" } else { "no" });
            if frozen {
                println!("  frozen: held");
            }
            if cut_off {
                println!("  cut off: yes");
            }
        }
        None => println!("'{path}' has no pending disposition action."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// fire / undo
// ---------------------------------------------------------------------------

fn fire(inv: &Invocation, node: &str, event: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let action = s.manager.complete_event(&mut s.ctx, &node, event)?;
    s.save()?;

    if inv.json {
        return print_json(&action);
    }
    println!("Completed event '{event}' on '{}'", s.label(&node));
    print_action(&action);
    Ok(())
}

fn undo(inv: &Invocation, node: &str, event: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let action = s.manager.undo_event(&node, event)?;
    s.save()?;

    if inv.json {
        return print_json(&action);
    }
    println!("Withdrew event '{event}' on '{}'", s.label(&node));
    print_action(&action);
    Ok(())
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

fn execute(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let outcome = s
        .manager
        .execute_next_disposition_action(&mut s.ctx, &node)?;
    if matches!(outcome, ExecutionOutcome::Executed { .. }) {
        s.save()?;
    }

    let path = s.label(&node);
    match outcome {
        ExecutionOutcome::Executed { completed, next } => {
            if inv.json {
                return print_json(&serde_json::json!({
                    "outcome": "executed",
                    "completed": completed,
                    "next": next,
                }));
            }
            println!("Executed {} on '{path}'", completed.name);
            match next {
                Some(next) => println!("  next: {} (as of {})", next.name, fmt_date(next.as_of)),
                None => println!("  schedule complete"),
            }
        }
        ExecutionOutcome::Frozen { action } => {
            if inv.json {
                return print_json(&serde_json::json!({ "outcome": "frozen", "action": action }));
            }
            println!("'{path}' is held; {} not executed", action.name);
        }
        ExecutionOutcome::NotEligible { action } => {
            if inv.json {
                return print_json(&serde_json::json!({
                    "outcome": "not_eligible",
                    "action": action,
                }));
            }
            println!(
                "{} on '{path}' is not yet eligible (as of {})",
                action.name,
                fmt_date(action.as_of)
            );
        }
        ExecutionOutcome::NothingPending => {
            if inv.json {
                return print_json(&serde_json::json!({ "outcome": "nothing_pending" }));
            }
            println!("'{path}' has no pending disposition action.");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// cutoff / refresh
// ---------------------------------------------------------------------------

fn cutoff(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let pending = s.manager.cutoff_disposable_item(&mut s.ctx, &node)?;
    s.save()?;

    if inv.json {
        return print_json(&serde_json::json!({
            "node": node,
            "cut_off": true,
            "next": pending,
        }));
    }
    println!("Cut off '{}'", s.label(&node));
    match pending {
        Some(next) => println!("  next: {} (as of {})", next.name, fmt_date(next.as_of)),
        None => println!("  no pending action"),
    }
    Ok(())
}

fn refresh(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let action = s.manager.refresh_disposition_action(&mut s.ctx, &node)?;
    s.save()?;

    if inv.json {
        return print_json(&action);
    }
    let path = s.label(&node);
    match action {
        Some(action) => {
            println!("Refreshed next action for '{path}':");
            print_action(&action);
        }
        None => println!("'{path}' has no pending disposition action."),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

fn history(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let s = inv.open()?;
    let node = s.node(node)?;
    let completed = s.manager.get_completed_disposition_actions(&node);

    if inv.json {
        return print_json(&completed);
    }
    if completed.is_empty() {
        println!("No completed disposition actions.");
        return Ok(());
    }
    let rows = completed
        .iter()
        .map(|a| {
            vec![
                a.name.to_string(),
                fmt_date(a.as_of),
                fmt_date(a.completed_at),
                a.completed_by.clone().unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["STEP", "AS OF", "COMPLETED", "BY"], rows);
    Ok(())
}
