use crate::output::{fmt_date, print_json};
use crate::session::Invocation;
use clap::Subcommand;
use retention_core::model::PROP_REVIEW_AS_OF;
use retention_core::period::Period;
use retention_core::NodeStore;

#[derive(Subcommand)]
pub enum VitalSubcommand {
    /// Show the vital record definition and review date of a node
    Show {
        /// Node path or id
        node: String,
    },
    /// Set the vital record definition of a category or folder
    Set {
        /// Category or folder path or id
        node: String,
        /// Review period, e.g. month|6
        period: Period,
        /// Record the period but turn vital review off
        #[arg(long)]
        disable: bool,
    },
    /// Mark a vital record reviewed and start the next cycle
    Review {
        /// Record path or id
        node: String,
    },
}

pub fn run(inv: &Invocation, subcmd: VitalSubcommand) -> anyhow::Result<()> {
    match subcmd {
        VitalSubcommand::Show { node } => show(inv, &node),
        VitalSubcommand::Set {
            node,
            period,
            disable,
        } => set(inv, &node, !disable, period),
        VitalSubcommand::Review { node } => review(inv, &node),
    }
}

fn show(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let s = inv.open()?;
    let node = s.node(node)?;
    let definition = s.manager.get_vital_record_definition(&node)?;
    let vital = s.manager.is_vital_record(&node);
    let review_as_of = s.manager.store().date_property(&node, &PROP_REVIEW_AS_OF);

    if inv.json {
        return print_json(&serde_json::json!({
            "node": node,
            "definition": definition,
            "vital": vital,
            "review_as_of": review_as_of,
        }));
    }

    println!("{}", s.label(&node));
    match definition {
        Some(d) => {
            println!("  vital: {}", if d.enabled { "yes" } else { "no" });
            println!("  review period: {}", d.review_period);
        }
        None => println!("  no vital record definition"),
    }
    if review_as_of.is_some() {
        println!("  next review: {}", fmt_date(review_as_of));
    }
    Ok(())
}

fn set(inv: &Invocation, node: &str, enabled: bool, period: Period) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let definition = s
        .manager
        .set_vital_record_definition(&mut s.ctx, &node, enabled, period)?;
    s.save()?;

    if inv.json {
        print_json(&serde_json::json!({ "node": node, "definition": definition }))?;
    } else {
        println!(
            "Vital record review on '{}': {} ({})",
            s.label(&node),
            if definition.enabled { "on" } else { "off" },
            definition.review_period
        );
    }
    Ok(())
}

fn review(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let next = s.manager.review_vital_record(&mut s.ctx, &node)?;
    s.save()?;

    if inv.json {
        print_json(&serde_json::json!({ "node": node, "review_as_of": next }))?;
    } else {
        println!("Reviewed '{}'; next review {}", s.label(&node), fmt_date(Some(next)));
    }
    Ok(())
}
