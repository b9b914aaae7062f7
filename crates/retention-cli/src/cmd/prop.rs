use super::record::parse_assignment;
use crate::output::print_json;
use crate::session::Invocation;
use clap::Subcommand;
use retention_core::types::QName;

#[derive(Subcommand)]
pub enum PropSubcommand {
    /// Set a property (value type is inferred: date, bool, int or text)
    Set {
        /// Node path or id
        node: String,
        /// Assignment such as rma:dateFiled=2024-01-02
        #[arg(value_name = "QNAME=VALUE")]
        assignment: String,
    },
    /// Clear a property
    Clear {
        /// Node path or id
        node: String,
        property: String,
    },
}

pub fn run(inv: &Invocation, subcmd: PropSubcommand) -> anyhow::Result<()> {
    match subcmd {
        PropSubcommand::Set { node, assignment } => {
            let (property, value) = parse_assignment(&assignment)?;
            apply(inv, &node, property, Some(value))
        }
        PropSubcommand::Clear { node, property } => {
            let property: QName = property.parse()?;
            apply(inv, &node, property, None)
        }
    }
}

fn apply(
    inv: &Invocation,
    node: &str,
    property: QName,
    value: Option<retention_core::types::PropertyValue>,
) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let node = s.node(node)?;
    let shown = value.as_ref().map(|v| v.to_string());
    s.manager
        .set_property(&mut s.ctx, &node, property.clone(), value)?;
    s.save()?;

    let path = s.label(&node);
    if inv.json {
        print_json(&serde_json::json!({
            "node": node,
            "property": property,
            "value": shown,
        }))?;
    } else {
        match shown {
            Some(v) => println!("Set {property} = {v} on '{path}'"),
            None => println!("Cleared {property} on '{path}'"),
        }
    }
    Ok(())
}
