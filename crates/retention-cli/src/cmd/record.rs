use crate::output::{fmt_date, print_json};
use crate::session::Invocation;
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use retention_core::model::{PROP_DATE_FILED, PROP_ORIGINATOR};
use retention_core::types::{Properties, PropertyValue, QName};
use retention_core::NodeStore;

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// File a new record in a folder
    File {
        /// Folder path or id
        folder: String,
        name: String,
        /// Originator of the record
        #[arg(long)]
        originator: Option<String>,
        /// Filing date (default: now)
        #[arg(long)]
        date_filed: Option<DateTime<Utc>>,
        /// Extra property (repeatable: --prop rma:location=Basement)
        #[arg(long = "prop", value_name = "QNAME=VALUE")]
        props: Vec<String>,
    },
}

pub fn run(inv: &Invocation, subcmd: RecordSubcommand) -> anyhow::Result<()> {
    match subcmd {
        RecordSubcommand::File {
            folder,
            name,
            originator,
            date_filed,
            props,
        } => file(inv, &folder, &name, originator, date_filed, &props),
    }
}

/// Parse `qname=value`, inferring the value type.
pub(crate) fn parse_assignment(raw: &str) -> anyhow::Result<(QName, PropertyValue)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("expected QNAME=VALUE, got '{raw}'"))?;
    let name: QName = name.trim().parse()?;
    Ok((name, PropertyValue::infer(value)))
}

fn file(
    inv: &Invocation,
    folder: &str,
    name: &str,
    originator: Option<String>,
    date_filed: Option<DateTime<Utc>>,
    props: &[String],
) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let folder = s.node(folder)?;

    let mut properties = Properties::new();
    for raw in props {
        let (name, value) = parse_assignment(raw)?;
        properties.insert(name, value);
    }
    if let Some(originator) = originator {
        properties.insert(PROP_ORIGINATOR, originator.into());
    }
    if let Some(date) = date_filed {
        properties.insert(PROP_DATE_FILED, date.into());
    }

    let record = s
        .manager
        .file_record(&mut s.ctx, &folder, name, properties)?;
    s.save()?;

    let path = s.label(&record);
    let store = s.manager.store();
    let filed = store.date_property(&record, &PROP_DATE_FILED);
    let vital = s.manager.is_vital_record(&record);
    let next = s.manager.get_next_disposition_action(&record);
    if inv.json {
        print_json(&serde_json::json!({
            "id": record,
            "path": path,
            "date_filed": filed,
            "vital": vital,
            "next_action": next,
        }))?;
    } else {
        println!("Filed record '{path}' [{record}]");
        println!("  filed: {}", fmt_date(filed));
        if vital {
            println!("  vital record");
        }
        if let Some(action) = next {
            println!("  next action: {} (as of {})", action.name, fmt_date(action.as_of));
        }
    }
    Ok(())
}
