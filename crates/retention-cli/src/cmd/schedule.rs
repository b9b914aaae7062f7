use crate::output::{print_json, print_table};
use crate::session::Invocation;
use clap::{Args, Subcommand};
use retention_core::disposition::{ActionDefinitionSpec, ScheduleSpec};
use retention_core::period::Period;
use retention_core::types::{NodeId, QName};

#[derive(Subcommand)]
pub enum ScheduleSubcommand {
    /// Attach a disposition schedule to a category
    Create {
        /// Category path or id
        category: String,
        /// Disposition authority, e.g. "GRS 1.1"
        #[arg(long)]
        authority: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
        /// Dispose of individual records instead of whole folders
        #[arg(long)]
        record_level: bool,
    },
    /// Append a step to a category's schedule
    AddStep {
        /// Category path or id
        category: String,
        #[command(flatten)]
        step: StepArgs,
    },
    /// Replace the settings of a step; pending actions follow the change
    UpdateStep {
        /// Category path or id
        category: String,
        /// Step definition id
        definition: String,
        #[command(flatten)]
        step: StepArgs,
    },
    /// Remove a step from a category's schedule
    RemoveStep {
        /// Category path or id
        category: String,
        /// Step definition id
        definition: String,
    },
    /// Show the schedule governing a node
    Show {
        /// Node path or id
        node: String,
    },
}

#[derive(Args)]
pub struct StepArgs {
    /// cutoff, retain, transfer, accession or destroy
    step: String,
    #[arg(long)]
    description: Option<String>,
    /// Retention period, e.g. year|5 or monthend
    #[arg(long)]
    period: Option<Period>,
    /// Date property the period is measured from
    #[arg(long)]
    period_property: Option<QName>,
    /// Trigger event (repeatable)
    #[arg(long = "event")]
    events: Vec<String>,
    /// Eligible once any one trigger event completes
    #[arg(long)]
    first_event: bool,
}

impl From<StepArgs> for ActionDefinitionSpec {
    fn from(args: StepArgs) -> Self {
        ActionDefinitionSpec {
            name: args.step,
            description: args.description,
            period: args.period,
            period_property: args.period_property,
            events: args.events,
            eligible_on_first_complete_event: args.first_event,
        }
    }
}

pub fn run(inv: &Invocation, subcmd: ScheduleSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ScheduleSubcommand::Create {
            category,
            authority,
            instructions,
            record_level,
        } => create(
            inv,
            &category,
            ScheduleSpec {
                authority,
                instructions,
                record_level,
            },
        ),
        ScheduleSubcommand::AddStep { category, step } => add_step(inv, &category, step.into()),
        ScheduleSubcommand::UpdateStep {
            category,
            definition,
            step,
        } => update_step(inv, &category, &definition, step.into()),
        ScheduleSubcommand::RemoveStep {
            category,
            definition,
        } => remove_step(inv, &category, &definition),
        ScheduleSubcommand::Show { node } => show(inv, &node),
    }
}

// ---------------------------------------------------------------------------
// create / add-step / update-step / remove-step
// ---------------------------------------------------------------------------

fn create(inv: &Invocation, category: &str, spec: ScheduleSpec) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let category = s.node(category)?;
    let schedule = s.manager.create_disposition_schedule(&category, spec)?;
    s.save()?;

    if inv.json {
        print_json(&schedule)?;
    } else {
        println!(
            "Created {} schedule on '{}' [{}]",
            if schedule.record_level { "record-level" } else { "folder-level" },
            s.label(&category),
            schedule.id
        );
    }
    Ok(())
}

fn add_step(inv: &Invocation, category: &str, spec: ActionDefinitionSpec) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let category = s.node(category)?;
    let definition = s
        .manager
        .add_disposition_action_definition(&mut s.ctx, &category, spec)?;
    s.save()?;

    if inv.json {
        print_json(&definition)?;
    } else {
        println!(
            "Added step {} '{}' to '{}' [{}]",
            definition.index,
            definition.name,
            s.label(&category),
            definition.id
        );
    }
    Ok(())
}

fn update_step(
    inv: &Invocation,
    category: &str,
    definition: &str,
    spec: ActionDefinitionSpec,
) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let category = s.node(category)?;
    let definition = s.manager.update_disposition_action_definition(
        &mut s.ctx,
        &category,
        &NodeId::new(definition),
        spec,
    )?;
    s.save()?;

    if inv.json {
        print_json(&definition)?;
    } else {
        println!(
            "Updated step {} '{}' on '{}' [{}]",
            definition.index,
            definition.name,
            s.label(&category),
            definition.id
        );
    }
    Ok(())
}

fn remove_step(inv: &Invocation, category: &str, definition: &str) -> anyhow::Result<()> {
    let mut s = inv.open()?;
    let category = s.node(category)?;
    let definition = NodeId::new(definition);
    s.manager
        .remove_disposition_action_definition(&category, &definition)?;
    s.save()?;

    if inv.json {
        print_json(&serde_json::json!({ "removed": definition }))?;
    } else {
        println!("Removed step [{definition}] from '{}'", s.label(&category));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(inv: &Invocation, node: &str) -> anyhow::Result<()> {
    let s = inv.open()?;
    let node = s.node(node)?;
    let Some(schedule) = s.manager.get_disposition_schedule(&node) else {
        if inv.json {
            return print_json(&serde_json::Value::Null);
        }
        println!("'{}' has no disposition schedule.", s.label(&node));
        return Ok(());
    };

    if inv.json {
        return print_json(&schedule);
    }

    println!("Schedule on '{}' [{}]", s.label(&schedule.category), schedule.id);
    if let Some(authority) = &schedule.authority {
        println!("  authority: {authority}");
    }
    if let Some(instructions) = &schedule.instructions {
        println!("  instructions: {instructions}");
    }
    println!(
        "  level: {}",
        if schedule.record_level { "record" } else { "folder" }
    );
    println!();
    let rows = schedule
        .definitions
        .iter()
        .map(|d| {
            let events = if d.events.is_empty() {
                "-".to_string()
            } else {
                let join = if d.eligible_on_first_complete_event { " | " } else { " & " };
                d.events.join(join)
            };
            vec![
                d.index.to_string(),
                d.name.to_string(),
                d.period.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                d.period_property
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".into()),
                events,
                d.id.to_string(),
            ]
        })
        .collect();
    print_table(&["#", "STEP", "PERIOD", "FROM", "EVENTS", "ID"], rows);
    Ok(())
}
