use crate::output::{print_json, print_table};
use crate::session::Invocation;
use clap::Subcommand;
use retention_core::security::ProtectedArtifact;
use retention_core::types::QName;

#[derive(Subcommand)]
pub enum SecuritySubcommand {
    /// List protected properties and aspects
    List,
    /// Check whether the acting user may edit a property or aspect on a node
    Check {
        /// Node path or id
        node: String,
        /// Property or aspect name, e.g. rma:cutOffDate
        name: QName,
        /// Treat the name as an aspect
        #[arg(long)]
        aspect: bool,
    },
}

pub fn run(inv: &Invocation, subcmd: SecuritySubcommand) -> anyhow::Result<()> {
    match subcmd {
        SecuritySubcommand::List => list(inv),
        SecuritySubcommand::Check { node, name, aspect } => check(inv, &node, &name, aspect),
    }
}

fn artifact_row(kind: &str, artifact: &ProtectedArtifact) -> Vec<String> {
    let caps: Vec<&str> = artifact.capabilities.iter().map(|c| c.as_str()).collect();
    vec![
        artifact.name.to_string(),
        kind.to_string(),
        caps.join(", "),
        if artifact.always_allow_new { "yes" } else { "no" }.to_string(),
    ]
}

fn list(inv: &Invocation) -> anyhow::Result<()> {
    let s = inv.open()?;
    let security = s.manager.security();

    if inv.json {
        let properties: Vec<_> = security.protected_properties().collect();
        let aspects: Vec<_> = security.protected_aspects().collect();
        return print_json(&serde_json::json!({
            "enabled": security.is_enabled(),
            "properties": properties,
            "aspects": aspects,
        }));
    }

    if !security.is_enabled() {
        println!("Model security is disabled.");
    }
    let rows = security
        .protected_properties()
        .map(|a| artifact_row("property", a))
        .chain(security.protected_aspects().map(|a| artifact_row("aspect", a)))
        .collect();
    print_table(&["NAME", "KIND", "CAPABILITIES", "NEW"], rows);
    Ok(())
}

fn check(inv: &Invocation, node: &str, name: &QName, aspect: bool) -> anyhow::Result<()> {
    let s = inv.open()?;
    let node = s.node(node)?;
    let security = s.manager.security();
    let (protected, allowed) = if aspect {
        (
            security.is_protected_aspect(name),
            s.manager.can_edit_protected_aspect(&s.ctx, &node, name),
        )
    } else {
        (
            security.is_protected_property(name),
            s.manager.can_edit_protected_property(&s.ctx, &node, name),
        )
    };

    if inv.json {
        return print_json(&serde_json::json!({
            "node": node,
            "name": name,
            "user": s.ctx.user(),
            "protected": protected,
            "allowed": allowed,
        }));
    }

    let path = s.label(&node);
    if !protected {
        println!("{name} is not protected; anyone may edit it on '{path}'");
    } else if allowed {
        println!("{} may edit {name} on '{path}'", s.ctx.user());
    } else {
        println!("{} may not edit {name} on '{path}'", s.ctx.user());
    }
    Ok(())
}
