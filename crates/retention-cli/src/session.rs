use anyhow::Context;
use chrono::{DateTime, Utc};
use retention_core::config::Config;
use retention_core::types::{NodeId, NodeKind};
use retention_core::{InMemoryStore, NodeStore, OperationContext, RecordsManager};
use std::path::PathBuf;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub root: PathBuf,
    pub user: String,
    pub at: Option<DateTime<Utc>>,
    pub json: bool,
}

impl Invocation {
    /// The operation context for the acting user. A system context is
    /// never handed out here, whatever the user is called; "System" is
    /// checked against the capability grants like any other name.
    pub fn context(&self) -> OperationContext {
        let ctx = OperationContext::new(&self.user);
        match self.at {
            Some(at) => ctx.at(at),
            None => ctx,
        }
    }

    pub fn open(&self) -> anyhow::Result<Session> {
        Session::open(self)
    }
}

/// A loaded project: config, node store and the manager over them.
pub struct Session {
    root: PathBuf,
    pub config: Config,
    pub manager: RecordsManager<InMemoryStore>,
    pub ctx: OperationContext,
}

impl Session {
    pub fn open(inv: &Invocation) -> anyhow::Result<Self> {
        let config = Config::load(&inv.root).context("failed to load config")?;
        let store = InMemoryStore::load(&inv.root).context("failed to load store")?;
        let manager =
            RecordsManager::from_config(store, &config).context("invalid configuration")?;
        Ok(Session {
            root: inv.root.clone(),
            config,
            manager,
            ctx: inv.context(),
        })
    }

    /// Resolve a node id or a file plan path such as `Legal/Case 42`.
    pub fn node(&self, reference: &str) -> anyhow::Result<NodeId> {
        self.manager
            .resolve(reference)
            .with_context(|| format!("node '{reference}' not found"))
    }

    /// Resolve a hold by name or id.
    pub fn hold(&self, reference: &str) -> anyhow::Result<NodeId> {
        self.manager
            .get_hold(reference)
            .or_else(|| {
                let id = NodeId::new(reference);
                (self.manager.store().kind(&id) == Some(NodeKind::Hold)).then_some(id)
            })
            .with_context(|| format!("hold '{reference}' not found"))
    }

    pub fn file_plan(&self) -> anyhow::Result<NodeId> {
        self.manager
            .file_plan()
            .context("no file plan found; run 'rmctl init'")
    }

    /// The path of a node for display, falling back to its id.
    pub fn label(&self, node: &NodeId) -> String {
        match self.manager.path_of(node) {
            Some(path) if !path.is_empty() => path,
            _ => self
                .manager
                .store()
                .name(node)
                .unwrap_or_else(|| node.to_string()),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.manager
            .store()
            .save(&self.root)
            .context("failed to write store.yaml")
    }

    /// Persist the event registry back into the config.
    pub fn save_events(&mut self) -> anyhow::Result<()> {
        let (types, events) = self.manager.events().to_config();
        self.config.events.types = types;
        self.config.events.events = events;
        self.config
            .save(&self.root)
            .context("failed to write config.yaml")
    }
}
