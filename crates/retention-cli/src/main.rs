use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use retention_cli::cmd::{
    self, category::CategorySubcommand, config::ConfigSubcommand,
    disposition::DispositionSubcommand, event::EventSubcommand, folder::FolderSubcommand,
    hold::HoldSubcommand, node::NodeSubcommand, prop::PropSubcommand, record::RecordSubcommand,
    schedule::ScheduleSubcommand, security::SecuritySubcommand, vital::VitalSubcommand,
};
use retention_cli::root;
use retention_cli::session::Invocation;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rmctl",
    about = "Records retention lifecycle: file plans, disposition schedules, holds and vital records",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .retention/)
    #[arg(long, global = true, env = "RMCTL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Act as this user; every name, "System" included, gets only its
    /// configured capability grants
    #[arg(long, global = true, env = "RMCTL_USER", default_value = "admin")]
    user: String,

    /// Fix the current time (RFC 3339), for replays and scripted runs
    #[arg(long, global = true, env = "RMCTL_AT")]
    at: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a file plan in the current directory
    Init {
        /// File plan name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Manage record categories
    Category {
        #[command(subcommand)]
        subcommand: CategorySubcommand,
    },

    /// Manage record folders
    Folder {
        #[command(subcommand)]
        subcommand: FolderSubcommand,
    },

    /// File records
    Record {
        #[command(subcommand)]
        subcommand: RecordSubcommand,
    },

    /// Inspect nodes
    Node {
        #[command(subcommand)]
        subcommand: NodeSubcommand,
    },

    /// Set and clear node properties
    Prop {
        #[command(subcommand)]
        subcommand: PropSubcommand,
    },

    /// Manage disposition schedules
    Schedule {
        #[command(subcommand)]
        subcommand: ScheduleSubcommand,
    },

    /// Drive the disposition lifecycle of records and folders
    Disposition {
        #[command(subcommand)]
        subcommand: DispositionSubcommand,
    },

    /// Manage holds
    Hold {
        #[command(subcommand)]
        subcommand: HoldSubcommand,
    },

    /// Manage vital record review
    Vital {
        #[command(subcommand)]
        subcommand: VitalSubcommand,
    },

    /// Manage disposition events
    Event {
        #[command(subcommand)]
        subcommand: EventSubcommand,
    },

    /// Check protected property and aspect access
    Security {
        #[command(subcommand)]
        subcommand: SecuritySubcommand,
    },

    /// Validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let inv = Invocation {
        root: root::resolve_root(cli.root.as_deref()),
        user: cli.user,
        at: cli.at,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&inv, name.as_deref()),
        Commands::Category { subcommand } => cmd::category::run(&inv, subcommand),
        Commands::Folder { subcommand } => cmd::folder::run(&inv, subcommand),
        Commands::Record { subcommand } => cmd::record::run(&inv, subcommand),
        Commands::Node { subcommand } => cmd::node::run(&inv, subcommand),
        Commands::Prop { subcommand } => cmd::prop::run(&inv, subcommand),
        Commands::Schedule { subcommand } => cmd::schedule::run(&inv, subcommand),
        Commands::Disposition { subcommand } => cmd::disposition::run(&inv, subcommand),
        Commands::Hold { subcommand } => cmd::hold::run(&inv, subcommand),
        Commands::Vital { subcommand } => cmd::vital::run(&inv, subcommand),
        Commands::Event { subcommand } => cmd::event::run(&inv, subcommand),
        Commands::Security { subcommand } => cmd::security::run(&inv, subcommand),
        Commands::Config { subcommand } => cmd::config::run(&inv, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
