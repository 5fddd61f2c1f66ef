use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "topthree", version, about = "Three priorities a day, and a backlog for the rest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an item to a day or the backlog
    Add {
        /// Item title
        title: String,
        /// Day as YYYY-MM-DD (omit for the backlog)
        #[arg(long, conflicts_with_all = ["today", "tomorrow"])]
        day: Option<String>,
        /// Add to today
        #[arg(long, conflicts_with = "tomorrow")]
        today: bool,
        /// Add to tomorrow
        #[arg(long)]
        tomorrow: bool,
    },
    /// List a day's items (today by default) or the backlog
    List {
        /// Day as YYYY-MM-DD, "today" or "tomorrow"
        #[arg(long, conflicts_with = "backlog")]
        day: Option<String>,
        /// List the backlog instead
        #[arg(long)]
        backlog: bool,
    },
    /// Move an item to a day
    Move {
        /// Item ID
        id: String,
        /// Day as YYYY-MM-DD, "today" or "tomorrow"
        day: String,
    },
    /// Move an item to the backlog
    Backlog {
        /// Item ID
        id: String,
    },
    /// Move an item to tomorrow
    Punt {
        /// Item ID
        id: String,
    },
    /// Rank a day's items; the first ID becomes the top priority
    Reorder {
        /// Day the items belong to
        day: String,
        /// Item IDs in priority order
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Toggle an item's completion
    Toggle {
        /// Item ID
        id: String,
    },
    /// Delete an item
    Delete {
        /// Item ID
        id: String,
    },
    /// Rename an item
    Rename {
        /// Item ID
        id: String,
        /// New title
        title: String,
    },
    /// Set or clear an item's notes
    Notes {
        /// Item ID
        id: String,
        /// New notes (omit to clear)
        notes: Option<String>,
    },
    /// Enforce the daily limit and renumber every day
    Repair,
    /// Copy unfinished past items into the backlog
    Carry,
    /// Show streak, stats, achievements and today's risk
    Streak,
    /// Spend a freeze token
    Freeze,
    /// Book a calendar slot for an item on its day
    Schedule {
        /// Item ID
        id: String,
        /// Duration in minutes (default from config)
        #[arg(long)]
        duration: Option<u32>,
        /// Start as HH:MM (default: first free slot)
        #[arg(long)]
        start: Option<String>,
        /// Show the proposal without booking it
        #[arg(long)]
        dry_run: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Google Calendar credentials
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("TOPTHREE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Add {
            title,
            day,
            today,
            tomorrow,
        } => commands::items::add(&title, day.as_deref(), today, tomorrow),
        Commands::List { day, backlog } => commands::items::list(day.as_deref(), backlog),
        Commands::Move { id, day } => commands::items::move_to_day(&id, &day),
        Commands::Backlog { id } => commands::items::move_to_backlog(&id),
        Commands::Punt { id } => commands::items::punt(&id),
        Commands::Reorder { day, ids } => commands::items::reorder(&day, &ids),
        Commands::Toggle { id } => commands::items::toggle(&id),
        Commands::Delete { id } => commands::items::delete(&id),
        Commands::Rename { id, title } => commands::items::rename(&id, &title),
        Commands::Notes { id, notes } => commands::items::notes(&id, notes.as_deref()),
        Commands::Repair => commands::items::repair(),
        Commands::Carry => commands::items::carry(),
        Commands::Streak => commands::streak::summary(),
        Commands::Freeze => commands::streak::freeze(),
        Commands::Schedule {
            id,
            duration,
            start,
            dry_run,
        } => commands::schedule::run(&id, duration, start.as_deref(), dry_run),
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
