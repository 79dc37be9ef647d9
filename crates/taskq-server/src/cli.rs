use clap::{Parser, Subcommand, ValueEnum};
use taskq::TaskFilter;

/// taskq server and operator tooling.
///
/// Connection and tuning settings come from `TASKQ_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "taskq-server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the dispatcher and admin HTTP until interrupted (default)
    Serve,

    /// Process every pending task once and exit
    Drain,

    /// Enqueue a task
    Enqueue {
        task_type: String,

        /// JSON payload
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// List tasks
    List {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,

        #[arg(long)]
        task_type: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Return a quarantined task to the pending set
    ClearError { id: i64 },

    /// Delete a task, pending or quarantined
    Delete { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    All,
    Pending,
    Quarantined,
}

impl From<FilterArg> for TaskFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => TaskFilter::All,
            FilterArg::Pending => TaskFilter::Pending,
            FilterArg::Quarantined => TaskFilter::Quarantined,
        }
    }
}
