use clap::{Parser, Subcommand};

/// CLI entry point so operators can drive the audit from the command line.
/// Exit codes: 0=success, 2=invalid arguments, 3=configuration or state error
#[derive(Parser, Debug)]
#[command(name = "linkaudit")]
#[command(about = "Resumable broken-link audit across a managed account hierarchy")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one invocation: start, resume, or skip the current audit cycle.
    Run {
        #[arg(
            short,
            long,
            default_value = "./data",
            help = "Directory for durable state, results, and logs"
        )]
        data_dir: String,

        #[arg(short, long, help = "Account inventory JSON file")]
        inventory: String,

        #[arg(
            short,
            long,
            help = "Audit options JSON file (built-in defaults when omitted)"
        )]
        options: Option<String>,

        #[arg(
            short,
            long,
            default_value = "1800",
            help = "Wall-clock budget for this invocation in seconds"
        )]
        budget_secs: u64,

        #[arg(
            short,
            long,
            default_value = "LinkAudit/1.0",
            help = "User agent string for URL checks"
        )]
        user_agent: String,

        #[arg(
            long,
            help = "Daily request quota; checks beyond it stop the invocation"
        )]
        daily_budget: Option<i64>,

        #[arg(long, help = "Preview: no durable marks, no marker creation")]
        preview: bool,
    },

    /// Show the persisted cycle status and result counts.
    Status {
        #[arg(
            short,
            long,
            default_value = "./data",
            help = "Directory containing audit state"
        )]
        data_dir: String,

        #[arg(short, long, help = "Audit options JSON file, for the valid-code set")]
        options: Option<String>,
    },

    /// Discard every checkpoint mark and the cycle metadata.
    Reset {
        #[arg(
            short,
            long,
            default_value = "./data",
            help = "Directory containing audit state"
        )]
        data_dir: String,
    },
}

impl Cli {
    /// On error, clap prints help and exits with code 2 (usage error).
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
