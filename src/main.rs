mod app;
mod config;
mod digest;
mod domain;
mod github;
mod mail;
mod recency;
mod timephrase;

use std::{
    io::{self, Write},
    process::ExitCode,
};

use app::{APP_NAME, ReminderApp, ReminderError};
use clap::{Args, Parser, Subcommand, error::ErrorKind};
use config::{DEFAULT_NEAR_DISTANCE, DEFAULT_SEARCH_DISTANCE, ReminderConfig};
use domain::{Credentials, DigestFormat, IssueScope};
use github::{DEFAULT_API_URL, GitHubClient};
use mail::LocalRelay;
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: u8 = 1;
const EXIT_UNKNOWN_SUBCOMMAND: u8 = 2;
const EXIT_FAILURE: u8 = 3;

#[derive(Parser)]
#[command(name = APP_NAME, version, about = "Reminders for GitHub issues waiting on you")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue reminders
    IssueReminders(IssueRemindersArgs),
}

#[derive(Args)]
struct IssueRemindersArgs {
    /// Username
    #[arg(long)]
    username: String,

    /// Password or personal access token
    #[arg(long)]
    password: String,

    /// Time range to look for activity
    #[arg(long, default_value = DEFAULT_SEARCH_DISTANCE)]
    search_distance: String,

    /// Time range to consider updates too recent to remind
    #[arg(long, default_value = DEFAULT_NEAR_DISTANCE)]
    near_distance: String,

    /// Send to the given email using an unauthenticated local SMTP server
    #[arg(long)]
    email: Option<String>,

    /// Print HTML-formatted table
    #[arg(long, conflicts_with = "plain")]
    html: bool,

    /// Print one plain line per issue
    #[arg(long)]
    plain: bool,

    /// Only issues assigned to you
    #[arg(long, conflicts_with = "queries")]
    assigned: bool,

    /// Search query, repeatable; `{{.username}}` is replaced with the username
    #[arg(long = "query", value_name = "QUERY")]
    queries: Vec<String>,

    /// GitHub API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,
}

impl IssueRemindersArgs {
    fn into_config(self) -> ReminderConfig {
        let format = if self.html {
            DigestFormat::Html
        } else if self.plain {
            DigestFormat::Plain
        } else {
            DigestFormat::Text
        };
        let scope = if self.assigned {
            IssueScope::Assigned
        } else {
            IssueScope::All
        };
        let selection = config::issue_selection(scope, &self.queries, &self.username);

        ReminderConfig {
            credentials: Credentials {
                username: self.username,
                password: self.password,
            },
            api_url: self.api_url,
            search_distance: self.search_distance,
            near_distance: self.near_distance,
            email: self.email.filter(|email| !email.trim().is_empty()),
            format,
            selection,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(parse_failure_code(err.kind()));
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            let _ = report_failure(&err, &mut io::stderr().lock());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Prints the run error whatever the log filter, so a failed run is never silent.
fn report_failure(err: &ReminderError, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "{APP_NAME}: {err}")
}

fn run(cli: Cli) -> Result<(), ReminderError> {
    match cli.command {
        Commands::IssueReminders(args) => issue_reminders(args.into_config()),
    }
}

fn issue_reminders(config: ReminderConfig) -> Result<(), ReminderError> {
    let client = GitHubClient::new(&config.api_url, config.credentials.clone())?;
    let relay = LocalRelay::new();
    let mut stdout = io::stdout().lock();
    ReminderApp::new(&config, &client, &relay).run(&mut stdout)?;
    Ok(())
}

fn parse_failure_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::InvalidSubcommand
        | ErrorKind::MissingSubcommand
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => EXIT_UNKNOWN_SUBCOMMAND,
        _ => EXIT_USAGE,
    }
}
