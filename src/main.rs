use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::bulk::{delete_many, DeletionReport, DeletionTarget};
use crate::config::{
    parse_ids, validate_max_parallel, Config, DEFAULT_API_URL, DEFAULT_PAGE_SIZE,
};
use crate::github::{GithubClient, Package, PackageRegistry, PackageVersion};
use crate::retention::{RetentionPolicy, DEFAULT_MAX_AGE_DAYS, DEFAULT_TAGS_TO_KEEP};

mod bulk;
mod config;
mod error;
mod github;
mod retention;

/// Manage the container packages of a GitHub organization.
#[derive(Parser)]
#[clap(version)]
struct Args {
    /// GitHub token used as bearer credential.
    #[clap(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to a file containing a GitHub token. Takes precedence over --token.
    #[clap(long, global = true)]
    token_file: Option<PathBuf>,

    /// User name sent as user agent.
    #[clap(long, global = true, env = "GITHUB_USER")]
    user: Option<String>,

    /// Base url of the GitHub REST API.
    #[clap(long, global = true, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Timeout of a single request in seconds.
    #[clap(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Number of items requested per page when listing.
    #[clap(long, global = true, default_value_t = DEFAULT_PAGE_SIZE)]
    per_page: u32,

    /// Make logging more verbose.
    /// You can also specify the log level via the RUST_LOG env variable.
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Container packages and their versions.
    #[clap(subcommand)]
    Packages(PackagesCommand),
}

#[derive(Subcommand)]
enum PackagesCommand {
    /// List the container packages of an organization.
    List {
        /// The owner to list packages for.
        #[clap(long)]
        owner: String,

        /// Also list the versions of every package.
        #[clap(long)]
        versions: bool,

        /// Print the result as JSON.
        #[clap(long)]
        json: bool,
    },

    /// Delete package versions by id.
    Delete {
        /// The owner of the package.
        #[clap(long)]
        owner: String,

        /// The name of the package.
        #[clap(long)]
        package: String,

        /// The (comma-separated) version ids to delete.
        #[clap(long)]
        ids: String,

        /// Maximum number of deletions in flight.
        #[clap(long, default_value_t = bulk::DEFAULT_MAX_PARALLEL_BY_ID)]
        max_parallel: usize,

        /// Print the result as JSON.
        #[clap(long)]
        json: bool,
    },

    /// Delete old package versions that carry no protected tag.
    Cleanup {
        /// The owner of the package.
        #[clap(long)]
        owner: String,

        /// The name of the package.
        #[clap(long)]
        package: String,

        /// The age (in days) after which a version may be deleted.
        #[clap(long, default_value_t = DEFAULT_MAX_AGE_DAYS)]
        max_age: i64,

        /// Regular expression matching whole tags to keep. Repeatable.
        #[clap(long = "keep", default_values = &DEFAULT_TAGS_TO_KEEP)]
        tags_to_keep: Vec<String>,

        /// Maximum number of deletions in flight.
        #[clap(long, default_value_t = bulk::DEFAULT_MAX_PARALLEL)]
        max_parallel: usize,

        /// Don't delete but only print the versions that would be deleted.
        #[clap(long, short = 'n')]
        dry_run: bool,

        /// Print the result as JSON.
        #[clap(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    if env::var("RUST_LOG").is_err() {
        let level = match args.verbose {
            true => "debug",
            false => "info",
        };
        env::set_var("RUST_LOG", format!("{}={}", env!("CARGO_PKG_NAME"), level));
    }
    env_logger::init();

    log::info!(
        "Starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );

    if let Err(error) = run(args).await {
        log::error!("{:?}", error);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let token = resolve_token(args.token, args.token_file.as_deref()).await?;
    let config = Config::new(token)?
        .with_user(args.user)
        .with_api_url(&args.api_url)?
        .with_timeout(Duration::from_secs(args.timeout))
        .with_per_page(args.per_page)?;
    log::debug!("With configuration {:?}", config);

    let Command::Packages(command) = args.command;
    match command {
        PackagesCommand::List {
            owner,
            versions,
            json,
        } => {
            let client = GithubClient::new(&config).context("Failed to create github client")?;
            let packages = client
                .list_packages(&owner)
                .await
                .context(format!("Failed to list packages of {}", owner))?;
            if !versions {
                return print(&packages, json);
            }

            let mut listing = Vec::with_capacity(packages.len());
            for package in packages {
                let package_versions = package
                    .versions(&client)
                    .await
                    .context(format!("Failed to list versions of {}/{}", owner, package))?;
                listing.push((package, package_versions));
            }
            print_listing(&listing, json)
        }
        PackagesCommand::Delete {
            owner,
            package,
            ids,
            max_parallel,
            json,
        } => {
            let ids = parse_ids(&ids)?;
            let max_parallel = validate_max_parallel(max_parallel)?;
            let client = GithubClient::new(&config).context("Failed to create github client")?;

            let report = delete_many(&client, &owner, &package, ids, max_parallel).await;
            print_report(report, json)
                .context(format!("Failed to delete versions of {}/{}", owner, package))
        }
        PackagesCommand::Cleanup {
            owner,
            package,
            max_age,
            tags_to_keep,
            max_parallel,
            dry_run,
            json,
        } => {
            let policy = RetentionPolicy::new(&tags_to_keep, max_age)?;
            let max_parallel = validate_max_parallel(max_parallel)?;
            let client = GithubClient::new(&config).context("Failed to create github client")?;
            let today = chrono::Utc::now().date_naive();

            if dry_run {
                let planned = retention::plan_cleanup(&client, &owner, &package, &policy, today)
                    .await
                    .context(format!("Failed to plan cleanup of {}/{}", owner, package))?;
                log::info!("Would delete {} versions (DRY RUN)", planned.len());
                return print_planned(&planned, json);
            }

            let report = retention::cleanup(&client, &owner, &package, &policy, max_parallel, today)
                .await
                .context(format!("Failed to clean up {}/{}", owner, package))?;
            print_report(report, json)
                .context(format!("Failed to clean up {}/{}", owner, package))
        }
    }
}

async fn resolve_token(token: Option<String>, token_file: Option<&Path>) -> Result<String> {
    match token_file {
        Some(path) => Ok(tokio::fs::read_to_string(path)
            .await
            .context(format!(
                "Failed to read the github token from {}",
                path.display()
            ))?
            .trim()
            .to_string()),
        None => token.context("No github token provided via --token, --token-file or GITHUB_TOKEN"),
    }
}

/// Single-line terminal rendering of a listed or deleted item.
trait Line {
    fn line(&self) -> String;
}

impl Line for u64 {
    fn line(&self) -> String {
        self.to_string()
    }
}

impl Line for Package {
    fn line(&self) -> String {
        self.summary()
    }
}

impl Line for PackageVersion {
    fn line(&self) -> String {
        self.summary()
    }
}

fn print<T: Serialize + Line>(items: &[T], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", item.line());
        }
    }
    Ok(())
}

fn print_listing(listing: &[(Package, Vec<PackageVersion>)], json: bool) -> Result<()> {
    if json {
        let value: Vec<Value> = listing
            .iter()
            .map(|(package, versions)| json!({ "package": package, "versions": versions }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for (package, versions) in listing {
            println!("{}", package.line());
            for version in versions {
                println!("  {}", version.line());
            }
        }
    }
    Ok(())
}

/// `{"planned": [...]}`
fn planned_json(planned: &[PackageVersion]) -> Value {
    json!({ "planned": planned })
}

fn print_planned(planned: &[PackageVersion], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&planned_json(planned))?);
    } else {
        for version in planned {
            println!("planned: {}", version.line());
        }
    }
    Ok(())
}

/// `{"deleted": [...], "errors": {"<id>": "<message>"}}`
fn report_json<T: Serialize + DeletionTarget>(report: &DeletionReport<T>) -> Value {
    let errors: Map<String, Value> = report
        .failed
        .iter()
        .map(|(target, error)| (target.version_id().to_string(), Value::String(error.to_string())))
        .collect();
    json!({ "deleted": report.deleted, "errors": errors })
}

/// Prints both outcomes of a batch, then fails if any deletion failed.
fn print_report<T>(report: DeletionReport<T>, json: bool) -> Result<()>
where
    T: Serialize + DeletionTarget + Line,
{
    if json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        for target in &report.deleted {
            println!("deleted: {}", target.line());
        }
        for (target, error) in &report.failed {
            println!("error: {}: {}", target.version_id(), error);
        }
    }

    report.into_result()?;
    Ok(())
}
