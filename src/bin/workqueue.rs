//! workqueue CLI: operator interface to a work-queue database.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use serde::Serialize;
use workqueue::config::Config;
use workqueue::db::Db;
use workqueue::engine::WorkQueue;
use workqueue::model::{Element, ElementId, ElementRequest, Status};
use workqueue::telemetry::{TelemetryConfig, init_telemetry};
use workqueue::validate;

#[derive(Parser)]
#[command(name = "workqueue", about = "Distribute work-queue elements to agents")]
struct Cli {
    /// TOML file with max_retries, stale_after_secs and retention_secs
    #[arg(long, global = true)]
    policy: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the schema
    Migrate,
    /// Drop every work-queue table
    Destroy {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },
    /// Create elements for a job specification
    Ingest {
        spec: String,
        /// `jobs:priority`, `block:jobs:priority` or `block:parent:jobs:priority`
        #[arg(long = "element", required = true, value_parser = parse_request)]
        elements: Vec<ElementRequest>,
    },
    /// List elements in one status
    List {
        #[arg(long, default_value = "Available", value_parser = parse_status)]
        status: Status,
    },
    /// List the elements of a job specification
    Spec { name: String },
    /// Claim elements for a subscription
    Acquire {
        #[arg(long)]
        subscription: String,
        #[arg(long, default_value_t = 1)]
        max: u32,
        #[arg(long, default_value_t = 0)]
        min_priority: i64,
    },
    /// Report on an acquired element
    Report {
        #[arg(value_parser = parse_element_id)]
        id: ElementId,
        outcome: Outcome,
    },
    /// Cancel an element
    Cancel {
        #[arg(value_parser = parse_element_id)]
        id: ElementId,
    },
    /// Change an element's priority
    Priority {
        #[arg(value_parser = parse_element_id)]
        id: ElementId,
        priority: i64,
    },
    /// Bind an element to a subscription (created if missing)
    Bind {
        #[arg(value_parser = parse_element_id)]
        id: ElementId,
        subscription: String,
    },
    /// Show the subscriptions bound to an element
    Subscriptions {
        #[arg(value_parser = parse_element_id)]
        id: ElementId,
    },
    /// Record that `child` derives from `parent`
    Parent { child: String, parent: String },
    /// Show the ancestors (or descendants) of a block
    Lineage {
        block: String,
        #[arg(long)]
        descendants: bool,
    },
    /// List elements stuck in a status
    Stale {
        #[arg(long, default_value = "Running", value_parser = parse_status)]
        status: Status,
        /// Defaults to the policy's stale_after
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
    /// Delete settled elements past the retention window
    Purge,
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Progress,
    Done,
    Failure,
    Decline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.policy.as_deref())?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workqueue".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.health_check().await?;
    if !matches!(cli.command, Command::Destroy { .. }) {
        db.migrate().await?;
    }
    let queue = WorkQueue::new(db, config.policy);
    let out = Output { json: cli.json };

    match cli.command {
        Command::Migrate => {
            println!("schema up to date ({})", queue.db().dialect());
        }
        Command::Destroy { yes } => {
            if !yes {
                anyhow::bail!("refusing to drop tables without --yes");
            }
            queue.db().destroy().await?;
            println!("schema dropped");
        }
        Command::Ingest { spec, elements } => {
            let ids = queue.ingest(&spec, &elements).await?;
            let ids: Vec<i64> = ids.into_iter().map(|id| id.0).collect();
            out.value(&ids, || format!("{} element(s) created: {ids:?}", ids.len()))?;
        }
        Command::List { status } => {
            out.elements(&queue.store().list_by_status(status, None).await?)?;
        }
        Command::Spec { name } => {
            out.elements(&queue.store().by_spec(&name, None).await?)?;
        }
        Command::Acquire {
            subscription,
            max,
            min_priority,
        } => {
            let subscription = queue.binder().create(&subscription).await?;
            let acquired = queue.acquire(subscription.id, max, min_priority).await?;
            out.elements(&acquired)?;
        }
        Command::Report { id, outcome } => {
            let mutator = queue.mutator();
            let element = match outcome {
                Outcome::Progress => mutator.report_progress(id).await?,
                Outcome::Done => mutator.report_done(id).await?,
                Outcome::Failure => mutator.report_failure(id).await?,
                Outcome::Decline => mutator.decline(id).await?,
            };
            out.elements(&[element])?;
        }
        Command::Cancel { id } => {
            out.elements(&[queue.mutator().cancel(id).await?])?;
        }
        Command::Priority { id, priority } => {
            out.elements(&[queue.mutator().set_priority(id, priority).await?])?;
        }
        Command::Bind { id, subscription } => {
            let subscription = queue.binder().create(&subscription).await?;
            queue.binder().bind(id, subscription.id, None).await?;
            println!("element {id} bound to {}", subscription.name);
        }
        Command::Subscriptions { id } => {
            let subscriptions = queue.binder().subscriptions_for(id, None).await?;
            let names: Vec<&str> = subscriptions.iter().map(|s| s.name.as_str()).collect();
            out.value(&subscriptions, || names.join("\n"))?;
        }
        Command::Parent { child, parent } => {
            queue.lineage().record_parentage(&child, &parent, None).await?;
            println!("{child} -> {parent}");
        }
        Command::Lineage { block, descendants } => {
            let names = if descendants {
                queue.lineage().descendants_of(&block).await?
            } else {
                queue.lineage().ancestors_of(&block).await?
            };
            out.value(&names, || {
                names.iter().cloned().collect::<Vec<_>>().join("\n")
            })?;
        }
        Command::Stale {
            status,
            older_than_secs,
        } => {
            let window = older_than_secs
                .map(std::time::Duration::from_secs)
                .or(queue.policy().stale_after)
                .ok_or_else(|| {
                    anyhow::anyhow!("pass --older-than-secs or configure stale_after_secs")
                })?;
            out.elements(&queue.store().stale(status, window).await?)?;
        }
        Command::Purge => {
            let purged = queue.purge_expired().await?;
            out.value(&purged, || format!("{purged} element(s) purged"))?;
        }
    }

    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn value<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }

    fn elements(&self, elements: &[Element]) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(elements)?);
            return Ok(());
        }
        if elements.is_empty() {
            println!("No elements found.");
            return Ok(());
        }

        println!(
            "{:<8}  {:<20}  {:<11}  {:<4}  {:<5}  {:<30}  UPDATED",
            "ID", "SPEC", "STATUS", "PRI", "RETRY", "BLOCK"
        );
        println!("{}", "-".repeat(100));
        for element in elements {
            println!(
                "{:<8}  {:<20}  {:<11}  {:<4}  {:<5}  {:<30}  {}",
                element.id,
                element.spec_name,
                element.status,
                element.priority,
                element.retry_count,
                element.block_name.as_deref().unwrap_or("-"),
                element.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        println!("\n{} element(s)", elements.len());
        Ok(())
    }
}

fn parse_element_id(value: &str) -> Result<ElementId, String> {
    validate::element_id(value).map_err(|e| e.to_string())
}

fn parse_status(value: &str) -> Result<Status, String> {
    value.parse().map_err(|e: workqueue::error::Error| e.to_string())
}

/// `jobs:priority`, `block:jobs:priority` or `block:parent:jobs:priority`.
fn parse_request(value: &str) -> Result<ElementRequest, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let number = |raw: &str, what: &str| {
        raw.parse::<i64>()
            .map_err(|_| format!("{what} must be an integer, got {raw:?}"))
    };
    let (blocks, tail) = match parts.len() {
        2..=4 => parts.split_at(parts.len() - 2),
        _ => return Err(format!("expected [block[:parent]:]jobs:priority, got {value:?}")),
    };
    let mut request = ElementRequest::new(number(tail[0], "jobs")?, number(tail[1], "priority")?);
    if let Some(block) = blocks.first() {
        request = request.block(*block);
    }
    if let Some(parent) = blocks.get(1) {
        request = request.parent(*parent);
    }
    Ok(request)
}
