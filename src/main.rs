use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use docflow::{
    config,
    db,
    ledger::ReconciliationReport,
    DocumentEngine, TenantContext,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg);

    match cli.command {
        Commands::Migrate => {
            let pool = db::establish_connection_from_app_config(&cfg)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool)
                .await
                .context("failed running migrations")?;
            info!("migrations applied");
        }
        Commands::RefreshOverdue(args) => {
            let (engine, worker) = DocumentEngine::from_config(&cfg).await?;
            let ctx = args.scope.context()?;
            let updated = engine
                .parties
                .refresh_overdue(&ctx, args.as_of)
                .await
                .context("failed to refresh overdue balances")?;
            if cli.json {
                print_json(&serde_json::json!({ "updated_parties": updated }))?;
            } else {
                println!("Updated overdue balance of {} parties", updated);
            }
            shutdown(engine, worker).await;
        }
        Commands::Reconcile(args) => {
            let (engine, worker) = DocumentEngine::from_config(&cfg).await?;
            let ctx = args.scope.context()?;
            let party_ids = match args.party_id {
                Some(id) => vec![id],
                None => engine
                    .parties
                    .list(&ctx)
                    .await
                    .context("failed to list parties")?
                    .into_iter()
                    .map(|party| party.id)
                    .collect(),
            };

            let mut reports = Vec::with_capacity(party_ids.len());
            for party_id in party_ids {
                let report = engine
                    .parties
                    .reconcile(&ctx, party_id)
                    .await
                    .with_context(|| format!("failed to reconcile party {}", party_id))?;
                reports.push(report);
            }
            render_reconciliation(&reports, cli.json)?;
            shutdown(engine, worker).await;
        }
    }

    Ok(())
}

/// Drops the engine so the audit worker drains its queue and stops.
async fn shutdown(engine: DocumentEngine, worker: Option<tokio::task::JoinHandle<()>>) {
    drop(engine);
    if let Some(worker) = worker {
        if let Err(err) = worker.await {
            warn!(error = %err, "audit worker ended abnormally");
        }
    }
}

fn render_reconciliation(reports: &[ReconciliationReport], json: bool) -> Result<()> {
    if json {
        return print_json(&reports);
    }
    let drifting: Vec<_> = reports.iter().filter(|r| !r.is_consistent()).collect();
    for report in &drifting {
        println!(
            "party {}: recorded {} computed {} drift {}",
            report.party_id, report.recorded, report.computed, report.drift
        );
    }
    println!(
        "{} parties checked, {} with drift",
        reports.len(),
        drifting.len()
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(name = "docflow", about = "Maintenance commands for the document engine", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Recompute overdue amounts of every party in a company
    RefreshOverdue(RefreshOverdueArgs),
    /// Compare stored party balances with their open obligations
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Tenant identifier")]
    tenant_id: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Company identifier")]
    company_id: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Acting user identifier")]
    user_id: Uuid,
}

impl ScopeArgs {
    fn context(&self) -> Result<TenantContext> {
        TenantContext::new(self.tenant_id, self.company_id, self.user_id)
            .context("invalid tenant scope")
    }
}

#[derive(Args)]
struct RefreshOverdueArgs {
    #[command(flatten)]
    scope: ScopeArgs,
    #[arg(long, help = "Reference date (YYYY-MM-DD), defaults to today")]
    as_of: Option<NaiveDate>,
}

#[derive(Args)]
struct ReconcileArgs {
    #[command(flatten)]
    scope: ScopeArgs,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Only this party")]
    party_id: Option<Uuid>,
}
