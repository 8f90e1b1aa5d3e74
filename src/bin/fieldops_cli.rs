use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use fieldops_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    dispatch::{DispatchApi, DispatchClient},
    entities::WorkOrderStatus,
    events,
    services::work_orders::{
        SortDirection, SortField, UpdateStatusRequest, WorkOrderFilter, WorkOrderSort,
        WorkOrderView,
    },
    tracing::with_timing,
    AppState,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Import(args) => handle_import(&context, args, cli.json).await?,
        Commands::FetchReports(args) => handle_fetch_reports(&context, args, cli.json).await?,
        Commands::AutoImport(args) => handle_auto_import(&context, args, cli.json).await?,
        Commands::Materials(args) => handle_materials(&context, args, cli.json).await?,
        Commands::WorkOrders(command) => handle_work_orders(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "fieldops", about = "FieldOps CLI for imports, sync jobs and work order review", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Import raw dispatch orders from a JSON file
    Import(ImportArgs),
    /// Sync a day's routes into reports
    FetchReports(FetchReportsArgs),
    /// Import every completed order in a date range
    AutoImport(AutoImportArgs),
    /// Show material requirements for a day's routes
    Materials(MaterialsArgs),
    #[command(subcommand)]
    WorkOrders(WorkOrdersCommands),
}

#[derive(Args)]
struct ImportArgs {
    #[arg(long, help = "JSON file holding an array of orders or an {\"orders\": [...]} object")]
    file: PathBuf,
}

#[derive(Args)]
struct FetchReportsArgs {
    #[arg(long, help = "Route date (YYYY-MM-DD), defaults to today")]
    date: Option<NaiveDate>,
}

#[derive(Args)]
struct AutoImportArgs {
    #[arg(long, help = "First service date (YYYY-MM-DD), defaults to today")]
    from: Option<NaiveDate>,
    #[arg(long, help = "Last service date (YYYY-MM-DD), defaults to --from")]
    to: Option<NaiveDate>,
}

#[derive(Args)]
struct MaterialsArgs {
    #[arg(long, help = "Route date (YYYY-MM-DD)")]
    date: NaiveDate,
    #[arg(long, help = "Only this driver's route")]
    driver_serial: Option<String>,
}

#[derive(Subcommand)]
enum WorkOrdersCommands {
    /// List work orders
    List(ListArgs),
    /// Show one work order
    Show {
        #[arg(long)]
        id: Uuid,
    },
    /// Change a work order's status
    SetStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long, help = "pending_review, approved, flagged, flagged_followup, resolved or rejected")]
        status: WorkOrderStatus,
        #[arg(long, help = "Who is making the change")]
        actor: Option<String>,
    },
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    status: Option<WorkOrderStatus>,
    #[arg(long, help = "Match order number, driver or location")]
    search: Option<String>,
    #[arg(long, default_value_t = SortField::EndTime)]
    sort: SortField,
    #[arg(long, default_value_t = SortDirection::Desc)]
    direction: SortDirection,
    #[arg(long)]
    page: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    state: AppState,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let (event_sender, event_rx) = events::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let dispatch: Arc<dyn DispatchApi> = Arc::new(
            DispatchClient::new(&config.dispatch).context("failed to build dispatch client")?,
        );
        let state = AppState::new(
            db.clone(),
            config.clone(),
            Some(Arc::new(event_sender)),
            dispatch,
        );

        Ok(Self { config, db, state })
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .map_err(|e| anyhow!("migrations failed: {}", e))?;
    println!("Migrations applied to {}", redact_url(&context.config.database_url));
    Ok(())
}

fn read_orders(path: &PathBuf) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw).context("file is not valid JSON")?;
    match parsed {
        Value::Array(orders) => Ok(orders),
        Value::Object(mut obj) => match obj.remove("orders") {
            Some(Value::Array(orders)) => Ok(orders),
            _ => Err(anyhow!("expected an \"orders\" array")),
        },
        _ => Err(anyhow!("expected a JSON array of orders")),
    }
}

async fn handle_import(context: &CliContext, args: ImportArgs, json: bool) -> Result<()> {
    let orders = read_orders(&args.file)?;
    let summary = with_timing(
        "import-bulk-orders",
        context.state.services.imports.import_orders(&orders),
    )
    .await
    .context("import failed")?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Imported {} of {} orders ({} duplicates, {} errors)",
            summary.imported, summary.total, summary.duplicates, summary.errors
        );
        for detail in &summary.error_details {
            println!("  ! {}", detail);
        }
    }
    Ok(())
}

async fn handle_fetch_reports(
    context: &CliContext,
    args: FetchReportsArgs,
    json: bool,
) -> Result<()> {
    let outcome = with_timing(
        "fetch-reports",
        context.state.services.reports.fetch_reports(args.date),
    )
    .await
    .context("fetch-reports failed")?;

    if json {
        print_json(&outcome)?;
    } else {
        println!("{} ({})", outcome.message, outcome.date);
        if outcome.batch_stats.failed_batches > 0 {
            println!(
                "  {} of {} completion batches failed",
                outcome.batch_stats.failed_batches, outcome.batch_stats.total_batches
            );
        }
    }
    Ok(())
}

async fn handle_auto_import(context: &CliContext, args: AutoImportArgs, json: bool) -> Result<()> {
    let from = args.from.unwrap_or_else(|| Utc::now().date_naive());
    let to = args.to.unwrap_or(from);
    let outcome = with_timing(
        "auto-import",
        context.state.services.dispatch_sync.auto_import(from, to),
    )
    .await
    .context("auto-import failed")?;

    if json {
        print_json(&outcome)?;
    } else {
        println!(
            "{} to {}: {} orders over {} pages, {} completed, {} imported, {} duplicates",
            outcome.date_from,
            outcome.date_to,
            outcome.orders_seen,
            outcome.pages,
            outcome.orders_with_completion,
            outcome.summary.imported,
            outcome.summary.duplicates
        );
        if !outcome.is_complete {
            println!("  stopped at the page cap; run again to continue");
        }
    }
    Ok(())
}

async fn handle_materials(context: &CliContext, args: MaterialsArgs, json: bool) -> Result<()> {
    let requirement = context
        .state
        .services
        .materials
        .requirements_for_date(args.date, args.driver_serial.as_deref())
        .await
        .context("failed to compute materials")?;

    if json {
        print_json(&requirement)?;
    } else {
        println!(
            "Materials for {} ({})",
            requirement.date,
            requirement.technician_name.as_deref().unwrap_or("no routes")
        );
        for total in &requirement.totals {
            println!("- {:>5} x {}", total.quantity, total.material_type);
        }
    }
    Ok(())
}

async fn handle_work_orders(
    context: &CliContext,
    command: WorkOrdersCommands,
    json: bool,
) -> Result<()> {
    let service = context.state.services.work_orders.clone();
    match command {
        WorkOrdersCommands::List(args) => {
            let filter = WorkOrderFilter {
                status: args.status,
                search: args.search,
                ..Default::default()
            };
            let sort = WorkOrderSort {
                field: args.sort,
                direction: args.direction,
            };
            let page = service
                .list_work_orders(&filter, sort, args.page, args.limit)
                .await
                .context("failed to list work orders")?;
            if json {
                print_json(&page)?;
            } else {
                println!(
                    "Page {}/{} ({} work orders)",
                    page.page, page.total_pages, page.total
                );
                page.items.iter().for_each(render_work_order);
            }
        }
        WorkOrdersCommands::Show { id } => {
            let detail = service
                .get_work_order(id)
                .await
                .context("failed to load work order")?;
            if json {
                print_json(&detail)?;
            } else {
                render_work_order(&detail.view);
            }
        }
        WorkOrdersCommands::SetStatus { id, status, actor } => {
            let view = service
                .update_status(id, UpdateStatusRequest { status, actor })
                .await
                .context("failed to update status")?;
            if json {
                print_json(&view)?;
            } else {
                render_work_order(&view);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_work_order(view: &WorkOrderView) {
    println!(
        "- {} • {} • {} • {} • {}",
        view.order_no,
        view.status_label,
        view.driver_name,
        view.location_name,
        view.best_date
    );
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &url[..scheme], &url[at..])
        }
        _ => url.to_string(),
    }
}
