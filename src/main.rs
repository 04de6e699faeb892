use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use k1s0_roster_sync_server::adapter::repository::{InMemorySyncJobRepository, SyncJobPostgresRepository};
use k1s0_roster_sync_server::cli::{Cli, Commands, ImportArgs};
use k1s0_roster_sync_server::domain::repository::SyncJobRepository;
use k1s0_roster_sync_server::infrastructure::config::{Config, DatabaseConfig};
use k1s0_roster_sync_server::infrastructure::telemetry::init_tracing;
use k1s0_roster_sync_server::infrastructure::{
    HttpClassesClient, HttpRosterSourceClient, HttpUsersClient, RosterCache,
};
use k1s0_roster_sync_server::usecase::{
    GetSyncJobUseCase, ImportRequest, ImportRosterUseCase, ReconcileClassesUseCase, ReconcileStudentsUseCase,
    ResolveRosterUseCase,
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Config
    let cfg = Config::load(&cli.config)?;

    // Telemetry
    init_tracing(&cfg.observability)?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting roster sync"
    );

    // Sync job ledger
    let job_repo = build_job_repository(cfg.database.as_ref()).await?;

    // Clients
    let roster_client = Arc::new(HttpRosterSourceClient::new(&cfg.roster)?);
    let classes_client = Arc::new(HttpClassesClient::new(&cfg.classes)?);
    let users_client = Arc::new(HttpUsersClient::new(&cfg.users)?);

    // Use cases
    let resolver = Arc::new(ResolveRosterUseCase::new(
        roster_client,
        RosterCache::from_config(&cfg.roster),
    ));

    let success = match cli.command {
        Commands::Classes(args) => {
            let uc = build_import_use_case(&cfg, job_repo, resolver, classes_client, users_client);
            let outcome = uc.import_classes(&import_request(args)).await;
            print_json(&outcome)?;
            outcome.success
        }
        Commands::Students(args) => {
            let uc = build_import_use_case(&cfg, job_repo, resolver, classes_client, users_client);
            let outcome = uc.import_students(&import_request(args)).await;
            print_json(&outcome)?;
            outcome.success
        }
        Commands::All(args) => {
            let uc = build_import_use_case(&cfg, job_repo, resolver, classes_client, users_client);
            let outcome = uc.import_all(&import_request(args)).await;
            print_json(&outcome)?;
            outcome.success
        }
        Commands::Status => {
            let available = resolver.check_availability().await;
            print_json(&serde_json::json!({ "available": available }))?;
            available
        }
        Commands::Job { id } => match GetSyncJobUseCase::new(job_repo).get(id).await? {
            Some((job, items)) => {
                print_json(&serde_json::json!({ "job": job, "items": items }))?;
                true
            }
            None => {
                warn!(job_id = %id, "sync job not found");
                false
            }
        },
        Commands::Jobs { school_id, limit } => {
            let jobs = GetSyncJobUseCase::new(job_repo).list_by_school(&school_id, limit).await?;
            print_json(&jobs)?;
            true
        }
        Commands::Metrics { school_id } => {
            let metrics = GetSyncJobUseCase::new(job_repo).metrics(&school_id).await?;
            print_json(&metrics)?;
            true
        }
    };

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn build_job_repository(db_config: Option<&DatabaseConfig>) -> anyhow::Result<Arc<dyn SyncJobRepository>> {
    let (url, max_connections) = match (std::env::var("DATABASE_URL").ok(), db_config) {
        (Some(url), cfg) => (url, cfg.map_or(10, |c| c.max_connections)),
        (None, Some(cfg)) => (cfg.connection_url(), cfg.max_connections),
        (None, None) => {
            info!("no database configured, sync jobs are kept in memory");
            return Ok(Arc::new(InMemorySyncJobRepository::new()));
        }
    };

    info!("connecting to database");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database connection pool established");
    Ok(Arc::new(SyncJobPostgresRepository::new(pool)))
}

fn build_import_use_case(
    cfg: &Config,
    job_repo: Arc<dyn SyncJobRepository>,
    resolver: Arc<ResolveRosterUseCase>,
    classes_client: Arc<HttpClassesClient>,
    users_client: Arc<HttpUsersClient>,
) -> ImportRosterUseCase {
    let classes = Arc::new(ReconcileClassesUseCase::new(classes_client));
    let students = Arc::new(ReconcileStudentsUseCase::new(
        users_client.clone(),
        SecretString::new(cfg.sync.default_password.expose_secret().clone()),
    ));
    ImportRosterUseCase::new(
        job_repo,
        users_client,
        resolver,
        classes,
        students,
        cfg.sync.default_district_id.clone(),
    )
}

fn import_request(args: ImportArgs) -> ImportRequest {
    ImportRequest {
        school_id: args.school_id,
        user_id: args.user_id,
        token: SecretString::new(args.token),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
