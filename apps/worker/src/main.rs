//! RBAC maintenance worker: migrations, expiry sweep and employee sync.

#![forbid(unsafe_code)]

mod config;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use adrbac_application::{
    AssignmentService, AuditSink, EmployeeRepository, EmployeeSyncResult, EmployeeSyncService,
    PermissionCache, PermissionResolver, PermissionResolverConfig, StatisticsService,
};
use adrbac_core::{AppError, AppResult};
use adrbac_infrastructure::{
    HttpEmployeeSource, InMemoryPermissionCache, PostgresAssignmentRepository, PostgresAuditSink,
    PostgresCatalogRepository, PostgresEmployeeRepository, PostgresPermissionSourceRepository,
    RedisPermissionCache,
};

use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;

static MIGRATOR: Migrator = sqlx::migrate!("../../crates/infrastructure/migrations");

struct Runtime {
    assignment_service: AssignmentService,
    statistics_service: StatisticsService,
    resolver: PermissionResolver,
    employees: Arc<dyn EmployeeRepository>,
    audit_sink: Arc<dyn AuditSink>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let arguments = env::args().skip(1).collect::<Vec<_>>();

    match arguments.split_first() {
        Some((command, _)) if command == "migrate" => run_migrations(&pool).await,
        Some((command, usernames)) if command == "sync" => {
            let runtime = build_runtime(&config, pool)?;
            sync_employees(&config, &runtime, usernames).await
        }
        Some((command, _)) => Err(AppError::Validation(format!(
            "unknown command '{command}'; expected 'migrate' or 'sync <username>...'"
        ))),
        None => {
            let runtime = build_runtime(&config, pool)?;
            run_sweeper(&config, &runtime).await
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;
    info!("migrations applied");
    Ok(())
}

fn build_cache(config: &WorkerConfig) -> AppResult<Arc<dyn PermissionCache>> {
    match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL '{redis_url}': {error}"))
            })?;
            info!(key_prefix = %config.cache_key_prefix, "using redis permission cache");
            Ok(Arc::new(RedisPermissionCache::new(
                client,
                config.cache_key_prefix.as_str(),
            )))
        }
        None => {
            info!("REDIS_URL not set, using in-process permission cache");
            Ok(Arc::new(InMemoryPermissionCache::new()))
        }
    }
}

fn build_runtime(config: &WorkerConfig, pool: PgPool) -> AppResult<Runtime> {
    let assignments = Arc::new(PostgresAssignmentRepository::new(pool.clone()));
    let employees: Arc<dyn EmployeeRepository> =
        Arc::new(PostgresEmployeeRepository::new(pool.clone()));
    let catalog = Arc::new(PostgresCatalogRepository::new(pool.clone()));
    let sources = Arc::new(PostgresPermissionSourceRepository::new(pool.clone()));
    let audit_sink: Arc<dyn AuditSink> = Arc::new(PostgresAuditSink::new(pool));

    let resolver = PermissionResolver::new(
        sources,
        build_cache(config)?,
        PermissionResolverConfig {
            cache_ttl_seconds: config.cache_ttl_seconds,
        },
    );
    let assignment_service = AssignmentService::new(
        assignments.clone(),
        employees.clone(),
        catalog,
        resolver.clone(),
        audit_sink.clone(),
    );

    Ok(Runtime {
        assignment_service,
        statistics_service: StatisticsService::new(assignments),
        resolver,
        employees,
        audit_sink,
    })
}

async fn run_sweeper(config: &WorkerConfig, runtime: &Runtime) -> AppResult<()> {
    info!(
        sweep_interval_seconds = config.sweep_interval_seconds,
        expiring_soon_days = config.expiring_soon_days,
        cache_ttl_seconds = config.cache_ttl_seconds,
        "adrbac-worker started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => sweep(config, runtime).await,
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(error = %error, "failed to listen for shutdown signal");
                }
                info!("adrbac-worker stopping");
                return Ok(());
            }
        }
    }
}

async fn sweep(config: &WorkerConfig, runtime: &Runtime) {
    match runtime.assignment_service.expire_due(Utc::now()).await {
        Ok(expired) if !expired.is_empty() => {
            info!(count = expired.len(), "expiry sweep deactivated assignments");
        }
        Ok(_) => {}
        Err(error) => warn!(error = %error, "expiry sweep failed"),
    }

    match runtime
        .statistics_service
        .expiring_assignments(config.expiring_soon_days)
        .await
    {
        Ok(expiring) if !expiring.is_empty() => {
            info!(
                count = expiring.len(),
                days_ahead = config.expiring_soon_days,
                "assignments expiring soon"
            );
        }
        Ok(_) => {}
        Err(error) => warn!(error = %error, "failed to list expiring assignments"),
    }

    match runtime.statistics_service.statistics().await {
        Ok(statistics) => info!(
            total = statistics.total,
            active = statistics.active,
            expired = statistics.expired,
            inactive = statistics.inactive,
            active_percentage = statistics.active_percentage,
            "assignment statistics"
        ),
        Err(error) => warn!(error = %error, "failed to compute assignment statistics"),
    }
}

async fn sync_employees(
    config: &WorkerConfig,
    runtime: &Runtime,
    usernames: &[String],
) -> AppResult<()> {
    let api_config = config.employee_api.clone().ok_or_else(|| {
        AppError::Validation("EMPLOYEE_API_URL is required for 'sync'".to_owned())
    })?;
    if usernames.is_empty() {
        return Err(AppError::Validation(
            "'sync' needs at least one username".to_owned(),
        ));
    }

    let sync_service = EmployeeSyncService::new(
        Arc::new(HttpEmployeeSource::new(api_config)?),
        runtime.employees.clone(),
        runtime.resolver.clone(),
        runtime.audit_sink.clone(),
    );
    let report = sync_service.sync_many(usernames).await;

    for (username, result) in &report.results {
        match result {
            EmployeeSyncResult::Refreshed(employee) => {
                info!(username = %username, is_active = employee.is_active, "employee refreshed");
            }
            EmployeeSyncResult::Deactivated(_) => {
                info!(username = %username, "employee deactivated");
            }
            EmployeeSyncResult::Unknown => warn!(username = %username, "employee unknown"),
        }
    }

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "{} of {} employees failed to sync",
            report.errors.len(),
            usernames.len()
        )))
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
