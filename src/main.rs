use std::sync::Arc;

use anyhow::Context;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dsentr_metering::config::Config;
use dsentr_metering::db::postgres_plan_repository::PostgresPlanRepository;
use dsentr_metering::db::postgres_project_directory::PostgresProjectDirectory;
use dsentr_metering::db::postgres_stripe_event_log_repository::PostgresStripeEventLogRepository;
use dsentr_metering::db::postgres_usage_repository::PostgresUsageRepository;
use dsentr_metering::responses::JsonResponse;
use dsentr_metering::routes;
use dsentr_metering::services::locks::{LockService, PostgresLockService};
use dsentr_metering::services::plan_manager::{PlanManager, PlanSettings};
use dsentr_metering::services::stripe::{LiveStripeService, StripeService};
use dsentr_metering::services::usage_meter::UsageMeter;
use dsentr_metering::state::AppState;

#[cfg(not(feature = "tls"))]
use tokio::net::TcpListener;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

fn init_tracing(sentry_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .with(sentry_enabled.then(sentry_tracing::layer))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(sentry_enabled.then(sentry_tracing::layer))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_tracing(sentry_guard.is_some());

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter configuration")?,
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await?;

    let plan_repo = Arc::new(PostgresPlanRepository {
        pool: pg_pool.clone(),
    });
    let usage_repo = Arc::new(PostgresUsageRepository {
        pool: pg_pool.clone(),
    });
    let directory = Arc::new(PostgresProjectDirectory {
        pool: pg_pool.clone(),
    });
    let stripe_event_log_repo = Arc::new(PostgresStripeEventLogRepository {
        pool: pg_pool.clone(),
    });
    let locks = Arc::new(PostgresLockService::new(pg_pool.clone())) as Arc<dyn LockService>;
    let stripe = Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;

    let plans = PlanManager::new(
        plan_repo,
        directory,
        stripe.clone(),
        locks.clone(),
        PlanSettings {
            default_plan_id: config.stripe.default_plan_id.clone(),
            lock_timeout: config.metering.lock_timeout,
            portal_return_origin: config.frontend_origin.clone(),
        },
    );
    let usage = UsageMeter::new(usage_repo, plans.clone(), locks, config.metering.clone());

    info!(
        deployment_mode = ?config.metering.deployment_mode,
        default_plan = %config.stripe.default_plan_id,
        lock_timeout = ?config.metering.lock_timeout,
        "metering configured"
    );

    let state = AppState {
        plans,
        usage,
        stripe,
        stripe_event_log_repo,
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(root))
        .merge(routes::api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = config.bind_addr;

    #[cfg(feature = "tls")]
    {
        let tls_config = RustlsConfig::from_pem_file(
            std::env::var("DEV_CERT_LOCATION").context("DEV_CERT_LOCATION must be set")?,
            std::env::var("DEV_KEY_LOCATION").context("DEV_KEY_LOCATION must be set")?,
        )
        .await
        .context("Failed to load TLS certs")?;

        info!("Running with TLS at https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(make_service)
            .await?;
    }

    #[cfg(not(feature = "tls"))]
    {
        let listener = TcpListener::bind(addr).await?;
        info!("Running without TLS at http://{}", addr);
        axum::serve(listener, make_service).await?;
    }

    Ok(())
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Hello, Dsentr!").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Failed to verify database connection")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Successfully connected to the database");
    Ok(pool)
}
