use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use saldo::application::services::accrual::AccrualJob;
use saldo::application::services::notifier::{self, Notifier};
use saldo::application::services::settlement::SettlementService;
use saldo::config::PlatformConfig;
use saldo::domain::errors::{GatewayError, SettlementError};
use saldo::infrastructure::gateway::bravopay::BravopayAdapter;
use saldo::infrastructure::gateway::pixway::PixwayAdapter;
use saldo::infrastructure::gateway::GatewayReconciler;
use saldo::infrastructure::price_feed::HttpPriceFeed;
use saldo::persistence::{init_database, DatabaseConfig};

struct AppState {
    reconciler: GatewayReconciler,
    pixway: PixwayAdapter,
    bravopay: BravopayAdapter,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting saldo settlement core");

    let db_config = DatabaseConfig::from_env();
    let pool = init_database(&db_config.url).await?;

    let config = PlatformConfig::from_env();
    let outbound_timeout = Duration::from_secs(config.outbound_timeout_seconds);

    let (notifier, notifications) = Notifier::channel();
    notifier::spawn_consumer(notifications);

    let settlement = Arc::new(SettlementService::new(
        pool.clone(),
        config.clone(),
        notifier,
    ));

    let pixway = PixwayAdapter::new(&config.pixway_ipn_secret);
    let bravopay = BravopayAdapter::new(config.bravopay_requery_url.clone(), outbound_timeout)?;
    let reconciler = GatewayReconciler::new(pool.clone(), settlement, config.amount_tolerance);

    // Daily accrual loop. Ticks that land while a run is still going are
    // dropped by the job itself.
    if let Ok(feed_url) = std::env::var("PRICE_FEED_URL") {
        let feed = Arc::new(HttpPriceFeed::new(&feed_url, outbound_timeout)?);
        let job = AccrualJob::new(pool.clone(), feed);
        let interval_seconds = config.accrual_interval_seconds;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
            loop {
                interval.tick().await;
                let today = chrono::Utc::now().date_naive();
                if let Err(e) = job.run_once(today).await {
                    error!("Accrual run for {} failed: {}", today, e);
                }
            }
        });
    } else {
        info!("PRICE_FEED_URL not set; accrual job disabled");
    }

    let state = Arc::new(AppState {
        reconciler,
        pixway,
        bravopay,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/webhooks/pixway", post(pixway_webhook))
        .route("/webhooks/bravopay", post(bravopay_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn pixway_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Response {
    let result = state.reconciler.reconcile(&state.pixway, &payload).await;
    webhook_response(result)
}

async fn bravopay_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Response {
    let result = state.reconciler.reconcile(&state.bravopay, &payload).await;
    webhook_response(result)
}

/// Maps reconciliation outcomes onto HTTP statuses the provider's retry
/// logic understands: 2xx means "do not redeliver", 503 means "try again".
fn webhook_response(
    result: Result<saldo::persistence::models::DepositRecord, GatewayError>,
) -> Response {
    match result {
        Ok(deposit) => (
            StatusCode::OK,
            Json(json!({ "status": "approved", "deposit_id": deposit.id })),
        )
            .into_response(),
        // Idempotent no-op: the provider must not retry a transaction we
        // have already processed or never issued.
        Err(GatewayError::NotFoundOrProcessed(id)) => (
            StatusCode::OK,
            Json(json!({ "status": "ignored", "transaction_id": id })),
        )
            .into_response(),
        // Same idempotent outcome for the loser of two concurrent
        // deliveries: its lookup saw the deposit pending, but the guarded
        // approval had already happened by the time it ran.
        Err(GatewayError::Settlement(SettlementError::AlreadyProcessed(id))) => (
            StatusCode::OK,
            Json(json!({ "status": "ignored", "deposit_id": id })),
        )
            .into_response(),
        Err(e @ GatewayError::MissingField(_))
        | Err(e @ GatewayError::UnrecognizedStatus { .. }) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e @ GatewayError::InvalidSignature) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e @ GatewayError::AmountMismatch { .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e @ GatewayError::ProviderDisagreement(_)) => {
            (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e @ GatewayError::ProviderUnreachable(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => {
            error!("Webhook reconciliation failed internally: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}
