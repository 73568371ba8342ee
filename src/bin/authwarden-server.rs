//! Authwarden gateway server.
//!
//! Startup order:
//! 1. Load `.env`, parse flags, install logging
//! 2. Wait for the license file and validate it (exit 77 on failure)
//! 3. Build the auth chain and serve
//!
//! Usage:
//!   authwarden-server --bind 0.0.0.0:8080

use authwarden::audit::{AuditEvent, AuditSink, FanoutAuditSink, MemoryAuditSink, TracingAuditSink};
use authwarden::client::idp::TokenGrant;
use authwarden::integrations::axum::{
    limit_login_attempts, request_context, require_bearer, require_license, unlock_status,
    AuthenticatedUser, LoginIdentity, MAX_LOGIN_BODY_BYTES,
};
use authwarden::license::wait_for_license_file;
use authwarden::lockout::extract_login_password;
use authwarden::{
    AuthChain, AuthwardenConfig, AuthwardenError, Clock, LicenseBootstrap, LicenseGate,
    SystemClock,
};
use axum::extract::{Request, State};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when the license fails validation.
const EXIT_LICENSE_FATAL: u8 = 77;

/// Audit events retained for the trace endpoint.
const TRACE_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "authwarden-server")]
#[command(about = "Bearer-token, login lockout, and license gateway")]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "AUTHWARDEN_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone)]
struct AppState {
    chain: Arc<AuthChain>,
    traces: Arc<MemoryAuditSink>,
}

#[derive(Serialize)]
struct Healthz {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct SecureSample {
    message: &'static str,
    user: String,
}

fn main() -> ExitCode {
    // Flags may be supplied through .env, so load it before parsing.
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = dotenv {
        info!(error = %e, "No .env file loaded");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ (AuthwardenError::LicenseIO(_) | AuthwardenError::LicenseTamperDetected { .. })) => {
            error!(error = %e, "License validation failed; refusing to serve");
            ExitCode::from(EXIT_LICENSE_FATAL)
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run(args: Args) -> Result<(), AuthwardenError> {
    let config = AuthwardenConfig::from_env()?;
    config.validate()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let license = &config.license;
    if !wait_for_license_file(&license.path, license.wait_attempts, license.wait_interval) {
        warn!(path = %license.path.display(), "License file did not appear");
    }

    let gate = Arc::new(LicenseGate::new());
    LicenseBootstrap::from_config(license, clock.clone())?.run(&gate)?;

    let traces = Arc::new(MemoryAuditSink::new(TRACE_CAPACITY));
    let audit: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(vec![
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
        traces.clone(),
    ]));

    // Blocking HTTP clients are built here, outside the async runtime.
    let chain = Arc::new(AuthChain::from_config(&config, gate, audit, clock)?);
    if !chain.has_identity_provider() {
        warn!("No identity provider configured; /api/v1/auth/login will answer 500");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AuthwardenError::Internal(format!("Failed to start runtime: {}", e)))?;

    let state = AppState {
        chain: chain.clone(),
        traces,
    };
    let result = runtime.block_on(serve(args.bind, state, config.lockout.sweep_interval));

    // Shut the runtime down before the last chain handle drops.
    drop(runtime);
    drop(chain);
    result
}

async fn serve(
    bind: SocketAddr,
    state: AppState,
    sweep_interval: std::time::Duration,
) -> Result<(), AuthwardenError> {
    let tracker = state.chain.tracker().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            tracker.sweep();
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| AuthwardenError::Internal(format!("Failed to bind {}: {}", bind, e)))?;
    info!(%bind, "Authwarden listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AuthwardenError::Internal(format!("Server error: {}", e)))
}

fn build_router(state: AppState) -> Router {
    let chain = state.chain.clone();

    let login = Router::new()
        .route("/api/v1/auth/login", post(login_handler))
        .route_layer(middleware::from_fn_with_state(chain.clone(), limit_login_attempts));

    let secure = Router::new()
        .route("/api/v1/auth/secure-sample", get(secure_sample))
        .route_layer(middleware::from_fn_with_state(chain.clone(), require_bearer));

    // Layers run outside-in: license first, then bearer.
    let trace = Router::new()
        .route("/api/v1/log/trace", get(trace_log))
        .route_layer(middleware::from_fn_with_state(chain.clone(), require_bearer))
        .route_layer(middleware::from_fn_with_state(chain.clone(), require_license));

    let status = Router::new()
        .route("/api/v1/auth/unlock-status", get(unlock_status))
        .with_state(chain);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(login)
        .merge(secure)
        .merge(trace)
        .with_state(state)
        .merge(status)
}

async fn healthz() -> Json<Healthz> {
    Json(Healthz {
        status: "ok",
        service: "authwarden",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn login_handler(
    State(state): State<AppState>,
    Extension(LoginIdentity(identity)): Extension<LoginIdentity>,
    req: Request,
) -> Result<Json<TokenGrant>, AuthwardenError> {
    let ctx = request_context(&req);
    let body = axum::body::to_bytes(req.into_body(), MAX_LOGIN_BODY_BYTES)
        .await
        .map_err(|e| AuthwardenError::MalformedLoginBody(e.to_string()))?;
    let password = extract_login_password(&body)?;

    let chain = state.chain.clone();
    let grant = tokio::task::spawn_blocking(move || chain.login(&identity, &password, &ctx))
        .await
        .map_err(|e| AuthwardenError::Internal(format!("Login task failed: {}", e)))??;

    Ok(Json(grant))
}

async fn secure_sample(
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Json<SecureSample> {
    Json(SecureSample {
        message: "Secure data accessed.",
        user: claims.preferred_username,
    })
}

async fn trace_log(State(state): State<AppState>) -> Json<Vec<AuditEvent>> {
    Json(state.traces.recent())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
