//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every registry endpoint
//! - Wire up middleware (request ID, tracing, metrics, timeout, body limit)
//! - Authenticate API routes; leave `/health` open
//! - Apply hot-reloaded configuration to the shared state
//! - Serve plain HTTP or TLS with graceful shutdown

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, post, put},
    Router,
};
use arc_swap::ArcSwap;
use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RegistryConfig;
use crate::http::middleware::{auth::require_caller, metrics::track_requests};
use crate::http::request::{request_id_header, X_REQUEST_ID};
use crate::http::{listing, matching, registry, websocket};
use crate::lifecycle::shutdown::{self, Shutdown};
use crate::registry::Registry;
use crate::security::grants::GrantTable;

/// How long in-flight TLS connections get to finish after shutdown.
const TLS_DRAIN_SECS: u64 = 10;

/// Everything a request handler needs, swapped wholesale on reload.
pub struct ServiceState {
    pub config: RegistryConfig,
    pub registry: Registry,
    pub grants: GrantTable,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<ServiceState>>,
    pub shutdown: Shutdown,
}

impl AppState {
    pub fn new(config: RegistryConfig, registry: Registry, grants: GrantTable, shutdown: Shutdown) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(ServiceState {
                config,
                registry,
                grants,
            })),
            shutdown,
        }
    }

    /// Apply a freshly loaded configuration.
    ///
    /// Grants, urgency scale, matching policy, retries and consistency take
    /// effect immediately. The ledger backend and provisioned addresses are
    /// fixed for the life of the process.
    pub fn reload(&self, mut config: RegistryConfig) {
        let current = self.inner.load_full();

        let old = &current.config;
        if old.ledger.backend != config.ledger.backend
            || old.ledger.contract_address != config.ledger.contract_address
            || old.ledger.persistence_path != config.ledger.persistence_path
        {
            tracing::warn!("Ledger settings changed; restart required to apply them");
        }
        if old.provisioning.admin != config.provisioning.admin
            || old.provisioning.donor_storage != config.provisioning.donor_storage
            || old.provisioning.recipient_storage != config.provisioning.recipient_storage
        {
            tracing::warn!("Provisioned addresses changed; restart required to apply them");
        }
        config.ledger = old.ledger.clone();
        config.provisioning = old.provisioning.clone();
        config.blockchain = old.blockchain.clone();

        let grants = match GrantTable::from_config(&config.access) {
            Ok(grants) => grants,
            Err(e) => {
                tracing::error!(error = %e, "Rejected reloaded grants; keeping current tokens");
                current.grants.clone()
            }
        };
        let registry = current.registry.reconfigure(&config);

        tracing::info!(
            grants = grants.len(),
            policy = registry.policy_name(),
            urgency_min = config.urgency.min,
            urgency_max = config.urgency.max,
            "Configuration reloaded"
        );

        self.inner.store(Arc::new(ServiceState {
            config,
            registry,
            grants,
        }));
    }
}

/// HTTP server for the registry API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: RegistryConfig, registry: Registry, grants: GrantTable, shutdown: Shutdown) -> Self {
        let router_config = config.clone();
        let state = AppState::new(config, registry, grants, shutdown);
        let router = Self::build_router(&router_config, state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// A clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RegistryConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/api/v1/session", get(registry::session))
            .route("/api/v1/hospitals", post(registry::register_hospital))
            .route(
                "/api/v1/donors",
                get(listing::donors).post(registry::register_donor),
            )
            .route(
                "/api/v1/recipients",
                get(listing::recipients).post(registry::register_recipient),
            )
            .route(
                "/api/v1/recipients/{id}/candidates",
                get(matching::candidates),
            )
            .route(
                "/api/v1/recipients/{id}/urgency",
                put(matching::update_urgency),
            )
            .route(
                "/api/v1/matches",
                get(listing::matches).post(matching::match_organ),
            )
            .route("/api/v1/matches/retrieval", post(matching::confirm_retrieval))
            .route("/api/v1/stats", get(listing::stats))
            .route("/api/v1/events", get(websocket::events))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_caller));

        Router::new()
            .merge(api)
            .route("/health", get(registry::health))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get(X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(request_id_header()))
                    .layer(middleware::from_fn(track_requests))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(MapResponseBodyLayer::new(Body::new))
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size)),
            )
    }

    /// Run the server until the shutdown coordinator fires, then flush the
    /// ledger.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<RegistryConfig>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let tls = self.state.inner.load().config.listener.tls.clone();

        let reload_state = self.state.clone();
        let reloads = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                reload_state.reload(config);
            }
        });

        match tls {
            Some(tls) => {
                let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                let stop = self.state.shutdown.subscribe();
                tokio::spawn(async move {
                    shutdown::recv(stop).await;
                    drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
                });

                tracing::info!(address = %addr, "HTTPS server starting");
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown::recv(self.state.shutdown.subscribe()))
                    .await?;
            }
        }

        reloads.abort();
        let registry = self.state.inner.load().registry.clone();
        if let Err(e) = registry.persist().await {
            tracing::error!(error = %e, "Failed to persist ledger on shutdown");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Load TLS configuration from certificate and key files.
async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{what} file not found: {path:?}"),
            ));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path).await
}
