//! HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRef, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::{get, post, put},
};
use dishpatch_core::{Config, PrincipalId, PrincipalKind, ServiceSettings, ValidationError};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::GatewayError;
use crate::auth::{
    ApprovalState, Argon2Hasher, AuthContext, AuthError, AuthOutcome, AuthService,
    CredentialStore, LoginForm, PasswordChangeForm, PasswordHasher, PublicPrincipal,
    RegistrationForm, RequireAdmin, RequireAuth, SledCredentialStore,
};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// Authentication and account operations.
    pub auth: Arc<AuthService>,
    /// Listener settings and hosted collections.
    pub service: Arc<ServiceSettings>,
}

impl FromRef<GatewayState> for Arc<AuthService> {
    fn from_ref(state: &GatewayState) -> Self {
        Arc::clone(&state.auth)
    }
}

/// A Dishpatch service: one HTTP listener over the shared auth layer.
#[derive(Debug)]
pub struct Gateway {
    config: Config,
    state: GatewayState,
}

/// Builder for constructing a Gateway with its dependencies.
pub struct GatewayBuilder {
    config: Config,
    store: Option<Arc<dyn CredentialStore>>,
    hasher: Option<Arc<dyn PasswordHasher>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            store: None,
            hasher: None,
        }
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use an existing credential store instead of opening one under
    /// `service.dataDir`. Services sharing a store see each other's principals.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific password hasher instead of argon2 at `auth.hashCost`.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid, no shared secret is set, or the
    /// store cannot be opened.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;
        config.validate()?;
        let secret = config.auth.require_secret()?;

        let store = match self.store {
            Some(store) => store,
            None => {
                std::fs::create_dir_all(&config.service.data_dir)?;
                Arc::new(SledCredentialStore::open(&config.service.data_dir)?)
            }
        };

        let hasher = match self.hasher {
            Some(hasher) => hasher,
            None => Arc::new(Argon2Hasher::new(config.auth.hash_cost)?),
        };

        let auth = AuthService::new(store, hasher, secret, &config.auth);
        let state = GatewayState {
            auth: Arc::new(auth),
            service: Arc::new(config.service.clone()),
        };

        Ok(Gateway { config, state })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("hasher", &self.hasher.is_some())
            .finish()
    }
}

impl Gateway {
    /// Create a gateway with its own store and argon2 hasher.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be built.
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// Handler state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// The HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let service = &self.config.service;
        let addr: SocketAddr = format!("{}:{}", service.bind_address, service.port)
            .parse()
            .map_err(|e| GatewayError::Server(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            service = %service.name,
            kinds = ?service.principal_kinds,
            "Gateway listening on http://{}",
            addr
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Build the router over `state`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/register/{principal_type}", post(register_handler))
        .route("/login", post(login_handler))
        .route("/session", get(session_handler))
        .route("/me", get(me_handler))
        .route("/me/password", put(change_password_handler))
        .route("/restaurant-operators", get(list_operators_handler))
        .route("/restaurant-operators/{id}/approve", post(approve_handler))
        .route("/restaurant-operators/{id}/reject", post(reject_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn malformed(rejection: &JsonRejection) -> AuthError {
    ValidationError::Malformed(rejection.body_text()).into()
}

/// Resolve a `{principalType}` path segment to a collection this service hosts.
fn hosted_kind(service: &ServiceSettings, tag: &str) -> Result<PrincipalKind, AuthError> {
    tag.parse::<PrincipalKind>()
        .ok()
        .filter(|kind| service.hosts(*kind))
        .ok_or_else(|| AuthError::NotFound(format!("unknown principal type: {tag}")))
}

/// Collections a login searches: the requested one, or every hosted one in
/// [`PrincipalKind::ALL`] order.
fn login_kinds(
    service: &ServiceSettings,
    requested: Option<&str>,
) -> Result<Vec<PrincipalKind>, AuthError> {
    match requested.map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) => {
            let kind = tag
                .parse::<PrincipalKind>()
                .map_err(|e| ValidationError::Malformed(e.to_string()))?;
            if service.hosts(kind) {
                Ok(vec![kind])
            } else {
                let message = format!("principal type {kind} is not served here");
                Err(ValidationError::Malformed(message).into())
            }
        }
        None => Ok(PrincipalKind::ALL
            .into_iter()
            .filter(|kind| service.hosts(*kind))
            .collect()),
    }
}

fn operator_id(raw: &str) -> Result<PrincipalId, AuthError> {
    raw.parse()
        .map_err(|_| ValidationError::Malformed(format!("invalid principal id: {raw}")).into())
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Registration is open for every hosted collection, including `admin`. A
/// service that hosts the admin collection lets any caller obtain an admin
/// token, and with it the operator approval endpoints; public services
/// should leave `admin` out of `principalKinds`.
async fn register_handler(
    State(state): State<GatewayState>,
    Path(principal_type): Path<String>,
    body: Result<Json<RegistrationForm>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthOutcome>), AuthError> {
    let kind = hosted_kind(&state.service, &principal_type)?;
    let Json(form) = body.map_err(|e| malformed(&e))?;

    let outcome = state.auth.register(kind, form).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn login_handler(
    State(state): State<GatewayState>,
    body: Result<Json<LoginForm>, JsonRejection>,
) -> Result<Json<AuthOutcome>, AuthError> {
    let Json(form) = body.map_err(|e| malformed(&e))?;
    let kinds = login_kinds(&state.service, form.principal_type.as_deref())?;

    Ok(Json(state.auth.login_among(&kinds, form).await?))
}

async fn session_handler(RequireAuth(context): RequireAuth) -> Json<AuthContext> {
    Json(context)
}

async fn me_handler(
    State(state): State<GatewayState>,
    RequireAuth(context): RequireAuth,
) -> Result<Json<PublicPrincipal>, AuthError> {
    Ok(Json(state.auth.profile(&context).await?))
}

async fn change_password_handler(
    State(state): State<GatewayState>,
    RequireAuth(context): RequireAuth,
    body: Result<Json<PasswordChangeForm>, JsonRejection>,
) -> Result<StatusCode, AuthError> {
    let Json(form) = body.map_err(|e| malformed(&e))?;
    state.auth.change_credential(&context, form).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct OperatorQuery {
    state: Option<ApprovalState>,
}

async fn list_operators_handler(
    State(state): State<GatewayState>,
    RequireAdmin(context): RequireAdmin,
    query: Result<Query<OperatorQuery>, QueryRejection>,
) -> Result<Json<Vec<PublicPrincipal>>, AuthError> {
    let Query(query) = query.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    Ok(Json(state.auth.operators(&context, query.state).await?))
}

async fn approve_handler(
    State(state): State<GatewayState>,
    RequireAdmin(context): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<PublicPrincipal>, AuthError> {
    let id = operator_id(&id)?;
    Ok(Json(state.auth.approve_operator(&context, id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct RejectForm {
    reason: Option<String>,
}

async fn reject_handler(
    State(state): State<GatewayState>,
    RequireAdmin(context): RequireAdmin,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PublicPrincipal>, AuthError> {
    let id = operator_id(&id)?;

    // The body is optional.
    let form: RejectForm = if body.iter().all(u8::is_ascii_whitespace) {
        RejectForm::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ValidationError::Malformed(e.to_string()))?
    };

    Ok(Json(
        state.auth.reject_operator(&context, id, form.reason).await?,
    ))
}
