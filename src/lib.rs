// Library exports for the API server, maintenance binaries and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    assets::BlobStore,
    auth::AuthService,
    plans::PlanCatalog,
    schools::{RegistrationSettings, SchoolService},
};
use store::DocumentStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub redis: redis::aio::MultiplexedConnection,
    pub config: Arc<Config>,
    pub plans: PlanCatalog,
    pub schools: SchoolService,
    pub auth: AuthService,
}

impl AppState {
    /// Wires every service against the given backends.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        redis: redis::aio::MultiplexedConnection,
    ) -> Self {
        let plans = PlanCatalog::new(store.clone());
        let schools = SchoolService::new(
            store.clone(),
            blobs.clone(),
            plans.clone(),
            RegistrationSettings::from_config(&config),
        );
        let mut auth = AuthService::new(store.clone(), config.jwt_secret.clone(), config.jwt_expiry_seconds);
        if let Some(client_id) = &config.google_client_id {
            auth = auth.with_google(client_id.clone(), config.google_tokeninfo_url.clone());
        }

        Self {
            store,
            blobs,
            redis,
            config,
            plans,
            schools,
            auth,
        }
    }
}

fn cors_layer(base_url: String) -> CorsLayer {
    // Local development origins are always allowed.
    let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        o.starts_with("http://localhost")
            || o.starts_with("http://127.0.0.1")
            || o == base_url.trim_end_matches('/')
    });

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
        .allow_origin(origin)
}

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/federated", post(routes::auth::federated_login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/config", get(routes::auth::client_config))
        // Plan catalog
        .route("/plans", get(routes::plans::list_plans))
        .route("/plans/{key}", put(routes::plans::update_plan))
        // Schools
        .route("/schools", get(routes::schools::list_schools).post(routes::schools::create_school))
        .route("/schools/live", get(routes::websocket::ws_handler))
        .route(
            "/schools/{id}",
            get(routes::schools::get_school)
                .put(routes::schools::update_school)
                .delete(routes::schools::delete_school),
        )
        // Uploaded logos
        .route("/assets/{*key}", get(routes::assets::serve_asset));

    let mut app = Router::new().nest("/api", api);
    for path in [
        "/", "/index.html", "/login", "/login.html", "/dashboard", "/dashboard.html",
        "/register", "/register.html", "/features", "/features.html",
    ] {
        app = app.route(path, get(routes::pages::serve_page));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.app_base_url.clone()))
        // Room for the logo plus the text fields of the registration form
        .layer(DefaultBodyLimit::max(config.max_logo_bytes + 1024 * 1024))
        .with_state(state)
}
