//! Identity Service Server
//!
//! Wires the configured backends into the HTTP API: Postgres when
//! `DATABASE_URL` is set, in-memory stores otherwise; SMTP delivery when
//! `SMTP_HOST` is set, logged delivery otherwise; Google sign-in when its
//! client credentials are present.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use dotenv::dotenv;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use identity_service::{
    api::{AppState, RouterBuilder},
    config::{AppConfig, ServerConfig},
    database::run_migrations,
    service::{
        AuthService, EmailGateway, GoogleIdentityProvider, IdentityReconciler,
        InMemoryUserDirectory, JwtService, LogEmailGateway, OAuthService, OAuthStateManager,
        OtpService, PgUserDirectory, SmtpEmailGateway, UserDirectory,
    },
    store::{EphemeralStore, MemoryStore, PgEphemeralStore},
    utils::security::{OsSecretGenerator, SecretGenerator},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    env_logger::init();

    log::info!("🚀 Starting Identity Service v{}", identity_service::VERSION);

    let config = AppConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    log::info!("✅ Configuration loaded and validated");
    if config.auth.execution_mode.is_development() {
        log::warn!("⚠️  Running in development mode: OTP codes are returned in API responses");
    }

    // Storage backends
    let (store, directory): (Arc<dyn EphemeralStore>, Arc<dyn UserDirectory>) =
        match &config.database {
            Some(db_config) => {
                let pool = db_config.create_pool().await?;

                log::info!("🔄 Running database migrations...");
                run_migrations(&pool).await?;
                log::info!("✅ Database migrations completed");

                (
                    Arc::new(PgEphemeralStore::new(pool.clone())),
                    Arc::new(PgUserDirectory::new(pool)),
                )
            }
            None => {
                log::warn!("⚠️  DATABASE_URL not set, using in-memory storage");
                (
                    Arc::new(MemoryStore::new()),
                    Arc::new(InMemoryUserDirectory::new()),
                )
            }
        };

    // Email delivery
    let (email_gateway, app_name): (Arc<dyn EmailGateway>, String) = match &config.email {
        Some(email_config) => {
            let app_name = email_config.from_name.clone();
            let gateway = SmtpEmailGateway::new(email_config.clone())?;
            log::info!("✅ SMTP email delivery via {}", email_config.smtp_host);
            (Arc::new(gateway), app_name)
        }
        None => {
            log::warn!("⚠️  SMTP not configured, verification emails will only be logged");
            (Arc::new(LogEmailGateway), "Identity Service".to_string())
        }
    };

    let secrets: Arc<dyn SecretGenerator> = Arc::new(OsSecretGenerator);

    // Core services
    let jwt_service = Arc::new(JwtService::new(store.clone(), &config.jwt));
    let otp_service = Arc::new(
        OtpService::new(
            store.clone(),
            email_gateway,
            secrets.clone(),
            config.auth.clone(),
        )
        .with_app_name(app_name),
    );
    let reconciler = Arc::new(IdentityReconciler::new(directory));
    let auth_service = Arc::new(AuthService::new(
        otp_service,
        reconciler.clone(),
        jwt_service.clone(),
    ));

    log::info!("✅ Core services initialized");

    // Optional Google sign-in
    let oauth_service = match &config.google {
        Some(google_config) => {
            let provider = GoogleIdentityProvider::new(
                google_config,
                &config.auth.redirect_uri,
                Duration::from_secs(config.auth.provider_timeout_seconds),
            )?;
            let states = OAuthStateManager::new(
                store.clone(),
                secrets,
                config.auth.state_ttl_seconds,
            );
            log::info!("✅ Google OAuth initialized");
            Some(Arc::new(OAuthService::new(
                states,
                Arc::new(provider),
                reconciler,
                jwt_service.clone(),
                config.auth.clone(),
            )))
        }
        None => {
            log::warn!("⚠️  Google OAuth not configured");
            None
        }
    };

    spawn_store_sweeper(store, config.server.store_sweep_interval_seconds);

    let has_oauth = oauth_service.is_some();
    let app_state = AppState {
        auth_service,
        jwt_service,
        oauth_service,
    };

    let app = RouterBuilder::with_all_routes()
        .google_oauth(has_oauth)
        .build()
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.server))
                .into_inner(),
        );

    log::info!("🔐 Authentication Methods Available:");
    log::info!("   ✅ Email + OTP (Passwordless)");
    log::info!("   ✅ Email + Password (OTP-verified registration)");
    if has_oauth {
        log::info!("   ✅ Google OAuth 2.0");
    } else {
        log::info!("   ❌ Google OAuth 2.0 (not configured)");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("🌐 Listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if server.cors_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("⚠️  Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Periodically drop expired entries; reads already ignore them
fn spawn_store_sweeper(store: Arc<dyn EphemeralStore>, interval_seconds: u64) {
    if interval_seconds == 0 {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => log::debug!("Purged {} expired store entries", purged),
                Err(e) => log::warn!("Store sweep failed: {}", e),
            }
        }
    });
}
