use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use cardio_core::{
    CardioServices, ClerkConfig, ClerkProvisioner, CoreConfig, IdentityProvisioner,
    InMemoryProvisioner, ServiceOptions, UnconfiguredProvisioner, resolve_data_dir,
};

/// Main entry point for the Cardio server
///
/// Resolves configuration once, opens the data directory and serves the REST API with
/// OpenAPI/Swagger documentation.
///
/// # Environment Variables
/// - `CARDIO_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CARDIO_DATA_DIR`: Directory for all persisted rows and files (default: "cardio_data")
/// - `CARDIO_PUBLIC_URL`: Externally reachable base URL, used for image links
///   (default: "http://localhost:3000")
/// - `ADMIN_API_KEY`: Key required in the `x-api-key` header of `/admin` routes
/// - `CLERK_SECRET_KEY`: Identity provider secret; without it approvals are refused
/// - `CARDIO_DEV_IDENTITY`: Set to `1` to approve against an in-memory provisioner instead
/// - `CLERK_API_URL`: Identity provider base URL (default: "https://api.clerk.com/v1")
/// - `HOSTING_URL`: Where invitation emails redirect to
/// - `IDENTITY_TIMEOUT_SECS`: Per-call identity provider timeout (default: 10)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the data directory cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cardio_run=info".parse()?)
                .add_directive("cardio_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CARDIO_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = resolve_data_dir(std::env::var("CARDIO_DATA_DIR").ok());
    let public_url =
        std::env::var("CARDIO_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let cfg = Arc::new(CoreConfig::new(data_dir, public_url)?);

    let admin_api_key = std::env::var("ADMIN_API_KEY").unwrap_or_default();
    if admin_api_key.trim().is_empty() {
        tracing::warn!("ADMIN_API_KEY not set; admin routes will reject every request");
    }

    let identity_timeout = match std::env::var("IDENTITY_TIMEOUT_SECS") {
        Ok(secs) => Duration::from_secs(secs.trim().parse()?),
        Err(_) => cardio_core::constants::DEFAULT_IDENTITY_TIMEOUT,
    };

    let identity: Arc<dyn IdentityProvisioner> = match std::env::var("CLERK_SECRET_KEY") {
        Ok(secret) if !secret.trim().is_empty() => {
            let api_url = std::env::var("CLERK_API_URL")
                .unwrap_or_else(|_| "https://api.clerk.com/v1".into());
            let config = ClerkConfig::new(api_url, secret)?
                .with_redirect_url(std::env::var("HOSTING_URL").ok())
                .with_timeout(identity_timeout);
            Arc::new(ClerkProvisioner::new(config)?)
        }
        _ if dev_identity_enabled() => {
            tracing::warn!(
                "CARDIO_DEV_IDENTITY=1; using the in-memory identity provisioner, approvals \
                 will not create real accounts"
            );
            Arc::new(InMemoryProvisioner::new())
        }
        _ => {
            tracing::warn!("CLERK_SECRET_KEY not set; approving applications is disabled");
            Arc::new(UnconfiguredProvisioner)
        }
    };

    let services = CardioServices::open(
        cfg.clone(),
        identity,
        ServiceOptions {
            identity_timeout,
            ..ServiceOptions::default()
        },
    )?;

    tracing::info!(
        data_dir = %cfg.data_dir().display(),
        public_url = cfg.public_url(),
        "++ Starting Cardio REST on {}",
        rest_addr
    );

    let app = api_rest::router(AppState::new(services, cfg, admin_api_key.trim()));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down Cardio REST");
        })
        .await?;

    Ok(())
}

/// Throwaway identities are opt-in for local development only.
fn dev_identity_enabled() -> bool {
    std::env::var("CARDIO_DEV_IDENTITY").is_ok_and(|v| v.trim() == "1")
}
