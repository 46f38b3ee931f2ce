//! routemux demo server.
//!
//! # Route Tree
//!
//! ```text
//! global chain: request logger
//! │
//! ├── GET  /                 plain text greeting
//! ├── GET  /favicon.ico      --favicon file (when given)
//! ├── ANY  /static/...       files under --static-dir, gzip when accepted
//! │
//! ├── /api    chain: api marker
//! │   ├── GET  /api/status   JSON status
//! │   └── POST /api/echo     echoes the request body as JSON
//! │
//! └── /auth   chain: session lookup
//!     ├── POST /auth/login   starts a session
//!     ├── POST /auth/logout  ends the session
//!     └── GET  /auth/me      shows the session token
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use routemux::config::{load_config, RouterConfig};
use routemux::lifecycle::{signals, Shutdown};
use routemux::observability::{logging, metrics};
use routemux::{Chain, Context, Group};

const SESSION_COOKIE: &str = "routemux_session";

#[derive(Parser)]
#[command(name = "routemux")]
#[command(about = "Group-based HTTP router demo server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory served under /static/.
    #[arg(long, default_value = "public")]
    static_dir: PathBuf,

    /// Favicon file served at /favicon.ico.
    #[arg(long)]
    favicon: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("routemux v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let root = Group::with_config(config);
    build_routes(&root, &cli.static_dir, cli.favicon)?;

    let listener = TcpListener::bind(&bind_address).await?;
    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));
    root.server().run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_routes(
    root: &Group,
    static_dir: &std::path::Path,
    favicon: Option<PathBuf>,
) -> Result<(), routemux::RouterError> {
    root.use_middleware(|ctx: Context| async move {
        ctx.set_value("started", Instant::now());
        tracing::info!(method = %ctx.method(), path = %ctx.path(), "Request");
    });

    root.get("/", |ctx: Context| async move {
        ctx.write("Hello from routemux\n");
    })?;
    root.serve_files("/static/", static_dir, "/static")?;
    if let Some(favicon) = favicon {
        root.serve_favicon(favicon)?;
    }

    let api = root.group_with(
        "/api",
        Chain::new().with(|ctx: Context| async move {
            let _ = ctx.set_header("x-api-version", "1");
        }),
    )?;
    api.get("/status", |ctx: Context| async move {
        let uptime_us = ctx
            .value::<Instant>("started")
            .ok()
            .flatten()
            .map(|started| started.elapsed().as_micros() as u64)
            .unwrap_or_default();
        let _ = ctx.write_json(&json!({ "status": "ok", "dispatch_us": uptime_us }));
    })?;
    api.post("/echo", |ctx: Context| async move {
        let body = String::from_utf8_lossy(ctx.body()).into_owned();
        let _ = ctx.write_json(&json!({ "echo": body }));
    })?;

    let auth = root.group_with(
        "/auth",
        Chain::new().with(|ctx: Context| async move {
            if let Ok(session) = ctx.get_session(SESSION_COOKIE) {
                ctx.set_value("session", session);
            }
        }),
    )?;
    auth.post("/login", |ctx: Context| async move {
        match ctx.new_session(SESSION_COOKIE) {
            Ok(session) => {
                let _ = ctx.write_json(&json!({ "token": session.token }));
            }
            Err(e) => tracing::error!(error = %e, "Failed to start session"),
        }
    })?;
    auth.post("/logout", |ctx: Context| async move {
        if let Err(e) = ctx.delete_session(SESSION_COOKIE) {
            tracing::error!(error = %e, "Failed to end session");
        }
        ctx.write("bye\n");
    })?;
    auth.get("/me", |ctx: Context| async move {
        match ctx.value::<routemux::Session>("session") {
            Ok(Some(session)) => {
                let _ = ctx.write_json(&json!({ "token": session.token }));
            }
            _ => {
                ctx.set_status(axum::http::StatusCode::UNAUTHORIZED);
                ctx.write("no session\n");
            }
        }
    })?;

    Ok(())
}
