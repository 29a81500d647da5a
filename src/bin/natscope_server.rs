//! NAT detection signaling server
//!
//! Run with:
//!   cargo run --features webrtc-engine --bin natscope-server -- --port 3000
//!
//! With TLS:
//!   cargo run --features webrtc-engine --bin natscope-server -- --port 8443 --cert cert.pem --key key.pem

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use natscope::config::{parse_stun_urls, ServerConfig, DEFAULT_PORT, DEFAULT_WS_PATH};
use natscope::engine::WebRtcFactory;
use natscope::SignalingServer;

/// Signaling server that infers the client's NAT type from an ICE negotiation
#[derive(Parser, Debug)]
#[command(name = "natscope-server")]
#[command(about = "Heuristic NAT type detection over WebRTC signaling")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Path accepted for WebSocket upgrades
    #[arg(long, env = "WS_PATH", default_value = DEFAULT_WS_PATH)]
    ws_path: String,

    /// Comma separated STUN URLs (defaults to public Google/Twilio servers)
    #[arg(long, env = "STUN_URLS")]
    stun_urls: Option<String>,

    /// Log filter, e.g. "info" or "natscope=debug"
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    check_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn open_pem(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .with_context(|| format!("opening {}", path.display()))
}

/// Build a TLS acceptor from a PEM certificate chain and a PEM private key
/// (PKCS#1, PKCS#8 or SEC1; the first key in the file wins)
fn tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let chain = rustls_pemfile::certs(&mut open_pem(cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading certificates from {}", cert_path.display()))?;
    if chain.is_empty() {
        bail!("no certificates in {}", cert_path.display());
    }

    let key = rustls_pemfile::private_key(&mut open_pem(key_path)?)
        .with_context(|| format!("reading private key from {}", key_path.display()))?
        .ok_or_else(|| anyhow!("no private key in {}", key_path.display()))?;

    let identity = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .context("certificate and key do not form a TLS identity")?;
    Ok(TlsAcceptor::from(Arc::new(identity)))
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(event = "server.sigterm", "Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("invalid log level {:?}", args.log_level))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = ServerConfig::new(
        args.host.clone(),
        args.port,
        args.ws_path.clone(),
        parse_stun_urls(args.stun_urls.as_deref()),
    )?;

    if args.check_config {
        let payload = serde_json::json!({
            "ok": true,
            "note": "RFC 5780 probing requires a TURN server with OTHER-ADDRESS support. This check validates configuration only.",
            "stun_urls": config.stun_urls,
            "listen": config.bind_addr()?.to_string(),
            "ws_path": config.ws_path,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let acceptor = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            info!("TLS enabled with cert: {:?}, key: {:?}", cert, key);
            Some(tls_acceptor(cert, key)?)
        }
        (Some(_), None) | (None, Some(_)) => {
            bail!("Both --cert and --key must be provided for TLS");
        }
        (None, None) => {
            warn!("TLS disabled - running in plain WebSocket mode");
            None
        }
    };

    info!("STUN servers: {}", config.stun_urls.join(", "));

    let factory = Arc::new(WebRtcFactory::new()?);
    let mut server = SignalingServer::new(config, factory);
    if let Some(acceptor) = acceptor {
        info!("Protocol: wss:// (WebSocket Secure)");
        server = server.with_tls(acceptor);
    } else {
        info!("Protocol: ws:// (WebSocket)");
    }

    server.run_until(shutdown_signal()).await?;

    Ok(())
}
