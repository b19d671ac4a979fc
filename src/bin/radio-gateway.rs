//! Radio Gateway Application
//!
//! Joins the daemon's status group, relays audio and spectrum to browsers
//! and serves the web interface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_web_gateway::{
    config::GatewayConfig,
    gateway::{
        audio::{run_audio_loop, wait_for_audio_group},
        bridge::run_status_loop,
        Control, Gateway, Settings,
    },
    network::{connect_mcast, formatsock, listen_mcast, resolve_mcast, DEFAULT_RTP_PORT, DEFAULT_STAT_PORT},
    ui::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let mut config = GatewayConfig::load(path.as_deref()).context("loading configuration")?;

    let default_level = match config.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting radio gateway {}", env!("CARGO_PKG_VERSION"));
    config.validate().context("invalid configuration")?;

    let net = &config.network;
    let (status_group, iface) = resolve_mcast(&net.status_group, DEFAULT_STAT_PORT, net.resolve_tries)
        .with_context(|| format!("resolving status group {}", net.status_group))?;
    let status_socket = listen_mcast(None, &status_group, iface.as_deref())
        .with_context(|| format!("listening on {}", formatsock(&status_group, false)))?;
    let control_socket = connect_mcast(&status_group, iface.as_deref(), net.ttl, net.tos)
        .with_context(|| format!("opening control socket to {}", formatsock(&status_group, false)))?;
    tracing::info!(
        "Status and control on {} (interface {})",
        formatsock(&status_group, true),
        iface.as_deref().unwrap_or("default")
    );

    let fixed_audio: Option<SocketAddr> = match &net.audio_group {
        Some(target) => Some(
            resolve_mcast(target, DEFAULT_RTP_PORT, 2)
                .with_context(|| format!("resolving audio group {}", target))?
                .0,
        ),
        None => None,
    };

    let (gateway, audio_rx) = Gateway::new(Control::new(control_socket), Settings::from(&config));

    let status_thread = {
        let gateway = gateway.clone();
        thread::Builder::new()
            .name("status".into())
            .spawn(move || run_status_loop(gateway, status_socket))
            .context("spawning status thread")?
    };

    let audio_thread = {
        let gateway = gateway.clone();
        thread::Builder::new()
            .name("audio".into())
            .spawn(move || {
                let group = match fixed_audio {
                    Some(group) => group,
                    None => match wait_for_audio_group(&gateway, &audio_rx) {
                        Some(group) => group,
                        None => return,
                    },
                };
                if let Err(e) = run_audio_loop(gateway, group) {
                    tracing::error!("Audio relay failed: {}", e);
                }
            })
            .context("spawning audio thread")?
    };

    let shutdown = {
        let gateway = gateway.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            gateway.shutdown();
        }
    };

    tracing::info!(
        "Web UI available at http://{}:{}",
        config.ui.bind_address,
        config.ui.http_port
    );
    let served = WebServer::new(config.ui.clone(), gateway.clone())
        .run(shutdown)
        .await;
    gateway.shutdown();

    // release any daemon channels still held, then wait for the loops
    tokio::task::spawn_blocking(move || {
        for session in gateway.registry().sessions() {
            gateway.close_session(&session.connection);
        }
        if status_thread.join().is_err() {
            tracing::error!("Status thread panicked");
        }
        if audio_thread.join().is_err() {
            tracing::error!("Audio thread panicked");
        }
    })
    .await
    .context("joining gateway threads")?;

    served.context("web server failed")?;
    tracing::info!("Radio gateway stopped");
    Ok(())
}
