//! Roomlink daemon
//!
//! Startup: configuration → bridge (devices, mixer) → broadcaster →
//! HTTP/WebSocket server. Runs until interrupt/terminate or until a
//! cable disappears, then tears down in reverse order.
//!
//! Exit codes: 0 on signal-driven shutdown, 1 on startup failure or
//! runtime device loss.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roomlink_core::{list_devices, Bridge, BridgeConfig, BridgeEvent};
use roomlink_server::broadcast::spawn_broadcaster;
use roomlink_server::http::router;
use roomlink_server::ServerState;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config_path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--list-devices" => return print_devices(),
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other => config_path = Some(PathBuf::from(other)),
        }
    }

    match run(config_path) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("roomlink: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("usage: roomlink [roomlink.json]");
    println!("       roomlink --list-devices");
}

/// Print the host's devices so operators can fill in the cable indices.
fn print_devices() -> ExitCode {
    match list_devices() {
        Ok(devices) => {
            println!("{:>5}  {:<48} {:>3} {:>3} {:>8}", "index", "name", "in", "out", "rate");
            for d in devices {
                println!(
                    "{:>5}  {:<48} {:>3} {:>3} {:>8}",
                    d.index, d.name, d.input_channels, d.output_channels, d.default_sample_rate
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("roomlink: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let config = BridgeConfig::load(config_path.as_deref()).context("loading configuration")?;

    let mut bridge = Bridge::new(config.clone()).context("initializing audio bridge")?;
    bridge.start().context("starting audio bridge")?;

    let state = Arc::new(ServerState::new(
        &config,
        bridge.downlink_queue(),
        bridge.browser_ring(),
        bridge.levels(),
    ));
    let broadcaster =
        spawn_broadcaster(Arc::clone(&state)).context("spawning downlink broadcaster")?;

    // Forward fatal bridge events into the async shutdown select
    let events = bridge.events();
    let (fatal_tx, fatal_rx) = mpsc::channel::<BridgeEvent>(1);
    let watcher = std::thread::Builder::new()
        .name("roomlink-events".into())
        .spawn(move || {
            while let Ok(event) = events.recv() {
                if let BridgeEvent::StreamError { endpoint, message } = &event {
                    warn!(endpoint, message, "stream error reported");
                }
                if event.is_fatal() {
                    let _ = fatal_tx.blocking_send(event);
                    break;
                }
            }
        })
        .context("spawning event watcher")?;

    let runtime = tokio::runtime::Runtime::new().context("building async runtime")?;
    let device_lost = runtime.block_on(serve(&config, Arc::clone(&state), fatal_rx))?;

    // Teardown in reverse order of startup
    state.running.store(false, Ordering::SeqCst);
    let _ = broadcaster.join();
    bridge.stop();
    drop(bridge); // closes the event channel so the watcher exits
    let _ = watcher.join();

    if device_lost {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Serve HTTP/WebSocket until a signal or a fatal bridge event.
///
/// Returns whether shutdown was caused by device loss.
async fn serve(
    config: &BridgeConfig,
    state: Arc<ServerState>,
    mut fatal_rx: mpsc::Receiver<BridgeEvent>,
) -> anyhow::Result<bool> {
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr} (port already in use?)"))?;
    info!("listening on http://{addr}");

    let device_lost = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&device_lost);

    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received - shutting down"),
            _ = terminate() => info!("terminate received - shutting down"),
            Some(event) = fatal_rx.recv() => {
                error!(?event, "audio device lost - shutting down");
                flag.store(true, Ordering::SeqCst);
            }
        }

        // Further signals while draining are ignored
        tokio::spawn(async {
            loop {
                let _ = tokio::signal::ctrl_c().await;
                info!("already shutting down");
            }
        });
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    Ok(device_lost.load(Ordering::SeqCst))
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
