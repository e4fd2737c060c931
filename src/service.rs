use crate::config::{credentials_path, AppConfig};
use crate::credentials::{resolve_sources, CredentialStore};
use crate::error::AppError;
use crate::format::{format_updated_ago, tooltip};
use crate::models::QuotaSnapshot;
use crate::quota::QuotaClient;
use chrono::Utc;
use reqwest::Client;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const UPDATED_TICK: Duration = Duration::from_secs(1);

pub struct QuotaService {
    quota: Arc<QuotaClient>,
    poll_interval: Duration,
}

impl QuotaService {
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.request_timeout_seconds))
            .build()?;

        let path = credentials_path(cfg);
        let credentials = CredentialStore::new(resolve_sources(cfg.credential_source, &path))?;
        let quota = QuotaClient::new(
            credentials,
            client,
            cfg.usage_url()?,
            cfg.windows.to_projection_windows(),
        );

        Ok(Self {
            quota: Arc::new(quota),
            poll_interval: Duration::from_secs(cfg.poll_interval_seconds),
        })
    }

    pub async fn check(&self) -> (bool, QuotaSnapshot) {
        let ok = self.quota.fetch().await;
        (ok, self.quota.state())
    }

    /// Polls until Ctrl-C. Alongside the poller, one task redraws the
    /// "Updated" line every second and another refreshes on each stdin line.
    /// Shutdown stops new fetches; a fetch already running completes.
    pub async fn watch(self) -> Result<(), AppError> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let tasks: Vec<JoinHandle<()>> = vec![
            tokio::spawn(poll_loop(
                Arc::clone(&self.quota),
                self.poll_interval,
                stop_rx.clone(),
            )),
            tokio::spawn(updated_ticker(Arc::clone(&self.quota), stop_rx.clone())),
            tokio::spawn(manual_refresh(Arc::clone(&self.quota), stop_rx)),
        ];

        tokio::signal::ctrl_c().await?;
        info!("signal received, shutting down");
        let _ = stop_tx.send(true);

        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "watch task ended abnormally");
            }
        }
        Ok(())
    }
}

fn render(quota: &QuotaClient) {
    println!("\n{}", tooltip(&quota.state(), Utc::now()));
}

async fn poll_loop(quota: Arc<QuotaClient>, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                quota.fetch().await;
                render(&quota);
            }
        }
    }
}

async fn updated_ticker(quota: Arc<QuotaClient>, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(UPDATED_TICK);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let line = format_updated_ago(quota.state().last_update, Utc::now());
                let _ = write_status_line(&mut std::io::stdout().lock(), &line);
            }
        }
    }
}

/// Redraws the status line in place. Goes to stdout with the quota text so
/// log output on stderr never lands inside it.
fn write_status_line(out: &mut impl Write, line: &str) -> std::io::Result<()> {
    write!(out, "\r{line}   ")?;
    out.flush()
}

/// Stdin is read on a plain thread so a pending read never holds up runtime
/// shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

async fn manual_refresh(quota: Arc<QuotaClient>, mut stop: watch::Receiver<bool>) {
    let mut requests = spawn_stdin_reader();
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            request = requests.recv() => match request {
                Some(()) => {
                    debug!("manual refresh requested");
                    quota.fetch().await;
                    render(&quota);
                }
                // stdin closed: keep the other loops running
                None => {
                    let _ = stop.changed().await;
                    break;
                }
            },
        }
    }
}
