use crate::credentials::CredentialStore;
use crate::error::AppError;
use crate::models::{BucketKind, BucketState, QuotaSnapshot, UsageBucket, UsageResponse};
use crate::projection::{compute_saturation_time, project_utilization, ProjectionWindows};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};
use url::Url;

const CLIENT_USER_AGENT: &str = "claude-code/2.0.31";
const OAUTH_BETA_HEADER: &str = "oauth-2025-04-20";

/// Error text stored in snapshots is cut to this many characters.
pub const ERROR_MESSAGE_BUDGET: usize = 50;

/// Truncates to at most `max_chars` characters without splitting one.
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn parse_bucket(kind: BucketKind, bucket: &UsageBucket) -> BucketState {
    let resets_at = bucket.resets_at.as_deref().and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                warn!(bucket = kind.as_key(), raw, error = %e, "failed to parse reset time");
                None
            }
        }
    });
    BucketState {
        utilization: bucket.utilization,
        resets_at,
        ..BucketState::default()
    }
}

/// Turns a decoded usage body into a data snapshot stamped with `now`.
///
/// Projection runs only for buckets that carry both a utilization and a reset
/// time and have a configured window; saturation only when the projection
/// goes over 100.
pub fn build_snapshot(
    data: &UsageResponse,
    now: DateTime<Utc>,
    windows: &ProjectionWindows,
) -> QuotaSnapshot {
    let mut snapshot = QuotaSnapshot {
        last_update: Some(now),
        ..QuotaSnapshot::default()
    };

    for kind in BucketKind::ALL {
        let Some(bucket) = data.bucket(kind) else {
            continue;
        };
        let mut state = parse_bucket(kind, bucket);

        if let (Some(current), Some(resets_at), Some(window)) =
            (state.utilization, state.resets_at, windows.window(kind))
        {
            state.projected = project_utilization(current, resets_at, now, window);
            if state.projected.is_some_and(|p| p > 100.0) {
                state.saturation = compute_saturation_time(current, resets_at, now, window);
            }
        }

        *snapshot.bucket_mut(kind) = state;
    }

    snapshot
}

/// Owns the latest published snapshot and runs fetch cycles against the usage
/// endpoint.
///
/// Concurrent `fetch` calls are not sequenced: whichever finishes last
/// installs its snapshot. `state` never waits on network I/O.
pub struct QuotaClient {
    state: RwLock<QuotaSnapshot>,
    credentials: Arc<CredentialStore>,
    client: Client,
    endpoint: Url,
    windows: ProjectionWindows,
}

impl QuotaClient {
    pub fn new(
        credentials: CredentialStore,
        client: Client,
        endpoint: Url,
        windows: ProjectionWindows,
    ) -> Self {
        Self {
            state: RwLock::new(QuotaSnapshot::default()),
            credentials: Arc::new(credentials),
            client,
            endpoint,
            windows,
        }
    }

    pub fn state(&self) -> QuotaSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one fetch cycle and publishes its outcome. Returns `true` when a
    /// data snapshot was published, `false` for an error snapshot.
    pub async fn fetch(&self) -> bool {
        match self.fetch_usage().await {
            Ok(data) => {
                let snapshot = build_snapshot(&data, Utc::now(), &self.windows);
                self.publish(snapshot);
                true
            }
            Err(e) => {
                warn!(error = %e, "quota fetch failed");
                let message = truncate(&e.to_string(), ERROR_MESSAGE_BUDGET).to_string();
                self.publish(QuotaSnapshot::failed(message, e.is_token_expired()));
                false
            }
        }
    }

    fn publish(&self, snapshot: QuotaSnapshot) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    async fn fetch_usage(&self) -> Result<UsageResponse, AppError> {
        let credentials = Arc::clone(&self.credentials);
        let token = tokio::task::spawn_blocking(move || credentials.token()).await??;

        let response = self
            .client
            .get(self.endpoint.clone())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header("anthropic-beta", OAUTH_BETA_HEADER)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(AppError::Unauthorized),
            StatusCode::FORBIDDEN => return Err(AppError::Forbidden),
            other => return Err(AppError::Status(other.as_u16())),
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "usage response received");
        Ok(serde_json::from_str(&body)?)
    }
}
