//! Plain-text rendering of a snapshot for the terminal.

use crate::models::{BucketKind, BucketState, QuotaSnapshot};
use chrono::{DateTime, Local, Utc};

pub fn format_time_remaining(target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(target) = target else {
        return "unknown".into();
    };
    let delta = target - now;
    if delta < chrono::Duration::zero() {
        return "now".into();
    }

    let total_secs = delta.num_seconds();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Local weekday and time, e.g. "Fri 14:30".
pub fn format_reset_date(target: Option<DateTime<Utc>>) -> String {
    target
        .map(|t| t.with_timezone(&Local).format("%a %H:%M").to_string())
        .unwrap_or_default()
}

pub fn format_updated_ago(last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last_update) = last_update else {
        return "Updated: --".into();
    };
    let total_secs = (now - last_update).num_seconds().max(0);
    if total_secs < 60 {
        return format!("Updated: {total_secs}s ago");
    }
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes < 60 {
        return format!("Updated: {minutes}m {seconds}s ago");
    }
    format!("Updated: {}h {}m ago", minutes / 60, minutes % 60)
}

pub fn format_quota_line(label: &str, bucket: &BucketState, now: DateTime<Utc>) -> String {
    let Some(utilization) = bucket.utilization else {
        return format!("{label}: --");
    };
    let date = format_reset_date(bucket.resets_at);
    if date.is_empty() {
        return format!("{label}: {utilization:.0}%");
    }
    let remaining = format_time_remaining(bucket.resets_at, now);
    format!("{label}: {utilization:.0}% (resets in {remaining}, {date})")
}

pub fn format_projection_line(projected: Option<f64>) -> Option<String> {
    projected.map(|p| format!("  - ~{p:.0}% at reset"))
}

pub fn format_saturation_line(
    saturation: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<String> {
    saturation.map(|s| {
        format!(
            "  - saturates in {}, {}",
            format_time_remaining(Some(s), now),
            format_reset_date(Some(s))
        )
    })
}

pub fn tooltip(snapshot: &QuotaSnapshot, now: DateTime<Utc>) -> String {
    let mut lines = vec!["Claude Quota".to_string()];

    if let Some(error) = &snapshot.error {
        lines.push(format!("Error: {error}"));
        if snapshot.token_expired {
            lines.push("Run 'claude login' to re-authenticate".into());
        }
    } else {
        for kind in BucketKind::ALL {
            let bucket = snapshot.bucket(kind);
            if bucket.utilization.is_none() {
                continue;
            }
            lines.push(format_quota_line(kind.as_label(), bucket, now));
            lines.extend(format_projection_line(bucket.projected));
            lines.extend(format_saturation_line(bucket.saturation, now));
        }
    }

    lines.push(format_updated_ago(snapshot.last_update, now));
    lines.join("\n")
}
