//! Burn-rate extrapolation over a single usage sample.
//!
//! Each bucket is modelled as a fixed-length window that ends at `resets_at`.
//! The elapsed part of the window is `window - (resets_at - now)`, and the
//! observed average rate over that part is carried forward linearly. Nothing
//! here reads the clock; callers pass `now`.

use crate::models::BucketKind;
use chrono::{DateTime, Duration, Utc};

/// Window length per bucket. The API only reports the reset time, so the
/// length has to be configured. `None` disables projection for that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionWindows {
    pub five_hour: Option<Duration>,
    pub seven_day: Option<Duration>,
    pub seven_day_sonnet: Option<Duration>,
}

impl Default for ProjectionWindows {
    fn default() -> Self {
        Self {
            five_hour: Some(Duration::hours(5)),
            seven_day: Some(Duration::days(7)),
            seven_day_sonnet: None,
        }
    }
}

impl ProjectionWindows {
    pub fn window(&self, kind: BucketKind) -> Option<Duration> {
        match kind {
            BucketKind::FiveHour => self.five_hour,
            BucketKind::SevenDay => self.seven_day,
            BucketKind::SevenDaySonnet => self.seven_day_sonnet,
        }
    }
}

fn elapsed_in_window(
    current: f64,
    resets_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<Duration> {
    if !current.is_finite() || current <= 0.0 || resets_at <= now || window <= Duration::zero() {
        return None;
    }
    let elapsed = window - (resets_at - now);
    if elapsed <= Duration::zero() {
        return None;
    }
    Some(elapsed)
}

/// Utilization expected at `resets_at` if the average rate so far holds.
///
/// Returns `None` for zero usage, a reset at or before `now`, or a window that
/// has not started yet (`resets_at - now >= window`). The result is not capped:
/// anything above 100 means the bucket runs out before it resets.
pub fn project_utilization(
    current: f64,
    resets_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<f64> {
    let elapsed = elapsed_in_window(current, resets_at, now, window)?;
    let elapsed_ms = elapsed.num_milliseconds();
    if elapsed_ms <= 0 {
        return None;
    }
    Some(current * window.num_milliseconds() as f64 / elapsed_ms as f64)
}

/// Wall-clock time at which utilization reaches 100 at the average rate so
/// far, or `None` if that happens only after the reset.
pub fn compute_saturation_time(
    current: f64,
    resets_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<DateTime<Utc>> {
    if current >= 100.0 {
        return None;
    }
    let elapsed = elapsed_in_window(current, resets_at, now, window)?;

    // (100 - current) / (current / elapsed)
    let to_saturation_ms = elapsed.num_milliseconds() as f64 * (100.0 - current) / current;
    let until_reset_ms = (resets_at - now).num_milliseconds() as f64;
    if !to_saturation_ms.is_finite() || to_saturation_ms >= until_reset_ms {
        return None;
    }
    let saturation =
        now.checked_add_signed(Duration::milliseconds(to_saturation_ms.round() as i64))?;
    if saturation >= resets_at {
        return None;
    }
    Some(saturation)
}
