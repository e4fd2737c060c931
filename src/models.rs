use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One quota class reported by the usage endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    FiveHour,
    SevenDay,
    SevenDaySonnet,
}

impl BucketKind {
    pub const ALL: [BucketKind; 3] = [
        BucketKind::FiveHour,
        BucketKind::SevenDay,
        BucketKind::SevenDaySonnet,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            BucketKind::FiveHour => "five_hour",
            BucketKind::SevenDay => "seven_day",
            BucketKind::SevenDaySonnet => "seven_day_sonnet",
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            BucketKind::FiveHour => "5h",
            BucketKind::SevenDay => "7d",
            BucketKind::SevenDaySonnet => "Sonnet 7d",
        }
    }
}

/// Body of the usage endpoint. Keys other than the tracked buckets are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageResponse {
    pub five_hour: Option<UsageBucket>,
    pub seven_day: Option<UsageBucket>,
    pub seven_day_sonnet: Option<UsageBucket>,
}

impl UsageResponse {
    pub fn bucket(&self, kind: BucketKind) -> Option<&UsageBucket> {
        match kind {
            BucketKind::FiveHour => self.five_hour.as_ref(),
            BucketKind::SevenDay => self.seven_day.as_ref(),
            BucketKind::SevenDaySonnet => self.seven_day_sonnet.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageBucket {
    pub utilization: Option<f64>,
    pub resets_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketState {
    pub utilization: Option<f64>,
    pub resets_at: Option<DateTime<Utc>>,
    /// Utilization extrapolated to the reset time. Not capped at 100.
    pub projected: Option<f64>,
    pub saturation: Option<DateTime<Utc>>,
}

/// Result of one fetch cycle. Either an error snapshot (`error` set, every
/// bucket empty) or a data snapshot (`error` unset).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub five_hour: BucketState,
    pub seven_day: BucketState,
    pub seven_day_sonnet: BucketState,
    pub last_update: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub token_expired: bool,
}

impl QuotaSnapshot {
    pub fn failed(message: impl Into<String>, token_expired: bool) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "unknown error".into();
        }
        Self {
            error: Some(message),
            token_expired,
            ..Self::default()
        }
    }

    pub fn bucket(&self, kind: BucketKind) -> &BucketState {
        match kind {
            BucketKind::FiveHour => &self.five_hour,
            BucketKind::SevenDay => &self.seven_day,
            BucketKind::SevenDaySonnet => &self.seven_day_sonnet,
        }
    }

    pub fn bucket_mut(&mut self, kind: BucketKind) -> &mut BucketState {
        match kind {
            BucketKind::FiveHour => &mut self.five_hour,
            BucketKind::SevenDay => &mut self.seven_day,
            BucketKind::SevenDaySonnet => &mut self.seven_day_sonnet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_response_ignores_unknown_and_null_buckets() {
        let parsed: UsageResponse = serde_json::from_str(
            r#"{
                "five_hour": {"utilization": 12.0, "resets_at": null},
                "seven_day": null,
                "seven_day_opus": {"utilization": 99.0},
                "extra_usage": {"is_enabled": false}
            }"#,
        )
        .expect("body should parse");

        let five = parsed.bucket(BucketKind::FiveHour).expect("five_hour");
        assert_eq!(five.utilization, Some(12.0));
        assert!(five.resets_at.is_none());
        assert!(parsed.bucket(BucketKind::SevenDay).is_none());
        assert!(parsed.bucket(BucketKind::SevenDaySonnet).is_none());
    }

    #[test]
    fn failed_snapshot_carries_no_quota_data() {
        let snap = QuotaSnapshot::failed("HTTP 500", false);
        assert!(snap.error.is_some());
        assert!(!snap.token_expired);
        for kind in BucketKind::ALL {
            assert_eq!(snap.bucket(kind), &BucketState::default());
        }
        assert!(snap.last_update.is_none());
    }

    #[test]
    fn failed_snapshot_never_has_empty_message() {
        let snap = QuotaSnapshot::failed("", true);
        assert_eq!(snap.error.as_deref(), Some("unknown error"));
        assert!(snap.token_expired);
    }
}
