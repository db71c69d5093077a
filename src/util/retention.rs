use crate::restic::ForgetOptions;

/// Configure which snapshots survive `restic forget`.
///
/// Every rule is additive: a snapshot is kept as soon as one rule selects it.
/// Unset rules select nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    /// Defines how many of the latest snapshots to keep.
    pub last: Option<u32>,

    /// Defines how many hourly snapshots to keep.
    ///
    /// An hourly snapshot is the last snapshot of the hour.
    pub hourly: Option<u32>,

    /// Defines how many daily snapshots to keep.
    ///
    /// A daily snapshot is the last snapshot of the day.
    pub daily: Option<u32>,

    /// Defines how many weekly snapshots to keep.
    pub weekly: Option<u32>,

    /// Defines how many monthly snapshots to keep.
    pub monthly: Option<u32>,

    /// Defines how many yearly snapshots to keep.
    pub yearly: Option<u32>,

    /// Keep all snapshots younger than this duration, e.g. `2y5m7d3h`.
    pub within: Option<String>,

    /// Keep all snapshots carrying one of these tags.
    pub tags: Vec<String>,
}

impl RetentionConfig {
    /// Whether no rule is configured, forgetting would remove every snapshot.
    pub fn is_empty(&self) -> bool {
        !ForgetOptions::from(self).has_policy()
    }
}

impl From<&RetentionConfig> for ForgetOptions {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            keep_last: config.last.unwrap_or_default(),
            keep_hourly: config.hourly.unwrap_or_default(),
            keep_daily: config.daily.unwrap_or_default(),
            keep_weekly: config.weekly.unwrap_or_default(),
            keep_monthly: config.monthly.unwrap_or_default(),
            keep_yearly: config.yearly.unwrap_or_default(),
            keep_within: config.within.clone().unwrap_or_default(),
            keep_tags: config.tags.clone(),
            ..Default::default()
        }
    }
}
