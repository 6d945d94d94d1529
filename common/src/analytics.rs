// Per-scholarship funnel analytics for the admin console

use crate::db::repositories::{ScholarshipEventRepository, UserScholarshipRepository};
use crate::errors::DatabaseError;
use crate::models::{EventType, ScholarshipStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;

/// Windows answered from the event log; anything else reads current statuses
pub const EVENT_WINDOWS: [&str; 3] = ["7", "30", "90"];
pub const DEFAULT_WINDOW: &str = "all";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FunnelCounts {
    pub interested: i64,
    pub applied: i64,
    pub accepted: i64,
    pub not_interested: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FunnelRates {
    pub applied_rate: i64,
    pub accepted_rate: i64,
}

impl FunnelRates {
    pub fn from_counts(counts: &FunnelCounts) -> Self {
        Self {
            applied_rate: percent(counts.applied, counts.interested),
            accepted_rate: percent(counts.accepted, counts.applied),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    Events,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScholarshipAnalytics {
    pub scholarship_id: String,
    pub counts: FunnelCounts,
    pub rates: FunnelRates,
    pub window: String,
    pub source: CountSource,
}

/// Whole percentage, ties to even; 0 when nothing to divide by
pub fn percent(part: i64, whole: i64) -> i64 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round_ties_even() as i64
}

/// Day count for an event-log window, None for the status view
pub fn event_window(days: &str) -> Option<i64> {
    match days {
        "7" => Some(7),
        "30" => Some(30),
        "90" => Some(90),
        _ => None,
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    events: ScholarshipEventRepository,
    scholarships: UserScholarshipRepository,
}

impl AnalyticsService {
    pub fn new(
        events: ScholarshipEventRepository,
        scholarships: UserScholarshipRepository,
    ) -> Self {
        Self { events, scholarships }
    }

    pub async fn scholarship(
        &self,
        scholarship_id: &str,
        days: Option<&str>,
    ) -> Result<ScholarshipAnalytics, DatabaseError> {
        self.scholarship_at(scholarship_id, days, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn scholarship_at(
        &self,
        scholarship_id: &str,
        days: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ScholarshipAnalytics, DatabaseError> {
        let window = days.unwrap_or(DEFAULT_WINDOW).to_string();

        let (counts, source) = match event_window(&window) {
            Some(days) => {
                let since = now - Duration::days(days);
                (self.event_counts(scholarship_id, since).await?, CountSource::Events)
            }
            None => (self.status_counts(scholarship_id).await?, CountSource::Status),
        };

        Ok(ScholarshipAnalytics {
            scholarship_id: scholarship_id.to_string(),
            rates: FunnelRates::from_counts(&counts),
            counts,
            window,
            source,
        })
    }

    async fn event_counts(
        &self,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<FunnelCounts, DatabaseError> {
        let events = &self.events;
        Ok(FunnelCounts {
            interested: events.count_users_since(key, EventType::Interest, since).await?,
            applied: events.count_users_since(key, EventType::Application, since).await?,
            accepted: events.count_users_since(key, EventType::Acceptance, since).await?,
            not_interested: events
                .count_users_since(key, EventType::NotInterested, since)
                .await?,
        })
    }

    async fn status_counts(&self, key: &str) -> Result<FunnelCounts, DatabaseError> {
        use ScholarshipStatus::*;
        Ok(FunnelCounts {
            interested: self
                .scholarships
                .count_users_with_status(key, &[Interested, Applied, Accepted])
                .await?,
            applied: self.scholarships.count_users_with_status(key, &[Applied, Accepted]).await?,
            accepted: self.scholarships.count_users_with_status(key, &[Accepted]).await?,
            not_interested: self.scholarships.count_users_with_status(key, &[NotInterested]).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 12);
        assert_eq!(percent(3, 8), 38);
        assert_eq!(percent(5, 0), 0);
    }

    #[test]
    fn test_event_window() {
        assert_eq!(event_window("7"), Some(7));
        assert_eq!(event_window("90"), Some(90));
        assert_eq!(event_window("14"), None);
        assert_eq!(event_window("all"), None);
        assert_eq!(event_window("07"), None);
        assert_eq!(event_window("+7"), None);
        assert_eq!(event_window(" 30"), None);
    }

    #[test]
    fn test_rates_from_counts() {
        let counts = FunnelCounts {
            interested: 4,
            applied: 2,
            accepted: 1,
            not_interested: 3,
        };
        assert_eq!(
            FunnelRates::from_counts(&counts),
            FunnelRates {
                applied_rate: 50,
                accepted_rate: 50
            }
        );
        assert_eq!(FunnelRates::from_counts(&FunnelCounts::default()), FunnelRates::default());
    }

    #[test]
    fn test_serialised_shape() {
        let analytics = ScholarshipAnalytics {
            scholarship_id: "abc".to_string(),
            counts: FunnelCounts::default(),
            rates: FunnelRates::default(),
            window: "30".to_string(),
            source: CountSource::Events,
        };
        let json = serde_json::to_value(&analytics).unwrap();
        assert_eq!(json["source"], "events");
        assert_eq!(json["counts"]["not_interested"], 0);
        assert_eq!(json["rates"]["applied_rate"], 0);
    }
}
