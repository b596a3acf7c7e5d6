//! Session-scoped, in-memory running log.
//!
//! Nothing here outlives the session: `end()` (or dropping the session)
//! discards the run table, the Strava token and any fetched activities.

use crate::error::SessionError;
use crate::gpx_import::GpxSummary;
use crate::models::{Feeling, NormalizedActivity, RunRecord, Source, TokenCache};
use chrono::NaiveDate;

/// Ordered run table. Records are append-only.
#[derive(Debug, Default, Clone)]
pub struct RunLog {
    records: Vec<RunRecord>,
}

impl RunLog {
    pub fn push(&mut self, record: RunRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a Strava activity has already been logged
    pub fn contains_activity(&self, id: i64) -> bool {
        self.records.iter().any(|r| r.activity_id == Some(id))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// State for one connected user.
#[derive(Debug, Default)]
pub struct Session {
    log: RunLog,
    token: Option<TokenCache>,
    fetched: Vec<NormalizedActivity>,
    last_track: Vec<(f64, f64)>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn token(&self) -> Option<&TokenCache> {
        self.token.as_ref()
    }

    pub fn set_token(&mut self, token: TokenCache) {
        self.token = Some(token);
    }

    /// Activities from the latest fetch, awaiting acceptance
    pub fn fetched(&self) -> &[NormalizedActivity] {
        &self.fetched
    }

    pub fn replace_fetched(&mut self, activities: Vec<NormalizedActivity>) {
        self.fetched = activities;
    }

    /// Track outline of the most recent GPX import
    pub fn last_track(&self) -> &[(f64, f64)] {
        &self.last_track
    }

    /// Log one of the fetched Strava activities.
    pub fn accept_activity(&mut self, id: i64, feeling: Feeling) -> Result<&RunRecord, SessionError> {
        if self.log.contains_activity(id) {
            return Err(SessionError::AlreadyAdded(id));
        }
        let activity = self
            .fetched
            .iter()
            .find(|a| a.id == id)
            .ok_or(SessionError::UnknownActivity(id))?;

        let record = RunRecord::from_activity(activity, feeling)?;
        tracing::info!(
            activity_id = id,
            distance_km = record.distance_km,
            "Accepted Strava activity"
        );
        Ok(self.append(record))
    }

    /// Log a manually entered run.
    pub fn add_manual(
        &mut self,
        date: NaiveDate,
        distance_km: f64,
        duration_min: f64,
        feeling: Feeling,
    ) -> Result<&RunRecord, SessionError> {
        let record = RunRecord::new(date, distance_km, duration_min, feeling, Source::Manual)?;
        tracing::info!(%date, distance_km, "Added manual run");
        Ok(self.append(record))
    }

    /// Log an imported GPX track. The track's own start date wins over
    /// `fallback_date`.
    pub fn add_gpx(
        &mut self,
        summary: GpxSummary,
        fallback_date: NaiveDate,
        feeling: Feeling,
    ) -> Result<&RunRecord, SessionError> {
        let date = summary.start_date.unwrap_or(fallback_date);
        let record = RunRecord::new(
            date,
            summary.distance_km(),
            f64::from(summary.duration_min()?),
            feeling,
            Source::Gps,
        )?;
        tracing::info!(%date, distance_km = record.distance_km, points = summary.points.len(), "Imported GPX run");
        self.last_track = summary.points;
        Ok(self.append(record))
    }

    fn append(&mut self, record: RunRecord) -> &RunRecord {
        self.log.push(record);
        &self.log.records[self.log.records.len() - 1]
    }

    /// Tear the session down, discarding everything it holds.
    pub fn end(&mut self) {
        tracing::info!(
            runs = self.log.len(),
            had_token = self.token.is_some(),
            "Ending session"
        );
        self.log.clear();
        self.token = None;
        self.fetched.clear();
        self.last_track.clear();
    }

    fn is_blank(&self) -> bool {
        self.log.is_empty() && self.token.is_none() && self.fetched.is_empty() && self.last_track.is_empty()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_blank() {
            self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NormalizeError, RecordError};
    use crate::models::RawActivity;
    use crate::normalize::normalize_activity;
    use serde_json::json;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn fetched(id: i64, km: f64, min: u32) -> NormalizedActivity {
        NormalizedActivity {
            id,
            name: format!("Run {}", id),
            date: date(id as u32),
            distance_km: km,
            duration_min: min,
            average_speed: None,
            sport_type: Some("Run".to_string()),
        }
    }

    #[test]
    fn test_accept_fetched_activity() {
        let mut session = Session::new();
        session.replace_fetched(vec![fetched(1, 10.0, 50), fetched(2, 5.0, 27)]);

        let record = session.accept_activity(2, Feeling::Great).unwrap();
        assert_eq!(record.pace, "5:24");
        assert_eq!(record.source, Source::Strava);
        assert_eq!(record.activity_id, Some(2));
        assert_eq!(session.log().len(), 1);
    }

    #[test]
    fn test_accept_twice_is_rejected() {
        let mut session = Session::new();
        session.replace_fetched(vec![fetched(1, 10.0, 50)]);
        session.accept_activity(1, Feeling::Good).unwrap();

        assert!(matches!(
            session.accept_activity(1, Feeling::Good),
            Err(SessionError::AlreadyAdded(1))
        ));
        assert_eq!(session.log().len(), 1);
    }

    #[test]
    fn test_accept_unknown_activity() {
        let mut session = Session::new();
        assert!(matches!(
            session.accept_activity(99, Feeling::Good),
            Err(SessionError::UnknownActivity(99))
        ));
    }

    #[test]
    fn test_accepted_survives_refetch() {
        let mut session = Session::new();
        session.replace_fetched(vec![fetched(1, 10.0, 50)]);
        session.accept_activity(1, Feeling::Good).unwrap();

        session.replace_fetched(vec![fetched(3, 3.0, 18)]);
        assert_eq!(session.log().len(), 1);
        assert!(session.log().contains_activity(1));
        assert!(matches!(
            session.accept_activity(1, Feeling::Good),
            Err(SessionError::AlreadyAdded(1))
        ));
    }

    #[test]
    fn test_sub_minute_activity_cannot_be_accepted() {
        let raw: RawActivity = serde_json::from_value(json!({
            "id": 7, "name": "Strides", "sport_type": "Run",
            "start_date_local": "2024-05-07T07:00:00Z",
            "distance": 200, "moving_time": 45,
        }))
        .unwrap();
        let activity = normalize_activity(&raw).unwrap();
        assert_eq!(activity.distance_km, 0.2);
        assert_eq!(activity.duration_min, 0);

        let mut session = Session::new();
        session.replace_fetched(vec![activity]);
        assert!(matches!(
            session.accept_activity(7, Feeling::Good),
            Err(SessionError::Record(RecordError::ZeroDuration { .. }))
        ));
        assert!(session.log().is_empty());
    }

    #[test]
    fn test_run_log() {
        let mut log = RunLog::default();
        assert!(log.is_empty());

        let mut record = RunRecord::new(date(1), 5.0, 25.0, Feeling::Good, Source::Strava).unwrap();
        record.activity_id = Some(11);
        log.push(record);
        assert_eq!(log.len(), 1);
        assert!(log.contains_activity(11));
        assert!(!log.contains_activity(12));

        log.clear();
        assert!(log.records().is_empty());
    }

    #[test]
    fn test_add_manual() {
        let mut session = Session::new();
        let record = session.add_manual(date(3), 8.0, 44.0, Feeling::Tired).unwrap();
        assert_eq!(record.pace, "5:30");
        assert_eq!(record.source, Source::Manual);

        let err = session.add_manual(date(3), -2.0, 10.0, Feeling::Good).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Record(RecordError::InvalidQuantity { field: "distance_km", .. })
        ));
        assert_eq!(session.log().len(), 1);
    }

    #[test]
    fn test_add_gpx_uses_track_date() {
        let mut session = Session::new();
        let summary = GpxSummary {
            moving_distance_m: 5004.0,
            moving_time_s: 1625.0,
            points: vec![(45.0, 7.0), (45.01, 7.0)],
            start_date: Some(date(20)),
        };

        let record = session.add_gpx(summary, date(1), Feeling::Good).unwrap();
        assert_eq!(record.date, date(20));
        assert_eq!(record.distance_km, 5.0);
        assert_eq!(record.duration_min, 27.0);
        assert_eq!(record.source, Source::Gps);
        assert_eq!(session.last_track().len(), 2);
    }

    #[test]
    fn test_add_gpx_falls_back_to_given_date() {
        let mut session = Session::new();
        let summary = GpxSummary {
            moving_distance_m: 0.0,
            moving_time_s: 0.0,
            points: vec![(45.0, 7.0)],
            start_date: None,
        };
        let record = session.add_gpx(summary, date(9), Feeling::Okay).unwrap();
        assert_eq!(record.date, date(9));
        assert_eq!(record.pace, "0:00");
    }

    #[test]
    fn test_add_gpx_rejects_impossible_moving_time() {
        let mut session = Session::new();
        let summary = GpxSummary {
            moving_distance_m: 5000.0,
            moving_time_s: 1e12,
            points: vec![(45.0, 7.0)],
            start_date: None,
        };
        assert!(matches!(
            session.add_gpx(summary, date(9), Feeling::Okay),
            Err(SessionError::Normalize(NormalizeError::OutOfRange { .. }))
        ));
        assert!(session.log().is_empty());
        assert!(session.last_track().is_empty());
    }

    #[test]
    fn test_end_clears_everything() {
        let mut session = Session::new();
        session.set_token(TokenCache {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 0,
        });
        session.replace_fetched(vec![fetched(1, 10.0, 50)]);
        session.accept_activity(1, Feeling::Good).unwrap();
        session.add_manual(date(2), 5.0, 25.0, Feeling::Good).unwrap();

        session.end();
        assert!(session.log().is_empty());
        assert!(session.token().is_none());
        assert!(session.fetched().is_empty());
        assert!(session.is_blank());
    }
}
