//! GPX import: moving distance, moving time and the track outline.

use crate::error::{GpxError, NormalizeError};
use crate::normalize::{meters_to_km, seconds_to_min};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Below this speed a pair of points counts as stopped, not moving.
pub const STOPPED_SPEED_KMH: f64 = 1.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Result of reading one GPX document.
#[derive(Debug, Clone, PartialEq)]
pub struct GpxSummary {
    pub moving_distance_m: f64,
    pub moving_time_s: f64,
    /// Track outline as (latitude, longitude)
    pub points: Vec<(f64, f64)>,
    /// Date of the first timestamped point (UTC)
    pub start_date: Option<NaiveDate>,
}

impl GpxSummary {
    /// Moving distance in kilometers, rounded to 2 decimal places.
    pub fn distance_km(&self) -> f64 {
        meters_to_km(self.moving_distance_m)
    }

    /// Moving time in whole minutes.
    pub fn duration_min(&self) -> Result<u32, NormalizeError> {
        seconds_to_min(self.moving_time_s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

/// Parse a GPX file from disk.
pub fn parse_gpx_file(path: &Path) -> Result<GpxSummary, GpxError> {
    let file = File::open(path)?;
    let summary = parse_gpx(BufReader::new(file))?;
    tracing::debug!(
        path = %path.display(),
        points = summary.points.len(),
        moving_m = summary.moving_distance_m,
        moving_s = summary.moving_time_s,
        "GPX parsed"
    );
    Ok(summary)
}

/// Parse a GPX document and reduce its tracks to a summary.
pub fn parse_gpx<R: Read>(reader: R) -> Result<GpxSummary, GpxError> {
    let doc = gpx::read(reader).map_err(|e| GpxError::Parse(e.to_string()))?;

    let mut segments = Vec::new();
    for track in doc.tracks {
        for segment in track.segments {
            let mut points = Vec::with_capacity(segment.points.len());
            for waypoint in segment.points {
                let time = match waypoint.time {
                    Some(t) => {
                        let iso = t.format().map_err(|e| GpxError::Parse(e.to_string()))?;
                        let utc = DateTime::parse_from_rfc3339(&iso)
                            .map_err(|e| GpxError::Parse(e.to_string()))?
                            .with_timezone(&Utc);
                        Some(utc)
                    }
                    None => None,
                };
                let geo = waypoint.point();
                points.push(TrackPoint {
                    lat: geo.y(),
                    lon: geo.x(),
                    elevation: waypoint.elevation,
                    time,
                });
            }
            segments.push(points);
        }
    }

    summarize(&segments)
}

/// Reduce track segments to moving data. Segments are not joined: the gap
/// between two segments is neither distance nor time.
pub fn summarize(segments: &[Vec<TrackPoint>]) -> Result<GpxSummary, GpxError> {
    let points: Vec<(f64, f64)> = segments
        .iter()
        .flatten()
        .map(|p| (p.lat, p.lon))
        .collect();
    if points.is_empty() {
        return Err(GpxError::Empty);
    }

    let start_date = segments
        .iter()
        .flatten()
        .find_map(|p| p.time)
        .map(|t| t.date_naive());

    let stopped_mps = STOPPED_SPEED_KMH * 1000.0 / 3600.0;
    let mut moving_distance_m = 0.0;
    let mut moving_time_s = 0.0;

    for segment in segments {
        for pair in segment.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let (Some(t0), Some(t1)) = (prev.time, next.time) else {
                continue;
            };
            let dt = (t1 - t0).num_milliseconds() as f64 / 1000.0;
            if dt <= 0.0 {
                continue;
            }
            let dist = distance_3d(prev, next);
            if dist / dt > stopped_mps {
                moving_distance_m += dist;
                moving_time_s += dt;
            }
        }
    }

    Ok(GpxSummary {
        moving_distance_m,
        moving_time_s,
        points,
        start_date,
    })
}

fn distance_3d(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let flat = haversine_distance(a.lat, a.lon, b.lat, b.lon);
    match (a.elevation, b.elevation) {
        (Some(e0), Some(e1)) => (flat.powi(2) + (e1 - e0).powi(2)).sqrt(),
        _ => flat,
    }
}

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}
