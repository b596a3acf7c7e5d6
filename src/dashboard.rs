//! Summary numbers and chart data for the running log.

use crate::format::{format_km, format_minutes, format_pace};
use crate::models::{RunRecord, Source};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-source share of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTotal {
    pub source: Source,
    pub runs: usize,
    pub distance_km: f64,
}

/// Aggregate view of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub runs: usize,
    pub total_km: f64,
    pub total_min: f64,
    pub total_calories: u64,
    pub average_pace: String,
    pub longest_km: f64,
    pub by_source: Vec<SourceTotal>,
}

impl Summary {
    pub fn from_records(records: &[RunRecord]) -> Self {
        let total_km: f64 = records.iter().map(|r| r.distance_km).sum();
        let total_min: f64 = records.iter().map(|r| r.duration_min).sum();

        let mut by_source: BTreeMap<Source, (usize, f64)> = BTreeMap::new();
        for record in records {
            let entry = by_source.entry(record.source).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += record.distance_km;
        }

        Self {
            runs: records.len(),
            total_km,
            total_min,
            total_calories: records.iter().map(|r| u64::from(r.calorie_estimate)).sum(),
            average_pace: format_pace(total_km, total_min),
            longest_km: records.iter().map(|r| r.distance_km).fold(0.0, f64::max),
            by_source: by_source
                .into_iter()
                .map(|(source, (runs, distance_km))| SourceTotal {
                    source,
                    runs,
                    distance_km,
                })
                .collect(),
        }
    }
}

/// One bar of the distance-by-date chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub source: Source,
    pub distance_km: f64,
}

/// Distance per (date, source), sorted by date then source.
pub fn chart_series(records: &[RunRecord]) -> Vec<ChartPoint> {
    let mut buckets: BTreeMap<(NaiveDate, Source), f64> = BTreeMap::new();
    for record in records {
        *buckets.entry((record.date, record.source)).or_insert(0.0) += record.distance_km;
    }

    buckets
        .into_iter()
        .map(|((date, source), distance_km)| ChartPoint {
            date,
            source,
            distance_km,
        })
        .collect()
}

/// Markdown rendering of the summary block.
pub fn render_summary(summary: &Summary) -> String {
    if summary.runs == 0 {
        return "No runs logged yet.".to_string();
    }

    let mut output = String::from("# Running Log Summary\n\n");
    output.push_str(&format!("- **Total Distance:** {:.1} km\n", summary.total_km));
    output.push_str(&format!("- **Runs:** {}\n", summary.runs));
    output.push_str(&format!(
        "- **Total Time:** {}\n",
        format_minutes(summary.total_min)
    ));
    output.push_str(&format!("- **Average Pace:** {}/km\n", summary.average_pace));
    output.push_str(&format!(
        "- **Longest Run:** {} km\n",
        format_km(summary.longest_km)
    ));
    output.push_str(&format!("- **Calories:** {} kcal\n", summary.total_calories));

    output.push_str("\n## By Source\n");
    for total in &summary.by_source {
        output.push_str(&format!(
            "- **{}:** {} runs, {} km\n",
            total.source,
            total.runs,
            format_km(total.distance_km)
        ));
    }

    output
}

/// Markdown table of distance per day and source.
pub fn render_chart(points: &[ChartPoint]) -> String {
    let mut output = String::from("| Date | Source | Distance (km) |\n|---|---|---|\n");
    for point in points {
        output.push_str(&format!(
            "| {} | {} | {} |\n",
            point.date,
            point.source,
            format_km(point.distance_km)
        ));
    }
    output
}

/// Markdown table of every run in the log.
pub fn render_table(records: &[RunRecord]) -> String {
    if records.is_empty() {
        return "No runs logged yet.".to_string();
    }

    let mut output = String::from(
        "| Date | Distance (km) | Duration (min) | Pace | Calories | Feeling | Source |\n\
         |---|---|---|---|---|---|---|\n",
    );
    for r in records {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            r.date,
            format_km(r.distance_km),
            r.duration_min,
            r.pace,
            r.calorie_estimate,
            r.feeling,
            r.source
        ));
    }
    output
}
