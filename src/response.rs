use serde::Serialize;

use crate::date_util::round_to;
use crate::metrics::{AggregatedKpi, FoldRule};
use crate::series::{SeriesSnapshot, Source};
use crate::window::fold::{buckets, fold, Bucket};
use crate::window::{Granularity, Period, Range, TimeWindow, WindowPair};

/// Window descriptor echoed back to the caller. Dates are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeframe {
    pub range: Range,
    pub start_date: String,
    pub end_date: String,
    pub granularity: Granularity,
}

impl Timeframe {
    pub fn of(range: Range, window: &TimeWindow) -> Self {
        Self {
            range,
            start_date: window.start_date().format("%Y-%m-%d").to_string(),
            end_date: window.end_date().format("%Y-%m-%d").to_string(),
            granularity: window.granularity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueTrendPoint {
    pub period: Period,
    pub recognized: f64,
    pub booked: f64,
    /// Snapshot at the bucket's last observed month, never summed.
    pub backlog: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Risk {
    pub id: i64,
    pub title: String,
    pub owner: Option<String>,
    pub due: Option<String>,
    pub mitigation: Option<String>,
    pub status: Option<String>,
}

/// Outbound dashboard shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub timeframe: Timeframe,
    pub executive_kpis: Vec<AggregatedKpi>,
    pub revenue_trend: Vec<RevenueTrendPoint>,
    pub alerts: Vec<Alert>,
    pub risks: Vec<Risk>,
}

/// One trend point per bucket that has a revenue observation. Missing
/// buckets are skipped rather than zero-filled.
pub fn revenue_trend(window: &TimeWindow, data: &SeriesSnapshot) -> Vec<RevenueTrendPoint> {
    buckets(window)
        .iter()
        .filter_map(|bucket| trend_point(bucket, data))
        .collect()
}

fn trend_point(bucket: &Bucket, data: &SeriesSnapshot) -> Option<RevenueTrendPoint> {
    let recognized = data.series(Source::Recognized);
    if !recognized.has_any(&bucket.months) {
        return None;
    }
    let booked = fold(data.series(Source::Booked), bucket, FoldRule::Sum).unwrap_or(0.0);
    let backlog = fold(data.series(Source::Backlog), bucket, FoldRule::Last).unwrap_or(0.0);
    Some(RevenueTrendPoint {
        period: bucket.period,
        recognized: round_to(recognized.sum_over(&bucket.months), 2),
        booked: round_to(booked, 2),
        backlog: round_to(backlog, 2),
    })
}

/// Package the computed pieces. Alerts and risks pass through untouched.
pub fn assemble(
    windows: &WindowPair,
    executive_kpis: Vec<AggregatedKpi>,
    data: &SeriesSnapshot,
    alerts: Vec<Alert>,
    risks: Vec<Risk>,
) -> Dashboard {
    Dashboard {
        timeframe: Timeframe::of(windows.range, &windows.current),
        executive_kpis,
        revenue_trend: revenue_trend(&windows.current, data),
        alerts,
        risks,
    }
}
