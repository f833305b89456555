pub mod cache;
pub mod config;
pub mod date_util;
pub mod drilldown;
pub mod error;
pub mod metrics;
pub mod response;
pub mod series;
pub mod storage;
pub mod window;

pub use cache::ResultCache;
pub use config::Policy;
pub use drilldown::{Dimension, Drilldown, DrilldownKey};
pub use error::{Error, Result};
pub use metrics::{AggregatedKpi, Direction, KpiKey};
pub use response::{Alert, Dashboard, RevenueTrendPoint, Risk, Timeframe};
pub use series::SeriesSnapshot;
pub use storage::Database;
pub use window::{Granularity, Month, Period, Range, TimeWindow, WindowPair};

use chrono::NaiveDate;
use storage::repository;

/// Number of alerts and risks carried on the dashboard.
pub const ALERT_LIMIT: usize = 6;
pub const RISK_LIMIT: usize = 6;

/// Compute the executive dashboard from an already-loaded snapshot.
///
/// Pure and synchronous: the reference date is explicit and nothing is read
/// or written outside the arguments.
pub fn compute_executive_dashboard(
    range: Range,
    granularity: Granularity,
    today: NaiveDate,
    data: &SeriesSnapshot,
    policy: &Policy,
    alerts: Vec<Alert>,
    risks: Vec<Risk>,
) -> Dashboard {
    let windows = window::resolve(range, granularity, today);
    let kpis = metrics::aggregate_kpis(&windows, data, policy);
    response::assemble(&windows, kpis, data, alerts, risks)
}

/// First month a snapshot must cover so both windows and every trailing
/// lookback ending at the current window's end are readable.
pub fn snapshot_start(windows: &WindowPair, policy: &Policy) -> Month {
    let lookback = policy
        .coverage_lookback_months
        .max(policy.forecast_lookback_months)
        .max(1);
    let lookback_start = windows.current.end().add(1 - lookback as i32);
    windows.prior.start().min(lookback_start)
}

/// Main entry point: owns the store and the dashboard result cache.
pub struct ExecKpi {
    db: Database,
    cache: ResultCache<(Range, Granularity), Dashboard>,
}

impl ExecKpi {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: ResultCache::new(Policy::default().cache_ttl()),
        }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Defaults with any stored overrides applied.
    pub async fn policy(&self) -> Result<Policy> {
        let pairs = self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        Ok(Policy::from_pairs(&pairs))
    }

    // ── Dashboard ──────────────────────────────────────────────────

    /// Dashboard for today, served through the single-flight cache.
    pub async fn executive_dashboard(
        &self,
        range: Range,
        granularity: Granularity,
    ) -> Result<Dashboard> {
        let policy = self.policy().await?;
        self.cache.set_ttl(policy.cache_ttl()).await;
        let today = chrono::Local::now().date_naive();
        self.cache
            .get_or_compute((range, granularity), || {
                self.dashboard_with(range, granularity, today, policy)
            })
            .await
    }

    /// Dashboard at an explicit reference date. Always computed fresh.
    pub async fn executive_dashboard_as_of(
        &self,
        range: Range,
        granularity: Granularity,
        today: NaiveDate,
    ) -> Result<Dashboard> {
        let policy = self.policy().await?;
        self.dashboard_with(range, granularity, today, policy).await
    }

    async fn dashboard_with(
        &self,
        range: Range,
        granularity: Granularity,
        today: NaiveDate,
        policy: Policy,
    ) -> Result<Dashboard> {
        let windows = window::resolve(range, granularity, today);
        let from = snapshot_start(&windows, &policy);
        let to = windows.current.end();

        let (data, alerts, risks) = self
            .db
            .reader()
            .call(move |conn| {
                let data = repository::load_snapshot(conn, from, to)?;
                let alerts = repository::list_alerts(conn, ALERT_LIMIT)?;
                let risks = repository::list_risks(conn, RISK_LIMIT)?;
                Ok::<_, rusqlite::Error>((data, alerts, risks))
            })
            .await?;

        log::info!("Computing {range}/{granularity} dashboard as of {today}");
        Ok(compute_executive_dashboard(
            range,
            granularity,
            today,
            &data,
            &policy,
            alerts,
            risks,
        ))
    }

    // ── Drill-down ─────────────────────────────────────────────────

    pub async fn kpi_drilldown(
        &self,
        key: DrilldownKey,
        range: Range,
        granularity: Granularity,
        dimension: Option<Dimension>,
    ) -> Result<Drilldown> {
        let today = chrono::Local::now().date_naive();
        self.kpi_drilldown_as_of(key, range, granularity, dimension, today)
            .await
    }

    pub async fn kpi_drilldown_as_of(
        &self,
        key: DrilldownKey,
        range: Range,
        granularity: Granularity,
        dimension: Option<Dimension>,
        today: NaiveDate,
    ) -> Result<Drilldown> {
        let policy = self.policy().await?;
        let windows = window::resolve(range, granularity, today);
        // NRR's fallback series needs the month before the window.
        let from = windows.current.start().previous().min(snapshot_start(&windows, &policy));
        let to = windows.current.end();

        let data = self
            .db
            .reader()
            .call(move |conn| repository::load_snapshot(conn, from, to))
            .await?;

        drilldown::compute_drilldown(key, &windows, dimension, &data, &policy)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Validate and store an override. Cached dashboards are dropped.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        Policy::validate(key, value)?;
        let key = key.to_string();
        let value = value.trim().to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        self.cache.invalidate().await;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Row counts per series table.
    pub async fn status(&self) -> Result<Vec<(String, i64)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::table_counts(conn))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Customer;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Jan-Jun 2025 at 100 recognized per month, plus a few orders and feeds.
    async fn seeded() -> ExecKpi {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                for (mo, backlog) in [(1, 1000.0), (2, 1200.0), (3, 900.0), (4, 950.0), (5, 980.0), (6, 1020.0)] {
                    repository::upsert_revenue(conn, &format!("2025-{mo:02}"), 100.0, 110.0, backlog)?;
                }
                // Prior window: Jul-Dec 2024
                repository::upsert_revenue(conn, "2024-12", 500.0, 400.0, 800.0)?;
                repository::insert_uptime(conn, "2025-03", 99.9)?;
                repository::upsert_nrr(conn, "2024-11", 1.05)?;
                let acme = repository::insert_customer(
                    conn,
                    &Customer {
                        name: Some("Acme".into()),
                        industry: Some("Energy".into()),
                        source: None,
                    },
                )?;
                repository::insert_order(conn, Some(acme), "2025-06-12", 100.0, 40.0, Some("subscription"))?;
                repository::insert_order(conn, None, "2025-03-02", 300.0, 60.0, Some("project"))?;
                repository::insert_alert(conn, Some("finance"), "Backlog dip", None, Some("medium"), "2025-06-01")?;
                repository::insert_risk(conn, "Supplier delay", Some("coo"), None, None, Some("open"))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        ExecKpi::new(db)
    }

    fn kpi(dashboard: &Dashboard, key: KpiKey) -> &AggregatedKpi {
        dashboard.executive_kpis.iter().find(|k| k.key == key).unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_as_of() {
        let app = seeded().await;
        let dash = app
            .executive_dashboard_as_of(Range::SixMonths, Granularity::Month, d(2025, 6, 15))
            .await
            .unwrap();

        assert_eq!(dash.timeframe.start_date, "2025-01-01");
        assert_eq!(dash.timeframe.end_date, "2025-06-30");
        assert_eq!(dash.executive_kpis.len(), 10);
        assert_eq!(kpi(&dash, KpiKey::Revenue).value, 600.0);
        assert_eq!(kpi(&dash, KpiKey::Revenue).direction, Direction::Up);
        assert_eq!(kpi(&dash, KpiKey::Backlog).value, 1020.0);
        assert_eq!(kpi(&dash, KpiKey::BookToBill).value, 1.1);
        assert_eq!(kpi(&dash, KpiKey::Nrr).value, 1.05);
        assert_eq!(kpi(&dash, KpiKey::Uptime).value, 0.999);
        assert_eq!(kpi(&dash, KpiKey::Gm).value, 0.25);
        assert_eq!(kpi(&dash, KpiKey::Arr).value, 1200.0);
        assert_eq!(kpi(&dash, KpiKey::CoverageMonths).value, 10.2);
        assert_eq!(dash.revenue_trend.len(), 6);
        assert_eq!(dash.alerts.len(), 1);
        assert_eq!(dash.risks.len(), 1);
    }

    #[tokio::test]
    async fn test_quarter_dashboard() {
        let app = seeded().await;
        let dash = app
            .executive_dashboard_as_of(Range::SixMonths, Granularity::Quarter, d(2025, 6, 15))
            .await
            .unwrap();

        assert_eq!(kpi(&dash, KpiKey::Revenue).value, 600.0);
        let trend: Vec<(String, f64, f64)> = dash
            .revenue_trend
            .iter()
            .map(|p| (p.period.to_key(), p.recognized, p.backlog))
            .collect();
        assert_eq!(
            trend,
            vec![
                ("2025-Q1".to_string(), 300.0, 900.0),
                ("2025-Q2".to_string(), 300.0, 1020.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_config_overrides_policy() {
        let app = seeded().await;
        app.config_set("payback_months", "12").await.unwrap();
        assert_eq!(app.config_get("payback_months").await.unwrap(), Some("12".to_string()));

        let err = app.config_set("payback_months", "soon").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = app.config_set("workspace", "1").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let dash = app
            .executive_dashboard_as_of(Range::TwelveMonths, Granularity::Month, d(2025, 6, 15))
            .await
            .unwrap();
        assert_eq!(kpi(&dash, KpiKey::Payback).value, 12.0);
        assert_eq!(app.config_list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_dashboard_reused_until_config_change() {
        let app = seeded().await;
        app.config_set("cache_ttl_secs", "300").await.unwrap();

        let first = app
            .executive_dashboard(Range::TwelveMonths, Granularity::Month)
            .await
            .unwrap();
        app.db()
            .writer()
            .call(|conn| repository::insert_risk(conn, "New risk", None, None, None, None))
            .await
            .unwrap();
        let second = app
            .executive_dashboard(Range::TwelveMonths, Granularity::Month)
            .await
            .unwrap();
        assert_eq!(first, second);

        app.config_set("currency_unit", "$").await.unwrap();
        let third = app
            .executive_dashboard(Range::TwelveMonths, Granularity::Month)
            .await
            .unwrap();
        assert_eq!(third.risks.len(), 2);
        assert_eq!(kpi(&third, KpiKey::Revenue).unit.as_deref(), Some("$"));
    }

    #[tokio::test]
    async fn test_drilldown_through_store() {
        let app = seeded().await;
        let dd = app
            .kpi_drilldown_as_of(
                "revenue".parse().unwrap(),
                Range::SixMonths,
                Granularity::Quarter,
                Some(Dimension::Industry),
                d(2025, 6, 15),
            )
            .await
            .unwrap();
        assert_eq!(dd.series.len(), 2);
        let names: Vec<&str> = dd.breakdown.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Unknown", "Energy"]);
        assert_eq!(dd.breakdown[0].share, 0.75);

        let err = app
            .kpi_drilldown_as_of(
                DrilldownKey::LeadTime,
                Range::SixMonths,
                Granularity::Month,
                Some(Dimension::Source),
                d(2025, 6, 15),
            )
            .await
            .unwrap_err();
        assert!(err.is_bad_request());
    }

    #[tokio::test]
    async fn test_status_counts() {
        let app = seeded().await;
        let counts = app.status().await.unwrap();
        let revenue = counts.iter().find(|(t, _)| t == "revenue_trend").unwrap();
        assert_eq!(revenue.1, 7);
    }

    #[test]
    fn test_snapshot_start_covers_lookbacks() {
        let policy = Policy {
            coverage_lookback_months: 24,
            ..Policy::default()
        };
        let windows = window::resolve(Range::SixMonths, Granularity::Month, d(2025, 6, 1));
        assert_eq!(snapshot_start(&windows, &Policy::default()), Month::new(2024, 7).unwrap());
        assert_eq!(snapshot_start(&windows, &policy), Month::new(2023, 7).unwrap());
    }
}
