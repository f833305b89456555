use rusqlite::{params, Connection, OptionalExtension};

use crate::response::{Alert, Risk};
use crate::series::{CostComponent, Customer, MonthlySeries, Order, SeriesSnapshot};
use crate::window::Month;

/// Funnel stage whose monthly count feeds the forecast's pipeline conversion.
pub const OPEN_PIPELINE_STAGE: &str = "SQL";

/// Tables reported by `status`.
pub const SERIES_TABLES: &[&str] = &[
    "revenue_trend",
    "ops_uptime",
    "retention_nrr",
    "pipeline_stages_daily",
    "pipeline_winrate",
    "customers",
    "orders",
    "supply_lead_time",
    "supply_inventory_turns",
    "supply_cogs_variance",
    "supply_cogs_breakdown",
    "alerts",
    "risks",
];

// ── Snapshot ───────────────────────────────────────────────────────

/// Read everything the engine needs for months `from..=to`.
///
/// Flow, snapshot and average series are bounded to the range. Latest-as-of
/// inputs (NRR, pipeline, win rate) carry their full history up to `to`.
pub fn load_snapshot(
    conn: &Connection,
    from: Month,
    to: Month,
) -> Result<SeriesSnapshot, rusqlite::Error> {
    let from_key = from.to_key();
    let to_key = to.to_key();
    let mut snap = SeriesSnapshot::new();

    let mut stmt = conn.prepare(
        "SELECT period,
                COALESCE(recognized, 0),
                COALESCE(booked, 0),
                COALESCE(backlog, 0)
         FROM revenue_trend
         WHERE period BETWEEN ?1 AND ?2
         ORDER BY period",
    )?;
    let rows = stmt.query_map(params![from_key, to_key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;
    for row in rows {
        let (period, recognized, booked, backlog) = row?;
        if let Some(month) = parse_period(&period) {
            snap.insert_revenue(month, recognized, booked, backlog);
        }
    }

    snap.uptime = read_series(
        conn,
        "SELECT period, AVG(uptime) FROM ops_uptime
         WHERE period BETWEEN ?1 AND ?2 AND uptime IS NOT NULL
         GROUP BY period",
        params![from_key, to_key],
    )?;
    snap.nrr = read_series(
        conn,
        "SELECT period, nrr FROM retention_nrr WHERE period <= ?1 AND nrr IS NOT NULL",
        params![to_key],
    )?;
    snap.pipeline_count = read_series(
        conn,
        "SELECT substr(period, 1, 7) AS month, SUM(value) FROM pipeline_stages_daily
         WHERE stage_name = ?1 AND substr(period, 1, 7) <= ?2 AND value IS NOT NULL
         GROUP BY month",
        params![OPEN_PIPELINE_STAGE, to_key],
    )?;
    snap.win_rate_pct = read_series(
        conn,
        "SELECT period, win_rate_pct FROM pipeline_winrate
         WHERE period <= ?1 AND win_rate_pct IS NOT NULL",
        params![to_key],
    )?;
    snap.lead_time_days = read_series(
        conn,
        "SELECT period, lead_time_days FROM supply_lead_time
         WHERE period BETWEEN ?1 AND ?2 AND lead_time_days IS NOT NULL",
        params![from_key, to_key],
    )?;
    snap.inventory_turns = read_series(
        conn,
        "SELECT period, turns_per_year FROM supply_inventory_turns
         WHERE period BETWEEN ?1 AND ?2 AND turns_per_year IS NOT NULL",
        params![from_key, to_key],
    )?;
    snap.cogs_variance_pct = read_series(
        conn,
        "SELECT period, variance_pct FROM supply_cogs_variance
         WHERE period BETWEEN ?1 AND ?2 AND variance_pct IS NOT NULL",
        params![from_key, to_key],
    )?;

    snap.set_orders(list_orders(conn, from, to)?);
    snap.cogs_breakdown = list_cogs_breakdown(conn)?;

    log::debug!(
        "Loaded snapshot {from_key}..{to_key}: {} revenue months, {} orders",
        snap.recognized.len(),
        snap.orders().len()
    );
    Ok(snap)
}

fn read_series(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<MonthlySeries, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
    let mut series = MonthlySeries::new();
    for row in rows {
        let (period, value) = row?;
        if let Some(month) = parse_period(&period) {
            series.insert(month, value);
        }
    }
    Ok(series)
}

fn parse_period(period: &str) -> Option<Month> {
    match Month::parse(period) {
        Ok(m) => Some(m),
        Err(e) => {
            log::warn!("Skipping row with bad period '{period}': {e}");
            None
        }
    }
}

/// Orders dated within months `from..=to`, joined to their customer.
pub fn list_orders(conn: &Connection, from: Month, to: Month) -> Result<Vec<Order>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT o.order_date, COALESCE(o.amount, 0), COALESCE(o.profit, 0), o.type,
                o.customer_id, c.name, c.industry, c.source
         FROM orders o
         LEFT JOIN customers c ON c.id = o.customer_id
         WHERE substr(o.order_date, 1, 10) BETWEEN ?1 AND ?2
         ORDER BY o.order_date, o.id",
    )?;
    let from_date = from.first_day().format("%Y-%m-%d").to_string();
    let to_date = to.last_day().format("%Y-%m-%d").to_string();
    let rows = stmt.query_map(params![from_date, to_date], |row| {
        let order_date: String = row.get(0)?;
        let customer_id: Option<i64> = row.get(4)?;
        let customer = customer_id.map(|_| -> Result<Customer, rusqlite::Error> {
            Ok(Customer {
                name: row.get(5)?,
                industry: row.get(6)?,
                source: row.get(7)?,
            })
        });
        Ok((
            order_date,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, Option<String>>(3)?,
            customer.transpose()?,
        ))
    })?;

    let mut orders = Vec::new();
    for row in rows {
        let (order_date, amount, profit, kind, customer) = row?;
        match chrono::NaiveDate::parse_from_str(date_key_from_iso(&order_date), "%Y-%m-%d") {
            Ok(order_date) => orders.push(Order {
                order_date,
                amount,
                profit,
                kind,
                customer,
            }),
            Err(_) => log::warn!("Skipping order with bad date '{order_date}'"),
        }
    }
    Ok(orders)
}

pub fn list_cogs_breakdown(conn: &Connection) -> Result<Vec<CostComponent>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT component, COALESCE(cost, 0) FROM supply_cogs_breakdown ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CostComponent {
            component: row.get(0)?,
            cost: row.get(1)?,
        })
    })?;
    rows.collect()
}

// ── Series writes ──────────────────────────────────────────────────

pub fn upsert_revenue(
    conn: &Connection,
    period: &str,
    recognized: f64,
    booked: f64,
    backlog: f64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO revenue_trend (period, recognized, booked, backlog)
         VALUES (?1, ?2, ?3, ?4)",
        params![period, recognized, booked, backlog],
    )?;
    Ok(())
}

pub fn insert_uptime(conn: &Connection, period: &str, uptime: f64) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO ops_uptime (period, uptime) VALUES (?1, ?2)",
        params![period, uptime],
    )?;
    Ok(())
}

pub fn upsert_nrr(conn: &Connection, period: &str, nrr: f64) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO retention_nrr (period, nrr) VALUES (?1, ?2)",
        params![period, nrr],
    )?;
    Ok(())
}

/// Record one day's count for a funnel stage. `day` is `YYYY-MM-DD`.
pub fn insert_pipeline_stage(
    conn: &Connection,
    day: &str,
    stage_name: &str,
    value: f64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO pipeline_stages_daily (period, stage_name, value) VALUES (?1, ?2, ?3)",
        params![day, stage_name, value],
    )?;
    Ok(())
}

pub fn upsert_win_rate(
    conn: &Connection,
    period: &str,
    win_rate_pct: f64,
    sales_cycle_days: Option<f64>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO pipeline_winrate (period, win_rate_pct, sales_cycle_days)
         VALUES (?1, ?2, ?3)",
        params![period, win_rate_pct, sales_cycle_days],
    )?;
    Ok(())
}

pub fn insert_customer(conn: &Connection, customer: &Customer) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO customers (name, industry, source, created_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![customer.name, customer.industry, customer.source],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_order(
    conn: &Connection,
    customer_id: Option<i64>,
    order_date: &str,
    amount: f64,
    profit: f64,
    kind: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO orders (customer_id, order_date, amount, profit, type)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![customer_id, order_date, amount, profit, kind],
    )?;
    Ok(conn.last_insert_rowid())
}

/// One of the monthly supply tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplySeries {
    LeadTime,
    InventoryTurns,
    CogsVariance,
}

pub fn upsert_supply(
    conn: &Connection,
    series: SupplySeries,
    period: &str,
    value: f64,
) -> Result<(), rusqlite::Error> {
    let sql = match series {
        SupplySeries::LeadTime => {
            "INSERT OR REPLACE INTO supply_lead_time (period, lead_time_days) VALUES (?1, ?2)"
        }
        SupplySeries::InventoryTurns => {
            "INSERT OR REPLACE INTO supply_inventory_turns (period, turns_per_year) VALUES (?1, ?2)"
        }
        SupplySeries::CogsVariance => {
            "INSERT OR REPLACE INTO supply_cogs_variance (period, variance_pct) VALUES (?1, ?2)"
        }
    };
    conn.execute(sql, params![period, value])?;
    Ok(())
}

pub fn insert_cogs_component(
    conn: &Connection,
    component: &str,
    cost: f64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO supply_cogs_breakdown (component, cost) VALUES (?1, ?2)",
        params![component, cost],
    )?;
    Ok(())
}

// ── Alerts & Risks ─────────────────────────────────────────────────

pub fn insert_alert(
    conn: &Connection,
    kind: Option<&str>,
    title: &str,
    description: Option<&str>,
    severity: Option<&str>,
    created_at: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO alerts (type, title, description, severity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![kind, title, description, severity, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent alerts first.
pub fn list_alerts(conn: &Connection, limit: usize) -> Result<Vec<Alert>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, type, title, description, severity, created_at
         FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(Alert {
            id: row.get(0)?,
            kind: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            severity: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn insert_risk(
    conn: &Connection,
    title: &str,
    owner: Option<&str>,
    due: Option<&str>,
    mitigation: Option<&str>,
    status: Option<&str>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO risks (title, owner, due, mitigation, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, owner, due, mitigation, status],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest risks (highest id) first.
pub fn list_risks(conn: &Connection, limit: usize) -> Result<Vec<Risk>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, title, owner, due, mitigation, status FROM risks ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(Risk {
            id: row.get(0)?,
            title: row.get(1)?,
            owner: row.get(2)?,
            due: row.get(3)?,
            mitigation: row.get(4)?,
            status: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

/// Row count per series table, in [`SERIES_TABLES`] order.
pub fn table_counts(conn: &Connection) -> Result<Vec<(String, i64)>, rusqlite::Error> {
    SERIES_TABLES
        .iter()
        .map(|table| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok((table.to_string(), count))
        })
        .collect()
}

// ── Helpers ────────────────────────────────────────────────────────

/// Extract YYYY-MM-DD from an ISO datetime string. Input whose tenth byte is
/// not a char boundary comes back whole and fails date parsing downstream.
fn date_key_from_iso(iso: &str) -> &str {
    iso.get(..10).unwrap_or(iso)
}
