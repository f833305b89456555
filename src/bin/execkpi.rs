use clap::{Parser, Subcommand};

use execkpi::{Dashboard, Drilldown, ExecKpi, Granularity, Range};

#[derive(Parser)]
#[command(name = "execkpi", about = "Executive KPI dashboard CLI")]
struct Cli {
    /// Database path (default: ~/.execkpi/execkpi.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the executive KPI dashboard
    Dashboard {
        /// Window length: 6m or 12m
        #[arg(long, default_value = "12m")]
        range: String,
        /// Output buckets: month or quarter
        #[arg(long, default_value = "month")]
        granularity: String,
        /// Reference date (YYYY-MM-DD); bypasses the result cache
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drill into one KPI: bucketed series plus a breakdown
    Drilldown {
        /// KPI key, e.g. revenue, gm, nrr, lead_time
        key: String,
        /// Window length: 6m or 12m
        #[arg(long, default_value = "12m")]
        range: String,
        /// Output buckets: month or quarter
        #[arg(long, default_value = "month")]
        granularity: String,
        /// Breakdown dimension: customer, industry, source, or component
        #[arg(long)]
        by: Option<String>,
        /// Reference date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage policy configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show row counts of the series tables
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_as_of(as_of: Option<&str>) -> anyhow::Result<Option<chrono::NaiveDate>> {
    as_of
        .map(|s| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("invalid --as-of date '{s}' (expected YYYY-MM-DD)"))
        })
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => execkpi::Database::open_at(path).await?,
        None => execkpi::Database::open().await?,
    };
    let app = ExecKpi::new(db);

    match cli.command {
        Commands::Dashboard {
            range,
            granularity,
            as_of,
            json,
        } => {
            let range: Range = range.parse()?;
            let granularity: Granularity = granularity.parse()?;
            let dashboard = match parse_as_of(as_of.as_deref())? {
                Some(date) => app.executive_dashboard_as_of(range, granularity, date).await?,
                None => app.executive_dashboard(range, granularity).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print_dashboard(&dashboard);
            }
        }
        Commands::Drilldown {
            key,
            range,
            granularity,
            by,
            as_of,
            json,
        } => {
            let key: execkpi::DrilldownKey = key.parse()?;
            let range: Range = range.parse()?;
            let granularity: Granularity = granularity.parse()?;
            let dimension = by.as_deref().map(|s| key.parse_dimension(s)).transpose()?;
            let drilldown = match parse_as_of(as_of.as_deref())? {
                Some(date) => {
                    app.kpi_drilldown_as_of(key, range, granularity, dimension, date)
                        .await?
                }
                None => app.kpi_drilldown(key, range, granularity, dimension).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&drilldown)?);
            } else {
                print_drilldown(&drilldown);
            }
        }
        Commands::Config { action } => {
            handle_config(&app, action).await?;
        }
        Commands::Status => {
            println!("Store Status");
            for (table, count) in app.status().await? {
                println!("  {table:<24} {count}");
            }
        }
    }

    Ok(())
}

async fn handle_config(app: &ExecKpi, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match app.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            app.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = app.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

fn print_dashboard(d: &Dashboard) {
    println!(
        "Executive Dashboard: {} ~ {} ({}, by {})",
        d.timeframe.start_date, d.timeframe.end_date, d.timeframe.range, d.timeframe.granularity
    );
    println!("  KPIs:");
    for k in &d.executive_kpis {
        let unit = k.unit.as_deref().unwrap_or("");
        match k.delta {
            Some(delta) => println!(
                "    {:<20} {:>14} {unit:<3} {:+.1}% {:?}",
                k.label,
                k.value,
                delta * 100.0,
                k.direction
            ),
            None => println!("    {:<20} {:>14} {unit}", k.label, k.value),
        }
    }
    if !d.revenue_trend.is_empty() {
        println!("  Revenue trend:");
        println!("    {:<8} {:>14} {:>14} {:>14}", "period", "recognized", "booked", "backlog");
        for p in &d.revenue_trend {
            println!(
                "    {:<8} {:>14.2} {:>14.2} {:>14.2}",
                p.period.to_key(),
                p.recognized,
                p.booked,
                p.backlog
            );
        }
    }
    if !d.alerts.is_empty() {
        println!("  Alerts:");
        for a in &d.alerts {
            println!(
                "    [{}] {} ({})",
                a.severity.as_deref().unwrap_or("-"),
                a.title,
                a.created_at.as_deref().unwrap_or("-")
            );
        }
    }
    if !d.risks.is_empty() {
        println!("  Risks:");
        for r in &d.risks {
            println!(
                "    {} (owner: {}, status: {})",
                r.title,
                r.owner.as_deref().unwrap_or("-"),
                r.status.as_deref().unwrap_or("-")
            );
        }
    }
}

fn print_drilldown(d: &Drilldown) {
    println!(
        "Drilldown: {} ({} ~ {}, by {})",
        d.metric, d.timeframe.start_date, d.timeframe.end_date, d.timeframe.granularity
    );
    if let Some(unit) = &d.unit {
        println!("  Unit: {unit}");
    }
    println!("  Series:");
    for row in &d.series {
        let values: Vec<String> = row.values.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("    {:<8} {}", row.period.to_key(), values.join("  "));
    }
    if !d.breakdown.is_empty() {
        println!("  Breakdown:");
        for b in &d.breakdown {
            println!(
                "    {:<24} {:>14.2} {:>6.1}% ({} rows)",
                b.name,
                b.value,
                b.share * 100.0,
                b.count
            );
        }
    }
}
