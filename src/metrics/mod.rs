pub mod delta;
pub mod rules;
pub mod types;

pub use delta::compute_delta;
pub use rules::{FoldRule, MetricRule};
pub use types::*;

use crate::config::Policy;
use crate::date_util::round_to;
use crate::series::SeriesSnapshot;
use crate::window::WindowPair;

/// Compute one KPI for the current window, with a delta when the KPI exposes one.
pub fn aggregate_kpi(
    key: KpiKey,
    windows: &WindowPair,
    data: &SeriesSnapshot,
    policy: &Policy,
) -> AggregatedKpi {
    let rule = key.rule(policy);
    let current = rule.evaluate(&windows.current, data).unwrap_or(0.0);

    let (delta, direction) = if key.exposes_delta() {
        let prior = rule.evaluate(&windows.prior, data);
        compute_delta(current, prior)
    } else {
        (None, Direction::Flat)
    };

    log::debug!("{key}: {current} (delta {delta:?})");

    AggregatedKpi {
        key,
        label: key.label().to_string(),
        value: round_to(current, key.precision()),
        unit: key.unit(policy),
        delta,
        direction,
    }
}

/// Compute the full executive KPI set in its fixed order.
pub fn aggregate_kpis(windows: &WindowPair, data: &SeriesSnapshot, policy: &Policy) -> Vec<AggregatedKpi> {
    KpiKey::ALL
        .iter()
        .map(|key| aggregate_kpi(*key, windows, data, policy))
        .collect()
}
