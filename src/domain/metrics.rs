//! Performance statistics of an equity curve.

use super::portfolio::EquityPoint;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualised standard deviation of daily returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Largest peak-to-trough loss as a fraction of the peak.
    pub max_drawdown: f64,
    /// Longest run of days spent below a previous peak.
    pub max_drawdown_duration: usize,
}

impl Metrics {
    /// Statistics for `curve`, whose first point is the starting equity.
    ///
    /// An empty curve yields all zeros.
    pub fn compute(curve: &[EquityPoint], risk_free_rate: f64) -> Self {
        let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
            return Metrics {
                final_equity: 0.0,
                total_return: 0.0,
                annualized_return: 0.0,
                volatility: 0.0,
                sharpe_ratio: 0.0,
                sortino_ratio: 0.0,
                max_drawdown: 0.0,
                max_drawdown_duration: 0,
            };
        };

        let total_return = if first.equity > 0.0 {
            last.equity / first.equity - 1.0
        } else {
            0.0
        };
        let years = (curve.len() - 1) as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let returns = daily_returns(curve);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let stats = ReturnStats::of(&returns, daily_rf);
        let annualise = TRADING_DAYS_PER_YEAR.sqrt();

        let (max_drawdown, max_drawdown_duration) = drawdown(curve);

        Metrics {
            final_equity: last.equity,
            total_return,
            annualized_return,
            volatility: stats.stddev * annualise,
            sharpe_ratio: ratio(stats.mean - daily_rf, stats.stddev) * annualise,
            sortino_ratio: ratio(stats.mean - daily_rf, stats.downside_dev) * annualise,
            max_drawdown,
            max_drawdown_duration,
        }
    }
}

fn daily_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                w[1].equity / w[0].equity - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

struct ReturnStats {
    mean: f64,
    stddev: f64,
    /// Root mean square of returns below the risk-free rate, over all days.
    downside_dev: f64,
}

impl ReturnStats {
    fn of(returns: &[f64], daily_rf: f64) -> Self {
        if returns.is_empty() {
            return ReturnStats {
                mean: 0.0,
                stddev: 0.0,
                downside_dev: 0.0,
            };
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let downside = returns
            .iter()
            .filter(|r| **r < daily_rf)
            .map(|r| (r - daily_rf).powi(2))
            .sum::<f64>()
            / n;
        ReturnStats {
            mean,
            stddev: variance.sqrt(),
            downside_dev: downside.sqrt(),
        }
    }
}

/// Zero when the denominator is, so flat curves report no risk-adjusted return.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

fn drawdown(curve: &[EquityPoint]) -> (f64, usize) {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    let mut underwater = 0usize;
    let mut longest = 0usize;

    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            underwater = 0;
            continue;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
        underwater += 1;
        longest = longest.max(underwater);
    }

    (max_dd, longest)
}
