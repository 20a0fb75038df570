//! Backtest orchestrator: the daily simulation loop.
//!
//! Each trading day in `[start, end]` the ledger is marked to market; on
//! rebalance dates the alpha model, portfolio construction, order
//! generation and the ledger run in that order; then the day's equity is
//! appended to the curve.

use chrono::{Duration, NaiveDate};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::alpha::AlphaModel;
use super::calendar::{RebalanceCalendar, RebalanceFrequency, month_end};
use super::construction::{ConstructionConfig, Redistribution, construct_weights};
use super::error::RebalancerError;
use super::orders::{Order, OrderGeneratorConfig, generate_orders};
use super::portfolio::{EquityPoint, Fill, LedgerConfig, Portfolio};
use super::{AssetId, TargetWeights};
use crate::ports::calendar_port::MarketCalendar;
use crate::ports::price_port::PriceSeriesProvider;
use crate::ports::universe_port::Universe;

/// What a run does when the alpha model or construction cannot produce
/// weights on a rebalance date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationFailurePolicy {
    #[default]
    Halt,
    /// Log, skip that rebalance, keep prior holdings.
    SkipAndHold,
}

impl AllocationFailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "halt" => Some(AllocationFailurePolicy::Halt),
            "skip" | "skip_and_hold" => Some(AllocationFailurePolicy::SkipAndHold),
            _ => None,
        }
    }
}

impl fmt::Display for AllocationFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationFailurePolicy::Halt => write!(f, "halt"),
            AllocationFailurePolicy::SkipAndHold => write!(f, "skip and hold"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub frequency: RebalanceFrequency,
    pub long_only: bool,
    pub cash_buffer: f64,
    pub min_trade_threshold: f64,
    pub cash_tolerance: f64,
    pub redistribution: Redistribution,
    pub on_allocation_error: AllocationFailurePolicy,
}

impl BacktestConfig {
    /// Config with the default long-only, unbuffered, zero-threshold settings.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        initial_capital: f64,
        frequency: RebalanceFrequency,
    ) -> Self {
        BacktestConfig {
            start_date,
            end_date,
            initial_capital,
            frequency,
            long_only: true,
            cash_buffer: 0.0,
            min_trade_threshold: 0.0,
            cash_tolerance: 0.0,
            redistribution: Redistribution::default(),
            on_allocation_error: AllocationFailurePolicy::default(),
        }
    }

    pub fn construction(&self) -> ConstructionConfig {
        ConstructionConfig {
            long_only: self.long_only,
            cash_buffer: self.cash_buffer,
            redistribution: self.redistribution,
        }
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            cash_tolerance: self.cash_tolerance,
            long_only: self.long_only,
        }
    }

    pub fn order_generator(&self) -> OrderGeneratorConfig {
        OrderGeneratorConfig {
            min_trade_threshold: self.min_trade_threshold,
            long_only: self.long_only,
        }
    }

    fn check(&self) -> Result<(), RebalancerError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(RebalancerError::configuration(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(0.0..1.0).contains(&self.cash_buffer) {
            return Err(RebalancerError::configuration(format!(
                "cash buffer must be in [0, 1), got {}",
                self.cash_buffer
            )));
        }
        if self.min_trade_threshold < 0.0 || !self.min_trade_threshold.is_finite() {
            return Err(RebalancerError::configuration(format!(
                "min trade threshold must be non-negative, got {}",
                self.min_trade_threshold
            )));
        }
        if self.cash_tolerance < 0.0 || !self.cash_tolerance.is_finite() {
            return Err(RebalancerError::configuration(format!(
                "cash tolerance must be non-negative, got {}",
                self.cash_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and why a run halted.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub date: NaiveDate,
    pub asset: Option<AssetId>,
    pub reason: String,
}

/// What happened on one rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceEvent {
    pub date: NaiveDate,
    pub targets: TargetWeights,
    pub fills: Vec<Fill>,
    pub deferred: Vec<AssetId>,
    /// Orders refused by the ledger for lack of cash.
    pub skipped_orders: Vec<Order>,
    /// The whole rebalance was skipped after an allocation failure.
    pub skipped: bool,
}

impl RebalanceEvent {
    fn skipped(date: NaiveDate) -> Self {
        RebalanceEvent {
            date,
            targets: TargetWeights::new(),
            fills: Vec::new(),
            deferred: Vec::new(),
            skipped_orders: Vec::new(),
            skipped: true,
        }
    }
}

pub struct Backtest<'a> {
    config: BacktestConfig,
    prices: &'a dyn PriceSeriesProvider,
    universe: &'a dyn Universe,
    alpha: &'a dyn AlphaModel,
    trading_days: Vec<NaiveDate>,
    rebalance_calendar: RebalanceCalendar,
    portfolio: Portfolio,
    curve: Vec<EquityPoint>,
    events: Vec<RebalanceEvent>,
    state: RunState,
    failure: Option<FailureReport>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Backtest<'a> {
    /// Validate the config and precompute the trading days and rebalance
    /// calendar. Nothing is simulated yet.
    pub fn new(
        config: BacktestConfig,
        prices: &'a dyn PriceSeriesProvider,
        calendar: &'a dyn MarketCalendar,
        universe: &'a dyn Universe,
        alpha: &'a dyn AlphaModel,
    ) -> Result<Self, RebalancerError> {
        config.check()?;
        if config.start_date > config.end_date {
            return Err(RebalancerError::configuration(format!(
                "start date {} is after end date {}",
                config.start_date, config.end_date
            )));
        }

        // Month and week ends are resolved past `end` before clipping.
        let lookahead_end = month_end(config.end_date) + Duration::days(7);
        let calendar_days = calendar.trading_days(config.start_date, lookahead_end);
        if let Some(pair) = calendar_days.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RebalancerError::configuration(format!(
                "trading days are not strictly increasing: {} then {}",
                pair[0], pair[1]
            )));
        }

        let rebalance_calendar = RebalanceCalendar::build(
            config.start_date,
            config.end_date,
            config.frequency,
            &calendar_days,
        )?;
        let trading_days: Vec<NaiveDate> = calendar_days
            .into_iter()
            .filter(|d| *d <= config.end_date)
            .collect();
        let portfolio = Portfolio::with_config(config.initial_capital, config.ledger());

        Ok(Backtest {
            config,
            prices,
            universe,
            alpha,
            trading_days,
            rebalance_calendar,
            portfolio,
            curve: Vec::new(),
            events: Vec::new(),
            state: RunState::NotStarted,
            failure: None,
            cancel: None,
        })
    }

    /// Share a flag that stops the run before the next trading day once set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        self.failure.as_ref()
    }

    pub fn rebalance_events(&self) -> &[RebalanceEvent] {
        &self.events
    }

    pub fn rebalance_calendar(&self) -> &RebalanceCalendar {
        &self.rebalance_calendar
    }

    pub fn trading_days(&self) -> &[NaiveDate] {
        &self.trading_days
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// The daily `(date, equity)` curve; partial for a failed run.
    pub fn equity_curve(&self) -> Result<&[EquityPoint], RebalancerError> {
        match self.state {
            RunState::Completed | RunState::Failed => Ok(&self.curve),
            other => Err(RebalancerError::InvalidState {
                operation: "read the equity curve",
                state: other.as_str(),
            }),
        }
    }

    /// Simulate every trading day. A run can happen once.
    pub fn run(&mut self) -> Result<(), RebalancerError> {
        if self.state != RunState::NotStarted {
            return Err(RebalancerError::InvalidState {
                operation: "run",
                state: self.state.as_str(),
            });
        }
        self.state = RunState::Running;
        info!(
            "running {} to {} over {} trading days, {} rebalances ({})",
            self.config.start_date,
            self.config.end_date,
            self.trading_days.len(),
            self.rebalance_calendar.len(),
            self.config.frequency
        );

        for day in self.trading_days.clone() {
            if self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
                return Err(self.fail(day, RebalancerError::Cancelled { date: day }));
            }
            if let Err(e) = self.step(day) {
                return Err(self.fail(day, e));
            }
        }

        self.state = RunState::Completed;
        if let Some(last) = self.curve.last() {
            info!("completed on {} with equity {:.2}", last.date, last.equity);
        }
        Ok(())
    }

    fn step(&mut self, day: NaiveDate) -> Result<(), RebalancerError> {
        let mut equity = self.portfolio.mark_to_market(self.prices, day)?;
        if self.rebalance_calendar.contains(day) {
            self.rebalance(day, equity)?;
            equity = self.portfolio.total_equity(self.prices, day)?;
        }
        self.curve.push(EquityPoint { date: day, equity });
        Ok(())
    }

    fn rebalance(&mut self, day: NaiveDate, equity: f64) -> Result<(), RebalancerError> {
        let targets = match self.targets(day) {
            Ok(t) => t,
            Err(e @ RebalancerError::Allocation { .. })
                if self.config.on_allocation_error == AllocationFailurePolicy::SkipAndHold =>
            {
                warn!("{e}; holding current positions");
                self.events.push(RebalanceEvent::skipped(day));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let plan = generate_orders(
            &self.portfolio,
            self.prices,
            &targets,
            equity,
            day,
            &self.config.order_generator(),
        )?;

        let mut event = RebalanceEvent {
            date: day,
            targets,
            fills: Vec::with_capacity(plan.orders.len()),
            deferred: plan.deferred,
            skipped_orders: Vec::new(),
            skipped: false,
        };
        for order in plan.orders {
            match self.portfolio.apply(&order, self.prices) {
                Ok(fill) => event.fills.push(fill),
                Err(e @ RebalancerError::InsufficientCash { .. }) => {
                    warn!("{e}; skipping order");
                    event.skipped_orders.push(order);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "{day}: rebalanced at equity {equity:.2}, {} fills, {} skipped, {} deferred",
            event.fills.len(),
            event.skipped_orders.len(),
            event.deferred.len()
        );
        self.events.push(event);
        Ok(())
    }

    fn targets(&self, day: NaiveDate) -> Result<TargetWeights, RebalancerError> {
        let signal = self.alpha.forecast(day)?;
        let members = self.universe.members_at(day);
        construct_weights(&signal, &members, &self.config.construction(), day)
    }

    fn fail(&mut self, day: NaiveDate, err: RebalancerError) -> RebalancerError {
        error!("backtest halted on {day}: {err}");
        self.state = RunState::Failed;
        self.failure = Some(FailureReport {
            date: day,
            asset: err.asset().map(str::to_string),
            reason: err.to_string(),
        });
        err
    }
}
