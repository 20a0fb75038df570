//! Equity curve output port trait.

use crate::domain::error::RebalancerError;
use crate::domain::portfolio::EquityPoint;

/// One named equity curve, e.g. the strategy or its benchmark.
#[derive(Debug, Clone, Copy)]
pub struct NamedCurve<'a> {
    pub name: &'a str,
    pub points: &'a [EquityPoint],
}

/// Port for writing equity curves for an external reporting tool.
pub trait ReportPort {
    fn write(&self, curves: &[NamedCurve<'_>], output_path: &str) -> Result<(), RebalancerError>;
}
