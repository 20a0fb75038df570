//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod equity_report_adapter;
pub mod file_config_adapter;
pub mod memory_adapter;
