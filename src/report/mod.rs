//! Result reporting: comparison plots and summary tables

pub mod plots;
pub mod summary;

pub use plots::{render_comparison, Metric, Panel};
pub use summary::{summary_table, task_report};
