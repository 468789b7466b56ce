//! Widget metrics for a nonprofit dashboard.
//!
//! Widgets carry a flat equation of value, operator and number tokens. Value
//! tokens name an aggregate over one of four datasets (donations, requests,
//! scholarships, events), optionally narrowed by field filters. Equations are
//! reduced strictly left to right against an immutable [`DatasetSnapshot`] and
//! the result is rendered in the widget's display format.

pub mod check;
pub mod dashboard;
pub mod db;
pub mod equation;
pub mod error;
pub mod filter;
pub mod format;
pub mod metrics;
pub mod models;
pub mod report;
pub mod snapshot;

pub use check::{check_equation, EquationIssue};
pub use equation::{evaluate_equation, Equation, EquationElement, Evaluator, Operator};
pub use error::{DashboardError, DashboardResult};
pub use filter::{apply_filters, Filter, FilterOp};
pub use format::{format_value, ValueFormat};
pub use metrics::{resolve_value, Aggregates, MetricId};
pub use models::{Dataset, DatasetSnapshot, Widget, WidgetResult};
pub use snapshot::PreparedSnapshot;
