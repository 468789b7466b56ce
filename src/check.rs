//! Authoring checks for equations.
//!
//! Evaluation never rejects an equation: unknown identifiers resolve to zero,
//! unknown fields compare as absent and malformed elements are skipped. These
//! checks surface the same situations as explicit issues so that mistakes in
//! the equation builder can be caught without changing the numbers already
//! shown for persisted widgets.

use crate::equation::{Equation, EquationElement, Operator};
use crate::filter::FilterOp;
use crate::metrics::MetricId;
use crate::models::Dataset;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EquationIssue {
    #[error("element {index}: unknown metric identifier '{identifier}'")]
    UnknownIdentifier { index: usize, identifier: String },

    #[error("element {index}: field '{field}' does not exist on {dataset}")]
    UnknownField {
        index: usize,
        dataset: Dataset,
        field: String,
    },

    #[error("element {index}: filter on '{field}' uses an unsupported operator")]
    UnsupportedOperator { index: usize, field: String },

    #[error("element {index}: filter on '{field}' has no field or value and is ignored")]
    IncompleteFilter { index: usize, field: String },

    #[error("element {index}: unrecognized element is ignored")]
    UnrecognizedElement { index: usize },

    #[error("element {index}: operator replaces the preceding operator")]
    ConsecutiveOperators { index: usize },

    #[error("element {index}: operator has no operand after it")]
    TrailingOperator { index: usize },

    #[error("element {index}: division by the literal 0 is skipped")]
    DivisionByZero { index: usize },
}

pub fn check_equation(equation: &Equation) -> Vec<EquationIssue> {
    let mut issues = Vec::new();
    let mut pending: Option<(usize, Operator)> = None;

    for (index, element) in equation.elements().iter().enumerate() {
        match element {
            EquationElement::Operator { symbol } => {
                if pending.is_some() {
                    issues.push(EquationIssue::ConsecutiveOperators { index });
                }
                pending = Some((index, *symbol));
            }
            EquationElement::Value {
                identifier,
                filters,
            } => {
                pending = None;
                let Some(metric) = MetricId::parse(identifier) else {
                    issues.push(EquationIssue::UnknownIdentifier {
                        index,
                        identifier: identifier.clone(),
                    });
                    continue;
                };
                let dataset = metric.dataset();
                for filter in filters {
                    if filter.is_incomplete() {
                        issues.push(EquationIssue::IncompleteFilter {
                            index,
                            field: filter.field.clone(),
                        });
                        continue;
                    }
                    if !dataset.has_field(&filter.field) {
                        issues.push(EquationIssue::UnknownField {
                            index,
                            dataset,
                            field: filter.field.clone(),
                        });
                    }
                    if filter.operator == FilterOp::Unsupported {
                        issues.push(EquationIssue::UnsupportedOperator {
                            index,
                            field: filter.field.clone(),
                        });
                    }
                }
            }
            EquationElement::Number { literal } => {
                if *literal == 0.0 && matches!(pending, Some((_, Operator::Divide))) {
                    issues.push(EquationIssue::DivisionByZero { index });
                }
                pending = None;
            }
            EquationElement::Unrecognized { .. } => {
                issues.push(EquationIssue::UnrecognizedElement { index });
            }
        }
    }

    if let Some((index, _)) = pending {
        issues.push(EquationIssue::TrailingOperator { index });
    }

    issues
}
