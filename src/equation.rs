use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use tracing::warn;

use crate::filter::Filter;
use crate::metrics::{resolve_with, Aggregates};
use crate::models::DatasetSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub fn parse(symbol: &str) -> Option<Operator> {
        match symbol {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Subtract),
            "*" => Some(Operator::Multiply),
            "/" => Some(Operator::Divide),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }

    /// Applies `operand` to the running total. Dividing by zero leaves it unchanged.
    pub fn apply(self, total: f64, operand: f64) -> f64 {
        match self {
            Operator::Add => total + operand,
            Operator::Subtract => total - operand,
            Operator::Multiply => total * operand,
            Operator::Divide => {
                if operand == 0.0 {
                    total
                } else {
                    total / operand
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EquationElement {
    Value {
        identifier: String,
        filters: Vec<Filter>,
    },
    Operator {
        symbol: Operator,
    },
    Number {
        literal: f64,
    },
    /// A persisted element whose shape is not understood; kept as-is and
    /// ignored by evaluation.
    Unrecognized {
        raw: Value,
    },
}

impl EquationElement {
    pub fn value(identifier: &str) -> Self {
        EquationElement::Value {
            identifier: identifier.to_string(),
            filters: Vec::new(),
        }
    }

    pub fn filtered(identifier: &str, filters: Vec<Filter>) -> Self {
        EquationElement::Value {
            identifier: identifier.to_string(),
            filters,
        }
    }

    pub fn operator(symbol: Operator) -> Self {
        EquationElement::Operator { symbol }
    }

    pub fn number(literal: f64) -> Self {
        EquationElement::Number { literal }
    }

    /// Reads one persisted element, defaulting missing fields.
    pub fn from_json(raw: &Value) -> Self {
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
        let payload = raw.get("value");
        match kind {
            "value" => EquationElement::Value {
                identifier: payload
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                filters: raw
                    .get("filters")
                    .and_then(Value::as_array)
                    .map(|filters| {
                        filters
                            .iter()
                            .filter_map(|filter| Filter::deserialize(filter).ok())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "operator" => match payload.and_then(Value::as_str).and_then(Operator::parse) {
                Some(symbol) => EquationElement::Operator { symbol },
                None => EquationElement::Unrecognized { raw: raw.clone() },
            },
            "number" => EquationElement::Number {
                literal: payload.map(literal_number).unwrap_or(0.0),
            },
            _ => EquationElement::Unrecognized { raw: raw.clone() },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            EquationElement::Value {
                identifier,
                filters,
            } => json!({ "type": "value", "value": identifier, "filters": filters }),
            EquationElement::Operator { symbol } => {
                json!({ "type": "operator", "value": symbol.symbol() })
            }
            EquationElement::Number { literal } => json!({ "type": "number", "value": literal }),
            EquationElement::Unrecognized { raw } => raw.clone(),
        }
    }
}

fn literal_number(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => {
            let parsed = crate::models::parse_number(text);
            if parsed.is_nan() {
                0.0
            } else {
                parsed
            }
        }
        _ => 0.0,
    }
}

/// A flat token list evaluated strictly left to right.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct Equation {
    elements: Vec<EquationElement>,
}

impl Equation {
    pub fn new(elements: Vec<EquationElement>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[EquationElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl From<Value> for Equation {
    fn from(raw: Value) -> Self {
        let elements = match raw {
            Value::Array(items) => items.iter().map(EquationElement::from_json).collect(),
            Value::Null => Vec::new(),
            other => {
                warn!(%other, "equation is not a list; treating as empty");
                Vec::new()
            }
        };
        Self { elements }
    }
}

impl Serialize for Equation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.elements.iter().map(EquationElement::to_json))
    }
}

/// Evaluates equations against one snapshot, sharing its precomputed aggregates.
pub struct Evaluator<'a> {
    snapshot: &'a DatasetSnapshot,
    aggregates: &'a Aggregates,
}

impl<'a> Evaluator<'a> {
    pub fn new(snapshot: &'a DatasetSnapshot, aggregates: &'a Aggregates) -> Self {
        Self {
            snapshot,
            aggregates,
        }
    }

    pub fn resolve_value(&self, identifier: &str, filters: &[Filter]) -> f64 {
        resolve_with(identifier, self.snapshot, self.aggregates, filters)
    }

    pub fn evaluate(&self, equation: &Equation) -> f64 {
        let mut result = 0.0;
        let mut operator = Operator::Add;

        for element in equation.elements() {
            let operand = match element {
                EquationElement::Operator { symbol } => {
                    operator = *symbol;
                    continue;
                }
                EquationElement::Value {
                    identifier,
                    filters,
                } => self.resolve_value(identifier, filters),
                EquationElement::Number { literal } => *literal,
                EquationElement::Unrecognized { raw } => {
                    warn!(%raw, "skipping unrecognized equation element");
                    continue;
                }
            };
            result = operator.apply(result, operand);
        }

        result
    }
}

pub fn evaluate_equation(equation: &Equation, snapshot: &DatasetSnapshot) -> f64 {
    let aggregates = Aggregates::compute(snapshot);
    Evaluator::new(snapshot, &aggregates).evaluate(equation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use crate::metrics::tests::{arbitrary_snapshot, scenario_snapshot};
    use crate::metrics::MetricId;
    use proptest::prelude::*;
    use proptest::sample::select;

    fn eval(elements: Vec<EquationElement>) -> f64 {
        evaluate_equation(&Equation::new(elements), &scenario_snapshot())
    }

    fn metric_element() -> impl Strategy<Value = EquationElement> {
        select(MetricId::ALL.to_vec()).prop_map(|metric| EquationElement::value(metric.identifier()))
    }

    fn arbitrary_equation() -> impl Strategy<Value = Equation> {
        let element = prop_oneof![
            metric_element(),
            select(vec![
                Operator::Add,
                Operator::Subtract,
                Operator::Multiply,
                Operator::Divide,
            ])
            .prop_map(EquationElement::operator),
            (-100i32..100).prop_map(|n| EquationElement::number(f64::from(n))),
        ];
        proptest::collection::vec(element, 0..10).prop_map(Equation::new)
    }

    proptest! {
        #[test]
        fn evaluation_is_idempotent(
            snapshot in arbitrary_snapshot(),
            equation in arbitrary_equation(),
        ) {
            let aggregates = Aggregates::compute(&snapshot);
            let evaluator = Evaluator::new(&snapshot, &aggregates);
            let first = evaluator.evaluate(&equation);
            let second = evaluator.evaluate(&equation);
            prop_assert_eq!(first.to_bits(), second.to_bits());
            prop_assert_eq!(first.to_bits(), evaluate_equation(&equation, &snapshot).to_bits());
        }

        #[test]
        fn reduces_strictly_left_to_right(
            snapshot in arbitrary_snapshot(),
            a in metric_element(),
            b in metric_element(),
            c in metric_element(),
        ) {
            let aggregates = Aggregates::compute(&snapshot);
            let evaluator = Evaluator::new(&snapshot, &aggregates);
            let resolve = |element: &EquationElement| match element {
                EquationElement::Value { identifier, filters } => {
                    evaluator.resolve_value(identifier, filters)
                }
                _ => 0.0,
            };
            let expected = (resolve(&a) + resolve(&b)) * resolve(&c);
            let equation = Equation::new(vec![
                a,
                EquationElement::operator(Operator::Add),
                b,
                EquationElement::operator(Operator::Multiply),
                c,
            ]);
            prop_assert_eq!(evaluator.evaluate(&equation), expected);
        }
    }

    #[test]
    fn empty_equation_is_zero() {
        assert_eq!(eval(Vec::new()), 0.0);
    }

    #[test]
    fn amount_minus_pending() {
        let result = eval(vec![
            EquationElement::value("donations_amount"),
            EquationElement::operator(Operator::Subtract),
            EquationElement::value("donations_pending"),
        ]);
        assert_eq!(result, 298.0);
    }

    #[test]
    fn filtered_value_sums_approved_only() {
        let result = eval(vec![EquationElement::filtered(
            "donations_amount",
            vec![Filter::new("is_approved", FilterOp::Equals, "true")],
        )]);
        assert_eq!(result, 100.0);
    }

    #[test]
    fn applies_operators_left_to_right() {
        // donations_count = 3, requests_count = 2, events_count = 1
        let result = eval(vec![
            EquationElement::value("events_count"),
            EquationElement::operator(Operator::Add),
            EquationElement::value("requests_count"),
            EquationElement::operator(Operator::Multiply),
            EquationElement::value("donations_count"),
        ]);
        assert_eq!(result, (1.0 + 2.0) * 3.0);
        assert_ne!(result, 1.0 + 2.0 * 3.0);
    }

    #[test]
    fn division_by_zero_leaves_total_unchanged() {
        let result = eval(vec![
            EquationElement::value("donations_amount"),
            EquationElement::operator(Operator::Divide),
            EquationElement::number(0.0),
        ]);
        assert_eq!(result, 300.0);

        let by_empty_metric = eval(vec![
            EquationElement::number(10.0),
            EquationElement::operator(Operator::Divide),
            EquationElement::value("requests_pending"),
        ]);
        assert_eq!(by_empty_metric, 10.0);
    }

    #[test]
    fn last_operator_wins_and_persists() {
        let result = eval(vec![
            EquationElement::number(10.0),
            EquationElement::operator(Operator::Add),
            EquationElement::operator(Operator::Subtract),
            EquationElement::number(4.0),
            EquationElement::number(1.0),
        ]);
        assert_eq!(result, 5.0);
    }

    #[test]
    fn leading_operator_applies_to_initial_zero() {
        let result = eval(vec![
            EquationElement::operator(Operator::Subtract),
            EquationElement::number(7.0),
        ]);
        assert_eq!(result, -7.0);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let snapshot = scenario_snapshot();
        let aggregates = Aggregates::compute(&snapshot);
        let evaluator = Evaluator::new(&snapshot, &aggregates);
        let equation = Equation::new(vec![
            EquationElement::value("scholarships_amount"),
            EquationElement::operator(Operator::Divide),
            EquationElement::value("scholarships_count"),
        ]);
        let first = evaluator.evaluate(&equation);
        let second = evaluator.evaluate(&equation);
        assert_eq!(first, 750.0);
        assert_eq!(first, second);
        assert_eq!(first, evaluate_equation(&equation, &snapshot));
    }

    #[test]
    fn loads_persisted_json_permissively() {
        let equation: Equation = serde_json::from_value(serde_json::json!([
            {"type": "value", "value": "donations_amount", "filters": [
                {"field": "is_approved", "operator": "equals", "value": "true"},
                "not a filter"
            ]},
            {"type": "operator", "value": "%"},
            {"type": "operator", "value": "+"},
            {"type": "number", "value": "25"},
            {"type": "number"},
            {"kind": "mystery"}
        ]))
        .unwrap();

        let elements = equation.elements();
        assert_eq!(elements.len(), 6);
        assert!(matches!(
            &elements[0],
            EquationElement::Value { filters, .. } if filters.len() == 1
        ));
        assert!(matches!(elements[1], EquationElement::Unrecognized { .. }));
        assert_eq!(elements[3], EquationElement::number(25.0));
        assert_eq!(elements[4], EquationElement::number(0.0));
        assert!(matches!(elements[5], EquationElement::Unrecognized { .. }));

        assert_eq!(evaluate_equation(&equation, &scenario_snapshot()), 125.0);
    }

    #[test]
    fn non_list_equation_is_empty() {
        let equation: Equation = serde_json::from_value(serde_json::json!({"oops": 1})).unwrap();
        assert!(equation.is_empty());
    }

    #[test]
    fn serializes_back_to_persisted_shape() {
        let equation = Equation::new(vec![
            EquationElement::value("events_count"),
            EquationElement::operator(Operator::Multiply),
            EquationElement::number(2.0),
        ]);
        let encoded = serde_json::to_value(&equation).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!([
                {"type": "value", "value": "events_count", "filters": []},
                {"type": "operator", "value": "*"},
                {"type": "number", "value": 2.0}
            ])
        );
    }
}
