use std::collections::HashMap;

use tracing::debug;

use crate::filter::{apply_filters, Filter};
use crate::models::{Dataset, DatasetSnapshot, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Count,
    /// Sum of a numeric column, missing values counting as zero.
    Sum(&'static str),
    Approved,
    Pending,
    Completed,
}

impl Aggregation {
    pub fn reduce<'a, R, I>(self, records: I) -> f64
    where
        R: Record + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let records = records.into_iter();
        match self {
            Aggregation::Count => records.count() as f64,
            Aggregation::Sum(column) => records.map(|record| record.number_or_zero(column)).sum(),
            Aggregation::Approved => records
                .filter(|record| record.field("is_approved").is_true())
                .count() as f64,
            Aggregation::Pending => records
                .filter(|record| {
                    !record.field("is_approved").is_true()
                        && !record.field("approval_decision_made").is_true()
                })
                .count() as f64,
            Aggregation::Completed => records
                .filter(|record| record.field("is_completed").is_true())
                .count() as f64,
        }
    }
}

/// The fixed set of identifiers a value element may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricId {
    DonationsCount,
    DonationsAmount,
    DonationsWeight,
    DonationsApproved,
    DonationsPending,
    RequestsCount,
    RequestsApproved,
    RequestsPending,
    RequestsCompleted,
    ScholarshipsCount,
    ScholarshipsAmount,
    ScholarshipsApproved,
    ScholarshipsPending,
    EventsCount,
    EventsApproved,
    EventsPending,
}

impl MetricId {
    pub const ALL: [MetricId; 16] = [
        MetricId::DonationsCount,
        MetricId::DonationsAmount,
        MetricId::DonationsWeight,
        MetricId::DonationsApproved,
        MetricId::DonationsPending,
        MetricId::RequestsCount,
        MetricId::RequestsApproved,
        MetricId::RequestsPending,
        MetricId::RequestsCompleted,
        MetricId::ScholarshipsCount,
        MetricId::ScholarshipsAmount,
        MetricId::ScholarshipsApproved,
        MetricId::ScholarshipsPending,
        MetricId::EventsCount,
        MetricId::EventsApproved,
        MetricId::EventsPending,
    ];

    pub fn identifier(self) -> &'static str {
        match self {
            MetricId::DonationsCount => "donations_count",
            MetricId::DonationsAmount => "donations_amount",
            MetricId::DonationsWeight => "donations_weight",
            MetricId::DonationsApproved => "donations_approved",
            MetricId::DonationsPending => "donations_pending",
            MetricId::RequestsCount => "requests_count",
            MetricId::RequestsApproved => "requests_approved",
            MetricId::RequestsPending => "requests_pending",
            MetricId::RequestsCompleted => "requests_completed",
            MetricId::ScholarshipsCount => "scholarships_count",
            MetricId::ScholarshipsAmount => "scholarships_amount",
            MetricId::ScholarshipsApproved => "scholarships_approved",
            MetricId::ScholarshipsPending => "scholarships_pending",
            MetricId::EventsCount => "events_count",
            MetricId::EventsApproved => "events_approved",
            MetricId::EventsPending => "events_pending",
        }
    }

    pub fn parse(identifier: &str) -> Option<MetricId> {
        MetricId::ALL
            .into_iter()
            .find(|metric| metric.identifier() == identifier)
    }

    pub fn find(dataset: Dataset, aggregation: Aggregation) -> Option<MetricId> {
        MetricId::ALL
            .into_iter()
            .find(|metric| metric.dataset() == dataset && metric.aggregation() == aggregation)
    }

    pub fn dataset(self) -> Dataset {
        match self {
            MetricId::DonationsCount
            | MetricId::DonationsAmount
            | MetricId::DonationsWeight
            | MetricId::DonationsApproved
            | MetricId::DonationsPending => Dataset::Donations,
            MetricId::RequestsCount
            | MetricId::RequestsApproved
            | MetricId::RequestsPending
            | MetricId::RequestsCompleted => Dataset::Requests,
            MetricId::ScholarshipsCount
            | MetricId::ScholarshipsAmount
            | MetricId::ScholarshipsApproved
            | MetricId::ScholarshipsPending => Dataset::Scholarships,
            MetricId::EventsCount | MetricId::EventsApproved | MetricId::EventsPending => {
                Dataset::Events
            }
        }
    }

    pub fn aggregation(self) -> Aggregation {
        match self {
            MetricId::DonationsCount
            | MetricId::RequestsCount
            | MetricId::ScholarshipsCount
            | MetricId::EventsCount => Aggregation::Count,
            MetricId::DonationsAmount => Aggregation::Sum("amount_needed"),
            MetricId::DonationsWeight => Aggregation::Sum("weight"),
            MetricId::ScholarshipsAmount => Aggregation::Sum("amount"),
            MetricId::DonationsApproved
            | MetricId::RequestsApproved
            | MetricId::ScholarshipsApproved
            | MetricId::EventsApproved => Aggregation::Approved,
            MetricId::DonationsPending
            | MetricId::RequestsPending
            | MetricId::ScholarshipsPending
            | MetricId::EventsPending => Aggregation::Pending,
            MetricId::RequestsCompleted => Aggregation::Completed,
        }
    }

    /// Aggregate over the dataset this metric targets, narrowed by `filters`.
    pub fn compute(self, snapshot: &DatasetSnapshot, filters: &[Filter]) -> f64 {
        let aggregation = self.aggregation();
        match self.dataset() {
            Dataset::Donations => aggregation.reduce(apply_filters(&snapshot.donations, filters)),
            Dataset::Requests => aggregation.reduce(apply_filters(&snapshot.requests, filters)),
            Dataset::Scholarships => {
                aggregation.reduce(apply_filters(&snapshot.scholarships, filters))
            }
            Dataset::Events => aggregation.reduce(apply_filters(&snapshot.events, filters)),
        }
    }
}

/// Unfiltered value of every metric, computed once per snapshot refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    values: HashMap<MetricId, f64>,
}

impl Aggregates {
    pub fn compute(snapshot: &DatasetSnapshot) -> Self {
        let values = MetricId::ALL
            .into_iter()
            .map(|metric| (metric, metric.compute(snapshot, &[])))
            .collect();
        Self { values }
    }

    pub fn get(&self, metric: MetricId) -> f64 {
        self.values.get(&metric).copied().unwrap_or(0.0)
    }
}

/// Resolves a value element against precomputed aggregates, falling back to
/// an on-demand filtered aggregate when the element carries filters.
pub fn resolve_with(
    identifier: &str,
    snapshot: &DatasetSnapshot,
    aggregates: &Aggregates,
    filters: &[Filter],
) -> f64 {
    let Some(metric) = MetricId::parse(identifier) else {
        debug!(identifier, "unknown metric identifier resolves to 0");
        return 0.0;
    };

    if filters.is_empty() {
        aggregates.get(metric)
    } else {
        metric.compute(snapshot, filters)
    }
}

pub fn resolve_value(identifier: &str, snapshot: &DatasetSnapshot, filters: &[Filter]) -> f64 {
    match MetricId::parse(identifier) {
        Some(metric) => metric.compute(snapshot, filters),
        None => {
            debug!(identifier, "unknown metric identifier resolves to 0");
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use crate::models::{Donation, Event, Request, Scholarship};
    use proptest::collection::vec;
    use proptest::option;
    use proptest::prelude::*;

    fn flags() -> impl Strategy<Value = (Option<bool>, Option<bool>)> {
        (option::of(any::<bool>()), option::of(any::<bool>()))
    }

    /// Snapshots with gaps in every optional column the aggregates read.
    pub(crate) fn arbitrary_snapshot() -> impl Strategy<Value = DatasetSnapshot> {
        let donation = (
            option::of(0.0..5000.0f64),
            option::of(0.0..500.0f64),
            flags(),
        )
            .prop_map(|(amount_needed, weight, (is_approved, approval_decision_made))| {
                Donation {
                    amount_needed,
                    weight,
                    is_approved,
                    approval_decision_made,
                    ..Donation::default()
                }
            });
        let request = (flags(), option::of(any::<bool>())).prop_map(
            |((is_approved, approval_decision_made), is_completed)| Request {
                is_approved,
                approval_decision_made,
                is_completed,
                ..Request::default()
            },
        );
        let scholarship = (option::of(0.0..20000.0f64), flags()).prop_map(
            |(amount, (is_approved, approval_decision_made))| Scholarship {
                amount,
                is_approved,
                approval_decision_made,
                ..Scholarship::default()
            },
        );
        let event = flags().prop_map(|(is_approved, approval_decision_made)| Event {
            is_approved,
            approval_decision_made,
            ..Event::default()
        });

        (
            vec(donation, 0..12),
            vec(request, 0..12),
            vec(scholarship, 0..12),
            vec(event, 0..12),
        )
            .prop_map(|(donations, requests, scholarships, events)| DatasetSnapshot {
                donations,
                requests,
                scholarships,
                events,
            })
    }

    proptest! {
        #[test]
        fn precomputed_values_match_naive_resolution(snapshot in arbitrary_snapshot()) {
            let aggregates = Aggregates::compute(&snapshot);
            for metric in MetricId::ALL {
                let naive = resolve_value(metric.identifier(), &snapshot, &[]);
                let cached = resolve_with(metric.identifier(), &snapshot, &aggregates, &[]);
                prop_assert_eq!(naive, cached, "{}", metric.identifier());
            }
        }

        #[test]
        fn match_all_filters_leave_values_unchanged(snapshot in arbitrary_snapshot()) {
            let aggregates = Aggregates::compute(&snapshot);
            let everything = vec![
                Filter::new("id", FilterOp::Contains, "-"),
                Filter::new("", FilterOp::Equals, ""),
            ];
            for metric in MetricId::ALL {
                let filtered = resolve_with(metric.identifier(), &snapshot, &aggregates, &everything);
                prop_assert_eq!(filtered, aggregates.get(metric), "{}", metric.identifier());
            }
        }
    }

    pub(crate) fn scenario_snapshot() -> DatasetSnapshot {
        DatasetSnapshot {
            donations: vec![
                Donation {
                    amount_needed: Some(100.0),
                    weight: Some(12.5),
                    is_approved: Some(true),
                    approval_decision_made: Some(true),
                    ..Donation::default()
                },
                Donation {
                    amount_needed: Some(200.0),
                    weight: Some(3.0),
                    is_approved: Some(false),
                    approval_decision_made: Some(false),
                    ..Donation::default()
                },
                Donation {
                    amount_needed: Some(0.0),
                    ..Donation::default()
                },
            ],
            requests: vec![
                Request {
                    is_completed: Some(true),
                    is_approved: Some(true),
                    ..Request::default()
                },
                Request {
                    is_approved: Some(false),
                    approval_decision_made: Some(true),
                    ..Request::default()
                },
            ],
            scholarships: vec![
                Scholarship {
                    amount: Some(1500.0),
                    is_approved: Some(true),
                    ..Scholarship::default()
                },
                Scholarship {
                    amount: None,
                    ..Scholarship::default()
                },
            ],
            events: vec![Event::default()],
        }
    }

    #[test]
    fn aggregate_table_matches_reductions() {
        let snapshot = scenario_snapshot();
        let aggregates = Aggregates::compute(&snapshot);
        assert_eq!(aggregates.get(MetricId::DonationsCount), 3.0);
        assert_eq!(aggregates.get(MetricId::DonationsAmount), 300.0);
        assert_eq!(aggregates.get(MetricId::DonationsWeight), 15.5);
        assert_eq!(aggregates.get(MetricId::DonationsApproved), 1.0);
        assert_eq!(aggregates.get(MetricId::DonationsPending), 2.0);
        assert_eq!(aggregates.get(MetricId::RequestsCompleted), 1.0);
        assert_eq!(aggregates.get(MetricId::RequestsPending), 0.0);
        assert_eq!(aggregates.get(MetricId::ScholarshipsAmount), 1500.0);
        assert_eq!(aggregates.get(MetricId::ScholarshipsPending), 1.0);
        assert_eq!(aggregates.get(MetricId::EventsCount), 1.0);
        assert_eq!(aggregates.get(MetricId::EventsPending), 1.0);
    }

    #[test]
    fn unfiltered_resolution_matches_naive_path() {
        let snapshot = scenario_snapshot();
        let aggregates = Aggregates::compute(&snapshot);
        for metric in MetricId::ALL {
            let naive = resolve_value(metric.identifier(), &snapshot, &[]);
            let cached = resolve_with(metric.identifier(), &snapshot, &aggregates, &[]);
            assert_eq!(naive, cached, "{}", metric.identifier());
        }
    }

    #[test]
    fn match_all_filters_agree_with_precomputed_values() {
        let snapshot = scenario_snapshot();
        let aggregates = Aggregates::compute(&snapshot);
        let everything = vec![Filter::new("id", FilterOp::Contains, "-")];
        for metric in MetricId::ALL {
            let filtered = resolve_with(metric.identifier(), &snapshot, &aggregates, &everything);
            assert_eq!(filtered, aggregates.get(metric), "{}", metric.identifier());
        }
    }

    #[test]
    fn filtered_values_narrow_the_dataset() {
        let snapshot = scenario_snapshot();
        let approved = vec![Filter::new("is_approved", FilterOp::Equals, "true")];
        assert_eq!(resolve_value("donations_amount", &snapshot, &approved), 100.0);
        assert_eq!(resolve_value("requests_count", &snapshot, &approved), 1.0);
        assert_eq!(resolve_value("scholarships_amount", &snapshot, &approved), 1500.0);
    }

    #[test]
    fn unknown_identifiers_resolve_to_zero() {
        let snapshot = scenario_snapshot();
        assert_eq!(resolve_value("volunteers_count", &snapshot, &[]), 0.0);
        let filters = vec![Filter::new("is_approved", FilterOp::Equals, "true")];
        assert_eq!(resolve_value("", &snapshot, &filters), 0.0);
    }

    #[test]
    fn identifiers_round_trip() {
        for metric in MetricId::ALL {
            assert_eq!(MetricId::parse(metric.identifier()), Some(metric));
            assert!(metric.identifier().starts_with(metric.dataset().name()));
        }
    }
}
