use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::metrics::{Aggregation, MetricId};
use crate::models::{Dataset, WidgetResult};
use crate::snapshot::PreparedSnapshot;

pub fn build_report(
    organization: Option<&str>,
    prepared: &PreparedSnapshot,
    results: &[WidgetResult],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let label = organization.unwrap_or("all organizations");

    let _ = writeln!(output, "# Dashboard Report");
    let _ = writeln!(
        output,
        "Generated for {} at {} (snapshot fetched {})",
        label,
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        prepared.fetched_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Datasets");

    for dataset in Dataset::ALL {
        let count = |aggregation| {
            MetricId::find(dataset, aggregation)
                .map(|metric| prepared.aggregates.get(metric))
                .unwrap_or(0.0)
        };
        let _ = writeln!(
            output,
            "- {}: {} records ({} approved, {} pending)",
            dataset,
            prepared.snapshot.len(dataset),
            count(Aggregation::Approved),
            count(Aggregation::Pending)
        );
    }

    if results.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No active widgets configured.");
        return output;
    }

    let mut current_section: Option<&str> = None;
    for result in results {
        if current_section != Some(result.section.as_str()) {
            let _ = writeln!(output);
            let _ = writeln!(output, "## {}", result.section);
            current_section = Some(result.section.as_str());
        }
        let _ = writeln!(output, "- {}: {}", result.title, result.formatted);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::scenario_snapshot;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn result(section: &str, title: &str, formatted: &str) -> WidgetResult {
        WidgetResult {
            id: Uuid::new_v4(),
            title: title.to_string(),
            section: section.to_string(),
            value: 0.0,
            formatted: formatted.to_string(),
        }
    }

    #[test]
    fn groups_widgets_by_section() {
        let prepared = PreparedSnapshot::new(scenario_snapshot());
        let generated_at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let results = vec![
            result("donations", "Still needed", "$298"),
            result("donations", "Goods", "15.50 lbs"),
            result("requests", "Completion", "50.00%"),
        ];
        let report = build_report(Some("Harbor Food Bank"), &prepared, &results, generated_at);

        assert!(report.starts_with("# Dashboard Report\nGenerated for Harbor Food Bank at 2026-10-18 09:30 UTC"));
        assert!(report.contains("- donations: 3 records (1 approved, 2 pending)"));
        assert!(report.contains("- events: 1 records (0 approved, 1 pending)"));
        assert!(report.contains("## donations\n- Still needed: $298\n- Goods: 15.50 lbs\n"));
        assert!(report.contains("## requests\n- Completion: 50.00%\n"));
        assert_eq!(report.matches("## donations").count(), 1);
    }

    #[test]
    fn notes_missing_widgets() {
        let prepared = PreparedSnapshot::new(scenario_snapshot());
        let report = build_report(None, &prepared, &[], Utc::now());
        assert!(report.contains("all organizations"));
        assert!(report.ends_with("No active widgets configured.\n"));
    }
}
