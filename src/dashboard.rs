use std::path::Path;

use crate::check::{check_equation, EquationIssue};
use crate::error::DashboardResult;
use crate::format::format_value;
use crate::models::{Widget, WidgetResult};
use crate::snapshot::{read_json, PreparedSnapshot};

pub fn evaluate_widget(widget: &Widget, prepared: &PreparedSnapshot) -> WidgetResult {
    let value = prepared
        .evaluator()
        .evaluate(&widget.display_config.equation);
    WidgetResult {
        id: widget.id,
        title: widget.title.clone(),
        section: widget.section.clone(),
        value,
        formatted: format_value(value, &widget.display_config.value_format),
    }
}

/// Active widgets in display order, each evaluated against the same snapshot.
pub fn evaluate_widgets(widgets: &[Widget], prepared: &PreparedSnapshot) -> Vec<WidgetResult> {
    let mut active: Vec<&Widget> = widgets.iter().filter(|widget| widget.is_active).collect();
    active.sort_by(|a, b| {
        a.section
            .cmp(&b.section)
            .then_with(|| a.position.cmp(&b.position))
    });
    active
        .into_iter()
        .map(|widget| evaluate_widget(widget, prepared))
        .collect()
}

/// Authoring issues per widget, omitting widgets without any.
pub fn check_widgets(widgets: &[Widget]) -> Vec<(&Widget, Vec<EquationIssue>)> {
    widgets
        .iter()
        .map(|widget| (widget, check_equation(&widget.display_config.equation)))
        .filter(|(_, issues)| !issues.is_empty())
        .collect()
}

pub async fn load_widgets(path: &Path) -> DashboardResult<Vec<Widget>> {
    read_json(path).await
}
