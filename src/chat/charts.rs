use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::actions::BotMessage;
use crate::models::{ChartKind, ChartPayload, ChartPoint};

pub const COMPARISON_TITLE: &str = "Rainfall Comparison (IMD Data)";
pub const TREND_TITLE: &str = "Rainfall Trend & Forecast (IMD Data)";

const BAR_WIDTH: usize = 40;

/// The chart for one turn. A structured payload on any reply wins;
/// otherwise the reply texts are scanned for `label: value mm` lines.
pub fn chart_for_replies(replies: &[BotMessage]) -> Option<ChartPayload> {
    replies.iter().find_map(BotMessage::chart).or_else(|| {
        let texts: Vec<&str> = replies.iter().filter_map(|r| r.text.as_deref()).collect();
        chart_from_text(&texts)
    })
}

/// Parses `label: value mm` lines. Labels containing digits are read as
/// years, the rest as categories. Two or more categories give a bar chart,
/// otherwise two or more years give a line chart.
pub fn chart_from_text(texts: &[&str]) -> Option<ChartPayload> {
    let mut categories: IndexMap<String, f64> = IndexMap::new();
    let mut years: BTreeMap<i32, f64> = BTreeMap::new();

    for line in texts.iter().flat_map(|t| t.lines()).map(str::trim) {
        if !line.contains(':') || !line.contains("mm") {
            continue;
        }
        let mut parts = line.split(':');
        let label = parts.next().unwrap_or_default().trim();
        let raw = parts.next().unwrap_or_default();
        let value = raw.replace("mm", "").replace("➡️", "");
        let value = value.trim();

        if label.is_empty() || !is_plain_number(value) {
            continue;
        }
        let Ok(value) = value.parse::<f64>() else {
            continue;
        };

        if label.chars().any(|c| c.is_ascii_digit()) {
            let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
            if let Ok(year) = digits.parse::<i32>() {
                years.insert(year, value);
            }
        } else {
            categories.insert(label.to_string(), value);
        }
    }

    if categories.len() >= 2 {
        Some(ChartPayload::bar(COMPARISON_TITLE, categories.into_iter().collect()))
    } else if years.len() >= 2 {
        let series: Vec<(i32, f64)> = years.into_iter().collect();
        Some(ChartPayload::yearly(TREND_TITLE, &series))
    } else {
        None
    }
}

/// ASCII digits with at most one dot, and at least one digit.
fn is_plain_number(value: &str) -> bool {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    let dots = value.chars().filter(|c| *c == '.').count();
    digits > 0 && dots <= 1 && digits + dots == value.chars().count()
}

/// Renders the chart as horizontal bars. Forecast rows are drawn dashed:
/// the payload's own forecast point, or for a text-derived series the last
/// point when it directly follows the previous year.
pub fn render_chart(chart: &ChartPayload) -> String {
    let mut rows: Vec<(&ChartPoint, bool)> = chart.points.iter().map(|p| (p, false)).collect();

    if chart.kind == ChartKind::Line {
        match &chart.forecast {
            Some(forecast) => rows.push((forecast, true)),
            None => {
                if let [.., prev, last] = chart.points.as_slice() {
                    if consecutive_years(prev, last) {
                        if let Some(row) = rows.last_mut() {
                            row.1 = true;
                        }
                    }
                }
            }
        }
    }

    let max = rows.iter().map(|(p, _)| p.value).fold(0.0_f64, f64::max);
    let label_width = rows
        .iter()
        .map(|(p, _)| p.label.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = format!("── {} ──\n", chart.title);
    for (point, forecast) in rows {
        let len = if max > 0.0 {
            ((point.value.max(0.0) / max) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let bar = if forecast { "╌".repeat(len) } else { "█".repeat(len) };
        out.push_str(&format!(
            "{:<width$} │{} {:.2} mm{}\n",
            point.label,
            bar,
            point.value,
            if forecast { " (forecast)" } else { "" },
            width = label_width
        ));
    }
    out
}

fn consecutive_years(prev: &ChartPoint, last: &ChartPoint) -> bool {
    match (prev.label.parse::<i32>(), last.label.parse::<i32>()) {
        (Ok(a), Ok(b)) => b - a == 1,
        _ => false,
    }
}
