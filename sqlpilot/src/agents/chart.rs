//! Chart agent and the decision whether to chart at all.

use super::{AgentKind, WorkerAgent};
use crate::config::PipelineConfig;
use crate::errors::AgentError;
use crate::state::{ChartArtifact, ExecutionRecord, Message, PipelineState, StateDelta, UserContext};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static DATE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}(-\d{1,2})?").expect("static date pattern"));

const TEMPORAL_NAMES: &[&str] = &[
    "date", "time", "day", "week", "month", "year", "日期", "时间", "年", "月",
];

const VISUALIZATION_KEYWORDS: &[&str] = &["chart", "plot", "graph", "图表", "趋势", "分布", "比较"];

/// Pie charts are only used up to this many slices.
const PIE_MAX_ROWS: usize = 8;

/// Returns true if the latest execution should be charted.
///
/// Charting needs intent (analysis flag or visualization keyword, or
/// `auto_chart`), a numeric column, and a row count inside the configured
/// band. All three must hold.
#[must_use]
pub fn wants_chart(state: &PipelineState, config: &PipelineConfig) -> bool {
    if !config.chart_enabled {
        return false;
    }
    let Some(execution) = state.latest_execution().filter(|e| e.success) else {
        return false;
    };
    let rows = execution.rows.as_deref().unwrap_or_default();
    if !(config.chart_min_rows..=config.chart_max_rows).contains(&rows.len()) {
        return false;
    }

    let asked = state.latest_analysis().is_some_and(|a| a.wants_visualization)
        || VISUALIZATION_KEYWORDS.iter().any(|k| state.query().contains(k));
    (asked || config.auto_chart) && !numeric_columns(execution).is_empty()
}

fn is_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn as_number(value: &Value) -> Value {
    match value {
        Value::String(s) => s.trim().parse::<f64>().map_or(Value::Null, |n| json!(n)),
        other => other.clone(),
    }
}

/// Indices of columns whose non-null values are all numeric.
fn numeric_columns(execution: &ExecutionRecord) -> Vec<usize> {
    let rows = execution.rows.as_deref().unwrap_or_default();
    (0..execution.columns.len())
        .filter(|&i| {
            let mut values = rows.iter().filter_map(|r| r.get(i)).filter(|v| !v.is_null()).peekable();
            values.peek().is_some() && values.all(is_number)
        })
        .collect()
}

fn is_temporal(execution: &ExecutionRecord, index: usize) -> bool {
    let name = execution.columns[index].to_lowercase();
    if TEMPORAL_NAMES.iter().any(|t| name.contains(t)) {
        return true;
    }
    execution
        .rows
        .as_deref()
        .unwrap_or_default()
        .first()
        .and_then(|r| r.get(index))
        .and_then(Value::as_str)
        .is_some_and(|s| DATE_LIKE.is_match(s))
}

/// Picks the chart type and fields for a result.
fn plan_chart(execution: &ExecutionRecord) -> Option<(&'static str, usize, Vec<usize>)> {
    let numeric = numeric_columns(execution);
    if numeric.is_empty() {
        return None;
    }
    let labels: Vec<usize> = (0..execution.columns.len())
        .filter(|i| !numeric.contains(i))
        .collect();

    if is_temporal(execution, 0) {
        let y = numeric.iter().copied().filter(|&i| i != 0).collect::<Vec<_>>();
        if !y.is_empty() {
            return Some(("line", 0, y));
        }
    }
    if labels.len() == 1 && numeric.len() == 1 && execution.row_count <= PIE_MAX_ROWS {
        return Some(("pie", labels[0], numeric));
    }
    if labels.is_empty() && numeric.len() == 2 {
        return Some(("scatter", numeric[0], vec![numeric[1]]));
    }
    let x = labels.first().copied().unwrap_or(0);
    let y: Vec<usize> = numeric.into_iter().filter(|&i| i != x).collect();
    if y.is_empty() {
        return None;
    }
    Some(("bar", x, y))
}

fn echarts_option(
    chart_type: &str,
    title: &str,
    execution: &ExecutionRecord,
    x: usize,
    y: &[usize],
) -> Value {
    let rows = execution.rows.as_deref().unwrap_or_default();
    let column = |i: usize| rows.iter().map(|r| r.get(i).cloned().unwrap_or(Value::Null)).collect::<Vec<_>>();
    let numbers = |i: usize| rows.iter().map(|r| r.get(i).map_or(Value::Null, as_number)).collect::<Vec<_>>();
    let names: Vec<&String> = y.iter().map(|&i| &execution.columns[i]).collect();

    match chart_type {
        "pie" => {
            let data: Vec<Value> = column(x)
                .into_iter()
                .zip(numbers(y[0]))
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect();
            json!({
                "title": { "text": title },
                "tooltip": { "trigger": "item" },
                "series": [{ "name": names[0], "type": "pie", "radius": "50%", "data": data }],
            })
        }
        "scatter" => {
            let data: Vec<Value> = numbers(x)
                .into_iter()
                .zip(numbers(y[0]))
                .map(|(a, b)| json!([a, b]))
                .collect();
            json!({
                "title": { "text": title },
                "tooltip": { "trigger": "item" },
                "xAxis": { "type": "value", "name": execution.columns[x] },
                "yAxis": { "type": "value", "name": names[0] },
                "series": [{ "type": "scatter", "data": data }],
            })
        }
        _ => {
            let series: Vec<Value> = y
                .iter()
                .map(|&i| json!({ "name": execution.columns[i], "type": chart_type, "data": numbers(i) }))
                .collect();
            json!({
                "title": { "text": title },
                "tooltip": { "trigger": "axis" },
                "legend": { "data": names },
                "xAxis": { "type": "category", "data": column(x) },
                "yAxis": { "type": "value" },
                "series": series,
            })
        }
    }
}

/// Builds a chart from the latest successful execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartAgent;

impl ChartAgent {
    /// Creates the agent.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds a chart for `execution`, titled `title`.
    pub fn build(title: &str, execution: &ExecutionRecord) -> Result<ChartArtifact, AgentError> {
        let name = AgentKind::Chart.name();
        let (chart_type, x, y) = plan_chart(execution)
            .ok_or_else(|| AgentError::tool(name, "build_chart", "no numeric column to plot"))?;
        Ok(ChartArtifact {
            chart_type: chart_type.to_string(),
            title: title.to_string(),
            x_field: execution.columns[x].clone(),
            y_fields: y.iter().map(|&i| execution.columns[i].clone()).collect(),
            spec: echarts_option(chart_type, title, execution, x, &y),
        })
    }
}

#[async_trait]
impl WorkerAgent for ChartAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Chart
    }

    async fn invoke(
        &self,
        _request: &str,
        state: &PipelineState,
        _ctx: &UserContext,
    ) -> Result<StateDelta, AgentError> {
        let name = self.kind().name();
        let execution = state
            .latest_execution()
            .filter(|e| e.success)
            .ok_or_else(|| AgentError::missing_input(name, "successful execution result"))?;

        let chart = Self::build(state.query(), execution)?;
        let summary = format!(
            "Built {} chart of {} by {}",
            chart.chart_type,
            chart.y_fields.join(", "),
            chart.x_field
        );
        Ok(StateDelta::new()
            .chart(chart)
            .message(Message::assistant(summary).with_name(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn execution(columns: &[&str], rows: Vec<Vec<Value>>) -> ExecutionRecord {
        ExecutionRecord {
            sql: "SELECT 1".to_string(),
            success: true,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            row_count: rows.len(),
            rows: Some(rows),
            ..Default::default()
        }
    }

    fn state_with(query: &str, record: ExecutionRecord) -> PipelineState {
        let mut state = PipelineState::new(query, 3);
        state.apply(StateDelta::new().execution(record)).unwrap();
        state
    }

    #[test]
    fn test_line_for_temporal_first_column() {
        let record = execution(
            &["month", "revenue"],
            vec![vec![json!("2024-01"), json!(10)], vec![json!("2024-02"), json!(12)]],
        );
        let chart = ChartAgent::build("revenue trend", &record).unwrap();
        assert_eq!(chart.chart_type, "line");
        assert_eq!(chart.x_field, "month");
        assert_eq!(chart.spec["series"][0]["data"], json!([10, 12]));
    }

    #[test]
    fn test_pie_for_small_labelled_result() {
        let record = execution(
            &["class", "students"],
            vec![vec![json!("A"), json!(30)], vec![json!("B"), json!(25)]],
        );
        let chart = ChartAgent::build("students per class", &record).unwrap();
        assert_eq!(chart.chart_type, "pie");
        assert_eq!(chart.spec["series"][0]["data"][1], json!({ "name": "B", "value": 25 }));
    }

    #[test]
    fn test_bar_for_larger_labelled_result() {
        let rows: Vec<Vec<Value>> = (0..12)
            .map(|i| vec![json!(format!("c{i}")), json!(i), json!(i * 2)])
            .collect();
        let chart = ChartAgent::build("t", &execution(&["class", "a", "b"], rows)).unwrap();
        assert_eq!(chart.chart_type, "bar");
        assert_eq!(chart.y_fields, vec!["a", "b"]);
    }

    #[test]
    fn test_scatter_for_two_numeric_columns() {
        let record = execution(
            &["height", "weight"],
            vec![vec![json!(170), json!(60)], vec![json!(180), json!("75.5")]],
        );
        let chart = ChartAgent::build("t", &record).unwrap();
        assert_eq!(chart.chart_type, "scatter");
        assert_eq!(chart.spec["series"][0]["data"][1], json!([180, 75.5]));
    }

    #[test]
    fn test_no_numeric_column_is_error() {
        let record = execution(&["name"], vec![vec![json!("Li")], vec![json!("Wang")]]);
        assert!(ChartAgent::build("t", &record).is_err());
    }

    fn per_teacher() -> ExecutionRecord {
        execution(
            &["teacher", "students"],
            vec![
                vec![json!("Li"), json!(12)],
                vec![json!("Wang"), json!(9)],
                vec![json!("Zhao"), json!(11)],
            ],
        )
    }

    #[test]
    fn test_wants_chart_on_keyword() {
        let record = execution(
            &["class", "avg"],
            vec![vec![json!("A"), json!(81.5)], vec![json!("B"), json!(77.0)]],
        );
        let state = state_with("各班级平均分比较", record);
        assert!(wants_chart(&state, &PipelineConfig::default()));
        assert!(!wants_chart(&state, &PipelineConfig::default().with_charts(false)));
    }

    #[test]
    fn test_keyword_alone_does_not_chart_single_row() {
        let record = execution(&["class", "avg"], vec![vec![json!("A"), json!(81.5)]]);
        let state = state_with("plot the average of class A", record);
        assert!(!wants_chart(&state, &PipelineConfig::default()));
    }

    #[test]
    fn test_keyword_alone_does_not_chart_text_rows() {
        let record = execution(&["name"], vec![vec![json!("Li")], vec![json!("Wang")]]);
        let state = state_with("plot the teachers", record);
        assert!(!wants_chart(&state, &PipelineConfig::default()));
    }

    #[test]
    fn test_numeric_result_without_intent_is_not_charted() {
        let state = state_with("how many teachers and how many students per teacher", per_teacher());
        assert!(!wants_chart(&state, &PipelineConfig::default()));
    }

    #[test]
    fn test_auto_chart_respects_row_band() {
        let config = PipelineConfig::default().with_auto_chart(true);
        let single = execution(&["teachers"], vec![vec![json!(4)]]);
        assert!(!wants_chart(&state_with("how many teachers", single), &config));

        let state = state_with("students per teacher", per_teacher());
        assert!(wants_chart(&state, &config));
        assert!(!wants_chart(&state, &config.clone().with_auto_chart(false)));
    }

    #[tokio::test]
    async fn test_chart_agent_requires_success() {
        let mut state = PipelineState::new("q", 3);
        state
            .apply(StateDelta::new().execution(ExecutionRecord::failed("SELECT 1", "boom", 1.0)))
            .unwrap();
        let err = ChartAgent::new()
            .invoke("chart", &state, &UserContext::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "missing_input");
    }
}
