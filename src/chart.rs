//! Chart construction and PNG rendering.
//!
//! A plot-intent snippet carries `-- key: value` directives ahead of its
//! SQL. The executor parses them into a [`ChartSpec`], binds the query
//! output as the chart data, and the formatter later persists the rendered
//! figure to disk.

use crate::error::{AgentError, Result};
use polars::prelude::*;
use std::path::Path;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
}

impl ChartKind {
    fn parse(raw: &str) -> ChartKind {
        match raw.trim().to_lowercase().as_str() {
            "bar" => ChartKind::Bar,
            "scatter" => ChartKind::Scatter,
            _ => ChartKind::Line,
        }
    }
}

/// Chart description parsed from snippet directives.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: Option<String>,
    /// Column holding the x axis categories; row index when absent.
    pub x: Option<String>,
    /// Value columns, one plotted series each.
    pub y: Vec<String>,
    /// Legend labels; defaults to the y column names.
    pub labels: Vec<String>,
}

/// Split a snippet into its chart directives and the remaining SQL.
///
/// Directives are leading `-- key: value` comment lines; every comment line
/// is stripped from the SQL either way. Returns `None` for the spec when no
/// `chart` directive is present.
pub fn extract_chart_spec(code: &str) -> (Option<ChartSpec>, String) {
    let mut kind: Option<ChartKind> = None;
    let mut title = None;
    let mut x = None;
    let mut y = Vec::new();
    let mut labels = Vec::new();
    let mut sql_lines = Vec::new();

    for line in code.lines() {
        let trimmed = line.trim();
        if let Some(comment) = trimmed.strip_prefix("--") {
            if let Some((key, value)) = comment.split_once(':') {
                let value = value.trim();
                match key.trim().to_lowercase().as_str() {
                    "chart" => kind = Some(ChartKind::parse(value)),
                    "title" => title = Some(value.to_string()),
                    "x" => x = Some(value.to_string()),
                    "y" => y = split_list(value),
                    "labels" => labels = split_list(value),
                    _ => {}
                }
            }
            continue;
        }
        sql_lines.push(line);
    }

    let spec = kind.map(|kind| ChartSpec {
        kind,
        title,
        x,
        y,
        labels,
    });
    (spec, sql_lines.join("\n").trim().to_string())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A chart bound to its data, renderable to PNG.
#[derive(Debug, Clone)]
pub struct Chart {
    spec: ChartSpec,
    data: DataFrame,
}

impl Chart {
    /// Bind a spec to the query output it will be drawn from. Unspecified
    /// y columns default to every numeric column that is not the x axis.
    pub fn new(mut spec: ChartSpec, data: DataFrame) -> Self {
        if spec.y.is_empty() {
            spec.y = data
                .get_column_names()
                .iter()
                .copied()
                .filter(|name| {
                    Some(*name) != spec.x.as_deref()
                        && data
                            .column(name)
                            .map(|s| s.dtype().is_numeric())
                            .unwrap_or(false)
                })
                .map(|s| s.to_string())
                .collect();
        }
        Self { spec, data }
    }

    pub fn title(&self) -> Option<&str> {
        self.spec.title.as_deref()
    }

    /// Legend text, one entry per plotted series.
    pub fn legend_labels(&self) -> Vec<String> {
        if self.spec.labels.len() == self.spec.y.len() && !self.spec.labels.is_empty() {
            self.spec.labels.clone()
        } else {
            self.spec.y.clone()
        }
    }

    /// Render the figure as a 1000x600 PNG at `path`.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        use plotters::prelude::*;

        let x_labels = self.x_labels();
        let series = self.series_values()?;
        let n = x_labels.len();
        if n == 0 || series.is_empty() {
            return Err(AgentError::Chart("Nothing to plot".to_string()));
        }

        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for (_, values) in &series {
            for v in values.iter().flatten() {
                y_min = y_min.min(*v);
                y_max = y_max.max(*v);
            }
        }
        if !y_min.is_finite() || !y_max.is_finite() {
            return Err(AgentError::Chart("No numeric values to plot".to_string()));
        }
        if self.spec.kind == ChartKind::Bar {
            y_min = y_min.min(0.0);
        }
        if (y_max - y_min).abs() < f64::EPSILON {
            y_max = y_min + 1.0;
        }
        let pad = (y_max - y_min) * 0.05;

        let title = self.spec.title.clone().unwrap_or_default();
        let root =
            BitMapBackend::new(path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| AgentError::Chart(e.to_string()))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&title, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), (y_min - pad)..(y_max + pad))
            .map_err(|e| AgentError::Chart(e.to_string()))?;

        let labels_for_axis = x_labels.clone();
        chart
            .configure_mesh()
            .x_labels(n.min(12))
            .x_label_formatter(&move |v| {
                let idx = v.round();
                if idx < 0.0 {
                    return String::new();
                }
                labels_for_axis
                    .get(idx as usize)
                    .cloned()
                    .unwrap_or_default()
            })
            .x_desc(self.spec.x.clone().unwrap_or_default())
            .draw()
            .map_err(|e| AgentError::Chart(e.to_string()))?;

        let legend = self.legend_labels();
        let bar_width = 0.8 / series.len() as f64;

        for (idx, (_, values)) in series.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            let label = legend.get(idx).cloned().unwrap_or_default();
            let points: Vec<(f64, f64)> = values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
                .collect();

            match self.spec.kind {
                ChartKind::Line => {
                    chart
                        .draw_series(LineSeries::new(
                            points.clone(),
                            color.stroke_width(2),
                        ))
                        .map_err(|e| AgentError::Chart(e.to_string()))?
                        .label(label)
                        .legend(move |(x, y)| {
                            PathElement::new(vec![(x, y), (x + 18, y)], color)
                        });
                    chart
                        .draw_series(
                            points
                                .iter()
                                .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
                        )
                        .map_err(|e| AgentError::Chart(e.to_string()))?;
                }
                ChartKind::Bar => {
                    let offset = -0.4 + bar_width * idx as f64;
                    chart
                        .draw_series(points.iter().map(|&(x, y)| {
                            Rectangle::new(
                                [(x + offset, 0.0), (x + offset + bar_width, y)],
                                color.filled(),
                            )
                        }))
                        .map_err(|e| AgentError::Chart(e.to_string()))?
                        .label(label)
                        .legend(move |(x, y)| {
                            Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled())
                        });
                }
                ChartKind::Scatter => {
                    chart
                        .draw_series(
                            points
                                .iter()
                                .map(|&(x, y)| Circle::new((x, y), 4, color.filled())),
                        )
                        .map_err(|e| AgentError::Chart(e.to_string()))?
                        .label(label)
                        .legend(move |(x, y)| Circle::new((x + 9, y), 4, color.filled()));
                }
            }
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()
            .map_err(|e| AgentError::Chart(e.to_string()))?;

        root.present().map_err(|e| AgentError::Chart(e.to_string()))?;
        Ok(())
    }

    fn x_labels(&self) -> Vec<String> {
        match self.spec.x.as_deref().and_then(|x| self.data.column(x).ok()) {
            Some(series) => (0..series.len())
                .map(|i| {
                    series
                        .get(i)
                        .map(|v| any_value_label(&v))
                        .unwrap_or_default()
                })
                .collect(),
            None => (0..self.data.height()).map(|i| i.to_string()).collect(),
        }
    }

    fn series_values(&self) -> Result<Vec<(String, Vec<Option<f64>>)>> {
        let mut out = Vec::new();
        for name in &self.spec.y {
            let series = self.data.column(name).map_err(|_| {
                AgentError::Chart(format!("Chart column not in result: {}", name))
            })?;
            let values = series.cast(&DataType::Float64)?;
            out.push((name.clone(), values.f64()?.into_iter().collect()));
        }
        Ok(out)
    }
}

fn any_value_label(value: &AnyValue) -> String {
    match value {
        AnyValue::String(s) => s.to_string(),
        AnyValue::Null => String::new(),
        other => other.to_string(),
    }
}
