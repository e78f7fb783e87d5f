//! SVG chart rendering.
//!
//! Charts are built as plain SVG strings so that the same input always
//! yields the same bytes.

use crate::analysis::aggregator::{summary_by_layout, summary_by_layout_and_table, Summary};
use crate::models::AggregateRow;
use std::collections::BTreeSet;

/// Chart dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
        }
    }
}

const PALETTE: [&str; 6] = ["#66c2a5", "#fc8d62", "#8da0cb", "#e78ac3", "#a6d854", "#ffd92f"];

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const Y_TICKS: usize = 5;

fn color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn titled(base: &str, participant: Option<&str>) -> String {
    match participant {
        Some(p) => format!("{} for {}", base, p),
        None => base.to_string(),
    }
}

/// Plot area with a linear y axis starting at zero.
struct Canvas {
    width: f64,
    height: f64,
    y_max: f64,
    body: String,
}

impl Canvas {
    fn new(style: ChartStyle, data_max: f64) -> Self {
        let y_max = if data_max.is_finite() && data_max > 0.0 {
            data_max * 1.1
        } else {
            1.0
        };
        Self {
            width: style.width as f64,
            height: style.height as f64,
            y_max,
            body: String::new(),
        }
    }

    fn left(&self) -> f64 {
        MARGIN_LEFT
    }

    fn right(&self) -> f64 {
        self.width - MARGIN_RIGHT
    }

    fn top(&self) -> f64 {
        MARGIN_TOP
    }

    fn bottom(&self) -> f64 {
        self.height - MARGIN_BOTTOM
    }

    fn y(&self, value: f64) -> f64 {
        self.bottom() - (value / self.y_max) * (self.bottom() - self.top())
    }

    /// Center and width of the `index`-th of `count` category bands.
    fn band(&self, index: usize, count: usize) -> (f64, f64) {
        let width = (self.right() - self.left()) / count.max(1) as f64;
        (self.left() + width * (index as f64 + 0.5), width)
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, width: f64) {
        self.body.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"{}\"/>\n",
            x1, y1, x2, y2, stroke, width
        ));
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        self.body.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" stroke=\"#333333\"/>\n",
            x, y, w, h.max(0.0), fill
        ));
    }

    fn circle(&mut self, x: f64, y: f64, fill: &str) {
        self.body.push_str(&format!(
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"5\" fill=\"{}\" stroke=\"#333333\"/>\n",
            x, y, fill
        ));
    }

    fn text(&mut self, x: f64, y: f64, anchor: &str, size: u32, content: &str) {
        self.body.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"{}\" font-size=\"{}\">{}</text>\n",
            x,
            y,
            anchor,
            size,
            escape(content)
        ));
    }

    /// Vertical error bar centered at `x`.
    fn error_bar(&mut self, x: f64, low: f64, high: f64) {
        let (y_low, y_high) = (self.y(low.max(0.0)), self.y(high));
        self.line(x, y_low, x, y_high, "#000000", 1.5);
        self.line(x - 6.0, y_low, x + 6.0, y_low, "#000000", 1.5);
        self.line(x - 6.0, y_high, x + 6.0, y_high, "#000000", 1.5);
    }

    /// Title, axes, y ticks and axis labels.
    fn frame(&mut self, title: &str, x_label: &str, y_label: &str) {
        let (left, right, top, bottom) = (self.left(), self.right(), self.top(), self.bottom());
        self.text(self.width / 2.0, 28.0, "middle", 18, title);

        for i in 0..=Y_TICKS {
            let value = self.y_max * i as f64 / Y_TICKS as f64;
            let y = self.y(value);
            self.line(left, y, right, y, "#e5e5e5", 1.0);
            self.text(left - 8.0, y + 4.0, "end", 12, &format!("{:.0}", value));
        }

        self.line(left, top, left, bottom, "#333333", 1.0);
        self.line(left, bottom, right, bottom, "#333333", 1.0);
        self.text((left + right) / 2.0, self.height - 15.0, "middle", 14, x_label);

        let (lx, ly) = (20.0, (top + bottom) / 2.0);
        self.body.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"14\" transform=\"rotate(-90 {:.2} {:.2})\">{}</text>\n",
            lx,
            ly,
            lx,
            ly,
            escape(y_label)
        ));
    }

    fn no_data(&mut self) {
        let (x, y) = ((self.left() + self.right()) / 2.0, (self.top() + self.bottom()) / 2.0);
        self.text(x, y, "middle", 14, "No data");
    }

    fn finish(self) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">\n",
            self.width, self.height, self.width, self.height
        ));
        svg.push_str(&format!(
            "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"#ffffff\"/>\n",
            self.width, self.height
        ));
        svg.push_str(&self.body);
        svg.push_str("</svg>\n");
        svg
    }
}

fn upper_value(summary: &Summary) -> f64 {
    summary
        .max
        .max(summary.mean + summary.std_err.unwrap_or(0.0))
}

/// Distribution of mean response times per layout type (box and whiskers).
///
/// Boxes span the quartiles, whiskers the full range.
pub fn boxplot_by_layout(rows: &[AggregateRow], participant: Option<&str>, style: ChartStyle) -> String {
    let summaries = summary_by_layout(rows);
    let data_max = summaries.values().map(|s| s.max).fold(0.0, f64::max);
    let mut canvas = Canvas::new(style, data_max);
    canvas.frame(
        &titled("Average Reaction Time by Layout Type", participant),
        "Layout Type",
        "Average Reaction Time (ms)",
    );

    if summaries.is_empty() {
        canvas.no_data();
        return canvas.finish();
    }

    let count = summaries.len();
    for (i, (layout, s)) in summaries.iter().enumerate() {
        let (cx, band) = canvas.band(i, count);
        let half = band * 0.25;
        let (y_q1, y_q3, y_med) = (canvas.y(s.q1), canvas.y(s.q3), canvas.y(s.median));
        let (y_min, y_max) = (canvas.y(s.min), canvas.y(s.max));

        canvas.line(cx, y_max, cx, y_q3, "#333333", 1.5);
        canvas.line(cx, y_q1, cx, y_min, "#333333", 1.5);
        canvas.line(cx - half / 2.0, y_max, cx + half / 2.0, y_max, "#333333", 1.5);
        canvas.line(cx - half / 2.0, y_min, cx + half / 2.0, y_min, "#333333", 1.5);
        canvas.rect(cx - half, y_q3, half * 2.0, y_q1 - y_q3, color(i));
        canvas.line(cx - half, y_med, cx + half, y_med, "#333333", 2.0);

        let label_y = canvas.bottom() + 20.0;
        canvas.text(cx, label_y, "middle", 12, layout);
    }

    canvas.finish()
}

/// Mean response time per layout type with standard-error bars.
pub fn mean_se_by_layout(rows: &[AggregateRow], participant: Option<&str>, style: ChartStyle) -> String {
    let summaries = summary_by_layout(rows);
    let data_max = summaries.values().map(upper_value).fold(0.0, f64::max);
    let mut canvas = Canvas::new(style, data_max);
    canvas.frame(
        &titled("Mean Reaction Time by Layout Type", participant),
        "Layout Type",
        "Mean Reaction Time (ms)",
    );

    if summaries.is_empty() {
        canvas.no_data();
        return canvas.finish();
    }

    let count = summaries.len();
    for (i, (layout, s)) in summaries.iter().enumerate() {
        let (cx, band) = canvas.band(i, count);
        let half = band * 0.3;
        let top = canvas.y(s.mean);
        let height = canvas.bottom() - top;
        canvas.rect(cx - half, top, half * 2.0, height, color(i));

        if let Some(se) = s.std_err {
            canvas.error_bar(cx, s.mean - se, s.mean + se);
        }

        let label_y = canvas.bottom() + 20.0;
        canvas.text(cx, label_y, "middle", 12, layout);
    }

    canvas.finish()
}

/// Mean response time per table, one series per layout type.
pub fn pointplot_by_layout_and_table(
    rows: &[AggregateRow],
    participant: Option<&str>,
    style: ChartStyle,
) -> String {
    let cells = summary_by_layout_and_table(rows);
    let data_max = cells.values().map(upper_value).fold(0.0, f64::max);
    let mut canvas = Canvas::new(style, data_max);
    canvas.frame(
        &titled("Mean Reaction Time by Layout Type and Table", participant),
        "Table",
        "Mean Reaction Time (ms)",
    );

    if cells.is_empty() {
        canvas.no_data();
        return canvas.finish();
    }

    let tables: Vec<u32> = cells.keys().map(|(_, t)| *t).collect::<BTreeSet<_>>().into_iter().collect();
    let layouts: Vec<&str> = cells
        .keys()
        .map(|(l, _)| l.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    for (ti, table) in tables.iter().enumerate() {
        let (cx, _) = canvas.band(ti, tables.len());
        let label_y = canvas.bottom() + 20.0;
        canvas.text(cx, label_y, "middle", 12, &table.to_string());
    }

    for (li, layout) in layouts.iter().enumerate() {
        let dodge = (li as f64 - (layouts.len() as f64 - 1.0) / 2.0) * 12.0;
        let mut previous: Option<(f64, f64)> = None;

        for (ti, table) in tables.iter().enumerate() {
            let Some(s) = cells.get(&(layout.to_string(), *table)) else {
                previous = None;
                continue;
            };
            let (cx, _) = canvas.band(ti, tables.len());
            let x = cx + dodge;
            let y = canvas.y(s.mean);

            if let Some((px, py)) = previous {
                canvas.line(px, py, x, y, color(li), 2.0);
            }
            if let Some(se) = s.std_err {
                canvas.error_bar(x, s.mean - se, s.mean + se);
            }
            canvas.circle(x, y, color(li));
            previous = Some((x, y));
        }

        let legend_x = canvas.right() - 120.0;
        let legend_y = canvas.top() + 18.0 * li as f64 + 10.0;
        canvas.circle(legend_x, legend_y - 4.0, color(li));
        canvas.text(legend_x + 12.0, legend_y, "start", 12, layout);
    }

    canvas.finish()
}
