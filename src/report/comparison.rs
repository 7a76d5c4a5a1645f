//! Side-by-side matrix of a test's values across selected report dates.

use crate::config::color_or_black;
use crate::fonts::FontStyle;
use crate::model::{ComparisonSelection, HistoricalTestEntry, Parameter, TestResult, ValueType};
use crate::pdf::{Align, Paint};
use crate::range::{Flag, classify_value, resolve_range};

use super::RenderOptions;
use super::pagination::{RenderContext, parse_timestamp};

const RULE_COLOR: [u8; 3] = [0, 51, 102];
const LINE_HEIGHT: f32 = 4.0;
const ROW_PADDING: f32 = 1.0;
const HEADER_ROW_HEIGHT: f32 = 7.0;
const PARAM_SHARE: f32 = 0.3;
const RANGE_SHARE: f32 = 0.2;

/// Whether `entry` was picked by one of the selection's dates. A selected
/// date matches the entry's own `reportedOn`, the same instant written
/// differently, or an available date that points at the entry.
fn is_selected(selection: &ComparisonSelection, entry: &HistoricalTestEntry) -> bool {
    let entry_time = parse_timestamp(&entry.reported_on);
    selection.selected_dates.iter().any(|date| {
        if *date == entry.reported_on {
            return true;
        }
        if entry_time.is_some() && parse_timestamp(date) == entry_time {
            return true;
        }
        selection.available_dates.iter().any(|avail| {
            avail.date == *date
                && (avail.reported_on.as_deref() == Some(entry.reported_on.as_str())
                    || (!avail.registration_id.is_empty()
                        && avail.registration_id == entry.registration_id))
        })
    })
}

/// Selected entries, newest first. Entries whose date does not parse sort last.
pub fn selected_entries<'a>(
    selection: &ComparisonSelection,
    history: &'a [HistoricalTestEntry],
) -> Vec<&'a HistoricalTestEntry> {
    let mut entries: Vec<_> = history.iter().filter(|e| is_selected(selection, e)).collect();
    entries.sort_by(|a, b| parse_timestamp(&b.reported_on).cmp(&parse_timestamp(&a.reported_on)));
    entries
}

/// `05 Mar` style column header.
fn date_header(reported_on: &str) -> String {
    match parse_timestamp(reported_on) {
        Some(dt) => dt.format("%d %b").to_string(),
        None => reported_on.to_string(),
    }
}

struct Matrix<'e> {
    entries: Vec<&'e HistoricalTestEntry>,
    reported_on: String,
    param_w: f32,
    range_w: f32,
    date_w: f32,
}

/// Renders one comparison block per selected test. Returns the cursor and
/// whether any block was drawn.
pub fn render_comparison(ctx: &mut RenderContext, options: &RenderOptions, y: f32) -> (f32, bool) {
    let mut keys: Vec<&String> = Vec::new();
    for key in &options.selected_tests {
        if options.comparison_selections.contains_key(key) && !keys.contains(&key) {
            keys.push(key);
        }
    }
    for key in options.comparison_selections.keys() {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let patient = ctx.patient;
    let mut y = y;
    let mut rendered = false;
    for key in keys {
        let Some(selection) = options.comparison_selections.get(key) else {
            continue;
        };
        if selection.selected_dates.is_empty() {
            continue;
        }
        let Some(test) = patient.bloodtest.get(key) else {
            log::debug!("comparison {key}: no current result, skipped");
            continue;
        };
        let history = options
            .historical_tests_data
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let entries = selected_entries(selection, history);
        if entries.is_empty() {
            log::debug!("comparison {key}: no selected dates in history, skipped");
            continue;
        }
        let reported_on = entries[0].reported_on.clone();
        if rendered {
            y = ctx.break_page(y, Some(&reported_on));
        }
        rendered = true;

        let total_w = ctx.content_width();
        let param_w = total_w * PARAM_SHARE;
        let range_w = total_w * RANGE_SHARE;
        let date_w = (total_w - param_w - range_w) / entries.len() as f32;
        let matrix = Matrix {
            entries,
            reported_on,
            param_w,
            range_w,
            date_w,
        };
        y = render_block(ctx, selection, test, &matrix, y);
    }
    (y, rendered)
}

fn render_block(
    ctx: &mut RenderContext,
    selection: &ComparisonSelection,
    test: &TestResult,
    m: &Matrix,
    y: f32,
) -> f32 {
    let reported_on = Some(m.reported_on.as_str());
    let left = ctx.left();
    let total_w = ctx.content_width();
    let page_w = ctx.canvas.width();

    let (mut y, _) = ctx.ensure_space(y, 20.0, reported_on);
    ctx.canvas.set_draw_color(RULE_COLOR);
    ctx.canvas.set_line_width(0.5);
    ctx.canvas.line(left, y, page_w - left, y);
    ctx.canvas.set_font(FontStyle::Bold, 13.0);
    ctx.canvas.set_text_color(RULE_COLOR);
    let title = format!("{} COMPARISON REPORT", selection.test_name.to_uppercase());
    ctx.canvas.text(&title, page_w / 2.0, y + 8.0, Align::Center);
    y += 10.0;

    y = ctx.ensure_space(y, HEADER_ROW_HEIGHT, reported_on).0;
    ctx.canvas.set_fill_color(RULE_COLOR);
    ctx.canvas.rect(left, y, total_w, HEADER_ROW_HEIGHT, Paint::Fill);
    ctx.canvas.set_font_size(10.0);
    ctx.canvas.set_text_color([255, 255, 255]);
    ctx.canvas.text("PARAMETER", left + 2.0, y + 5.0, Align::Left);
    ctx.canvas.text("RANGE", left + m.param_w + 2.0, y + 5.0, Align::Left);
    let mut x = left + m.param_w + m.range_w;
    for entry in &m.entries {
        ctx.canvas
            .text(&date_header(&entry.reported_on), x + m.date_w / 2.0, y + 5.0, Align::Center);
        x += m.date_w;
    }
    y += HEADER_ROW_HEIGHT + 2.0;

    for param in test.global_parameters() {
        y = comparison_row(ctx, m, param, y, 0);
    }
    for heading in &test.subheadings {
        let rows = test.heading_parameters(heading);
        if rows.is_empty() {
            continue;
        }
        y = ctx.ensure_space(y, 6.0 + 2.0 * LINE_HEIGHT, reported_on).0;
        ctx.canvas.set_font(FontStyle::Bold, 10.0);
        ctx.canvas.set_text_color(RULE_COLOR);
        ctx.canvas.text(&heading.title, left, y + 5.0, Align::Left);
        y += 6.0;
        for param in rows {
            y = comparison_row(ctx, m, param, y, 2);
        }
    }
    y
}

fn is_textual(instance: Option<&Parameter>) -> bool {
    instance.is_some_and(|p| {
        p.value_type == ValueType::Text || (!p.value.is_pending() && p.value.display().parse::<f64>().is_err())
    })
}

/// One matrix row; sub-parameters follow indented. Unit and range come from
/// the newest entry so every date is judged against the same band.
fn comparison_row(ctx: &mut RenderContext, m: &Matrix, param: &Parameter, y: f32, indent: usize) -> f32 {
    if param.value.is_pending() {
        return y;
    }
    let cfg = ctx.config;
    let reported_on = Some(m.reported_on.as_str());
    let (mut y, _) = ctx.ensure_space(y, 2.0 * LINE_HEIGHT, reported_on);
    let left = ctx.left();
    let total_w = ctx.content_width();

    let latest = m.entries[0].find(&param.name);
    let textual = is_textual(latest);
    let range = if textual {
        String::new()
    } else {
        latest
            .map(|p| resolve_range(&p.range, ctx.age_days, &ctx.gender))
            .unwrap_or_default()
    };
    let name = if !param.unit.is_empty() && !textual {
        format!("{} ({})", param.name, param.unit)
    } else {
        param.name.clone()
    };

    ctx.canvas.set_font(FontStyle::Normal, 9.0);
    ctx.canvas.set_text_color([0, 0, 0]);
    let indent_w = ctx.canvas.text_width(&" ".repeat(indent));
    let name_lines = ctx
        .canvas
        .split_text_to_size(&name, (m.param_w - 4.0 - indent_w).max(1.0));
    ctx.canvas.text_lines(&name_lines, left + 2.0 + indent_w, y + 4.0, Align::Left);
    let mut row_h = LINE_HEIGHT.max(name_lines.len() as f32 * LINE_HEIGHT);

    let values_x = left + m.param_w + m.range_w;
    if textual {
        let value = latest
            .map(|p| p.value.display())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "-".to_string());
        let lines = ctx.canvas.split_text_to_size(&value, total_w - m.param_w - 4.0);
        ctx.canvas.text_lines(&lines, left + m.param_w + 2.0, y + 4.0, Align::Left);
        row_h = row_h.max(lines.len() as f32 * LINE_HEIGHT);
    } else {
        let range_lines = ctx.canvas.split_text_to_size(&range, m.range_w - 4.0);
        ctx.canvas.text_lines(&range_lines, left + m.param_w + 2.0, y + 4.0, Align::Left);
        row_h = row_h.max(range_lines.len() as f32 * LINE_HEIGHT);

        let mut x = values_x;
        for entry in &m.entries {
            let (text, flag) = match entry.find(&param.name).filter(|p| !p.value.is_pending()) {
                Some(instance) => {
                    let flag = classify_value(&instance.value, &range);
                    (format!("{}{}", instance.value.display(), flag.suffix()), flag)
                }
                None => ("-".to_string(), Flag::Normal),
            };
            let (style, color) = match flag {
                Flag::Low => (FontStyle::Bold, color_or_black(&cfg.colors.low_value)),
                Flag::High => (FontStyle::Bold, color_or_black(&cfg.colors.high_value)),
                Flag::Normal if text == "-" => (FontStyle::Normal, [0, 0, 0]),
                Flag::Normal => (FontStyle::Normal, color_or_black(&cfg.colors.parameter)),
            };
            ctx.canvas.set_font_style(style);
            ctx.canvas.set_text_color(color);
            let lines = ctx.canvas.split_text_to_size(&text, m.date_w - 4.0);
            ctx.canvas.text_lines(&lines, x + m.date_w / 2.0, y + 4.0, Align::Center);
            row_h = row_h.max(lines.len() as f32 * LINE_HEIGHT);
            x += m.date_w;
        }
        ctx.canvas.set_font_style(FontStyle::Normal);
        ctx.canvas.set_text_color([0, 0, 0]);
    }

    y += row_h + ROW_PADDING;
    for sub in &param.subparameters {
        y = comparison_row(ctx, m, sub, y, indent + 2);
    }
    y
}
