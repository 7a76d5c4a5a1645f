use crate::config::{ReportConfig, color_or_black};
use crate::fonts::FontStyle;
use crate::model::{Parameter, TestResult};
use crate::pdf::richtext::{measure_inline_content, render_inline_content};
use crate::pdf::{Align, Paint};
use crate::range::{Flag, evaluate_parameter, is_spanning};

use super::DisplayOptions;
use super::pagination::RenderContext;

const RULE_COLOR: [u8; 3] = [0, 51, 102];
const HEADER_ROW_HEIGHT: f32 = 7.0;
/// Horizontal indent, in space characters, of rows under a sub-heading.
const SUBHEADING_INDENT: usize = 2;

/// Horizontal layout of the four-column parameter table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnLayout {
    /// Widths in mm: parameter, value, unit, range.
    pub widths: [f32; 4],
    /// Left edges in mm.
    pub xs: [f32; 4],
    pub show_unit: bool,
    pub show_range: bool,
}

impl ColumnLayout {
    /// Percent widths from the config; hidden columns give their share
    /// evenly to the visible ones.
    pub fn new(config: &ReportConfig, display: DisplayOptions) -> Self {
        let total = config.content_width();
        let cw = &config.column_widths;
        let mut widths = [
            total * cw.parameter / 100.0,
            total * cw.value / 100.0,
            total * cw.unit / 100.0,
            total * cw.range / 100.0,
        ];
        let visible = [true, true, display.show_unit, display.show_range];
        let freed: f32 = widths
            .iter()
            .zip(visible)
            .filter(|(_, v)| !v)
            .map(|(w, _)| *w)
            .sum();
        let visible_count = visible.iter().filter(|v| **v).count() as f32;
        for (w, v) in widths.iter_mut().zip(visible) {
            *w = if v { *w + freed / visible_count } else { 0.0 };
        }

        let x1 = config.page.margin_horizontal;
        let xs = [
            x1,
            x1 + widths[0],
            x1 + widths[0] + widths[1],
            x1 + widths[0] + widths[1] + widths[2],
        ];
        ColumnLayout {
            widths,
            xs,
            show_unit: display.show_unit,
            show_range: display.show_range,
        }
    }
}

/// Display heading of a test: its key with underscores as spaces, upper-cased.
pub fn test_heading(key: &str) -> String {
    key.replace('_', " ").to_uppercase()
}

fn text_color_for(config: &ReportConfig, flag: Flag) -> [u8; 3] {
    match flag {
        Flag::Low => color_or_black(&config.colors.low_value),
        Flag::High => color_or_black(&config.colors.high_value),
        Flag::Normal => color_or_black(&config.colors.parameter),
    }
}

/// Draws one test section starting at `y` and returns the cursor after it.
/// Every block checks space first, so the section may span pages.
pub fn render_test(
    ctx: &mut RenderContext,
    key: &str,
    test: &TestResult,
    y: f32,
    display: DisplayOptions,
) -> f32 {
    let cfg = ctx.config;
    let reported_on = test.reported_on.as_deref();
    let left = ctx.left();
    let total_w = ctx.content_width();
    let page_w = ctx.canvas.width();
    let line_h = cfg.parameter_vertical_spacing;
    log::debug!("test {key}: start y={y:.1} page={}", ctx.canvas.page_count());

    let (mut y, _) = ctx.ensure_space(y, 20.0, reported_on);
    ctx.canvas.set_draw_color(RULE_COLOR);
    ctx.canvas.set_line_width(0.5);
    ctx.canvas.line(left, y, page_w - left, y);

    ctx.canvas.set_font(FontStyle::Bold, cfg.font_sizes.heading);
    ctx.canvas.set_text_color(color_or_black(&cfg.colors.heading));
    ctx.canvas.text(&test_heading(key), page_w / 2.0, y + 8.0, Align::Center);
    y += 10.0;

    let layout = ColumnLayout::new(cfg, display);
    y = table_header(ctx, y, &layout, reported_on);

    for param in test.global_parameters() {
        y = print_row(ctx, param, y, reported_on, &layout, 0);
    }

    for heading in &test.subheadings {
        let rows = test.heading_parameters(heading);
        if rows.is_empty() {
            continue;
        }
        y = ctx.ensure_space(y, 6.0 + 2.0 * line_h, reported_on).0;
        ctx.canvas.set_font(FontStyle::Bold, cfg.font_sizes.subheading);
        ctx.canvas.set_text_color(color_or_black(&cfg.colors.subheading));
        ctx.canvas.text(&heading.title, layout.xs[0], y + 5.0, Align::Left);
        y += 6.0;
        for param in rows {
            y = print_row(ctx, param, y, reported_on, &layout, SUBHEADING_INDENT);
        }
    }

    if let Some(html) = test.interpretation.as_deref().filter(|s| !s.trim().is_empty()) {
        ctx.canvas.set_font(FontStyle::Normal, 9.0);
        ctx.canvas.set_text_color([0, 0, 0]);
        let height = measure_inline_content(&ctx.canvas, html, total_w);
        y = ctx.ensure_space(y, height + 4.0, reported_on).0;
        render_inline_content(&mut ctx.canvas, html, left, y + 2.0, total_w);
        y += 2.0 + height + 1.0;
    }
    y += 3.0;

    let descriptions: Vec<_> = test
        .descriptions
        .iter()
        .filter(|d| !d.heading.trim().is_empty() || !d.content.trim().is_empty())
        .collect();
    if !descriptions.is_empty() {
        y += 4.0;
        for desc in descriptions {
            ctx.canvas.set_font(FontStyle::Normal, 9.0);
            let body = measure_inline_content(&ctx.canvas, &desc.content, total_w);
            y = ctx
                .ensure_space(y, (line_h + 2.0 + body).max(2.0 * line_h), reported_on)
                .0;
            ctx.canvas.set_font(FontStyle::Bold, 10.0);
            ctx.canvas.set_text_color(RULE_COLOR);
            ctx.canvas.text(&desc.heading, left, y + line_h, Align::Left);
            y += line_h + 2.0;
            ctx.canvas.set_text_color([0, 0, 0]);
            y = render_inline_content(&mut ctx.canvas, &desc.content, left, y, total_w);
            y += 4.0;
        }
    }

    log::debug!("test {key}: end y={y:.1} page={}", ctx.canvas.page_count());
    y
}

fn table_header(ctx: &mut RenderContext, y: f32, layout: &ColumnLayout, reported_on: Option<&str>) -> f32 {
    let cfg = ctx.config;
    let (y, _) = ctx.ensure_space(y, HEADER_ROW_HEIGHT, reported_on);
    let total_w: f32 = layout.widths.iter().sum();

    ctx.canvas.set_draw_color([0, 0, 0]);
    ctx.canvas.set_fill_color(color_or_black(&cfg.colors.table_header_bg));
    ctx.canvas.rounded_rect(layout.xs[0], y, total_w, HEADER_ROW_HEIGHT, 1.0, Paint::FillStroke);

    ctx.canvas.set_font(FontStyle::Bold, cfg.font_sizes.parameter_header);
    ctx.canvas.set_text_color(color_or_black(&cfg.colors.parameter_header_text));
    let baseline = y + 5.0;
    ctx.canvas.text("PARAMETER", layout.xs[0] + 2.0, baseline, Align::Left);
    ctx.canvas.text("VALUE", layout.xs[1] + 2.0, baseline, Align::Left);
    if layout.show_unit {
        ctx.canvas.text("UNIT", layout.xs[2] + 2.0, baseline, Align::Left);
    }
    if layout.show_range {
        ctx.canvas.text("RANGE", layout.xs[3] + 2.0, baseline, Align::Left);
    }
    y + HEADER_ROW_HEIGHT + 2.0
}

/// Draws one parameter row and then its sub-parameters, indented two more
/// spaces. Rows whose value has not been entered are skipped with their
/// sub-parameters.
pub fn print_row(
    ctx: &mut RenderContext,
    param: &Parameter,
    y: f32,
    reported_on: Option<&str>,
    layout: &ColumnLayout,
    indent: usize,
) -> f32 {
    if param.value.is_pending() {
        return y;
    }
    let cfg = ctx.config;
    let line_h = cfg.parameter_vertical_spacing;
    let (range, flag) = evaluate_parameter(param, ctx.age_days, &ctx.gender);
    let spanning = is_spanning(&param.unit, &range);
    let value_text = format!("{}{}", param.value.display(), flag.suffix());
    let [w_param, w_value, w_unit, w_range] = layout.widths;
    let [x1, x2, x3, x4] = layout.xs;

    ctx.canvas.set_font(FontStyle::Normal, cfg.font_sizes.parameter);
    let indent_w = ctx.canvas.text_width(&" ".repeat(indent));
    let name_lines = ctx
        .canvas
        .split_text_to_size(&param.name, (w_param - 4.0 - indent_w).max(1.0));
    let unit_lines = if !spanning && layout.show_unit {
        ctx.canvas.split_text_to_size(&param.unit, w_unit - 4.0)
    } else {
        Vec::new()
    };
    let range_lines = if !spanning && layout.show_range {
        ctx.canvas.split_text_to_size(&range, w_range - 4.0)
    } else {
        Vec::new()
    };

    let value_style = if flag == Flag::Normal { FontStyle::Normal } else { FontStyle::Bold };
    ctx.canvas.set_font_style(value_style);
    let value_max_w = if spanning {
        w_value + w_unit + w_range - 4.0
    } else {
        w_value - 4.0
    };
    let value_lines = ctx.canvas.split_text_to_size(&value_text, value_max_w);

    let max_lines = [name_lines.len(), value_lines.len(), unit_lines.len(), range_lines.len()]
        .into_iter()
        .max()
        .unwrap_or(1)
        .max(1);
    let row_h = max_lines as f32 * line_h;
    let (y, _) = ctx.ensure_space(y, row_h, reported_on);
    let baseline = y + 4.0;

    ctx.canvas.set_font(FontStyle::Normal, cfg.font_sizes.parameter);
    ctx.canvas.set_text_color([0, 0, 0]);
    ctx.canvas.text_lines(&name_lines, x1 + indent_w, baseline, Align::Left);

    ctx.canvas.set_font_style(value_style);
    ctx.canvas.set_text_color(text_color_for(cfg, flag));
    ctx.canvas.text_lines(&value_lines, x2 + 2.0, baseline, Align::Left);

    ctx.canvas.set_font_style(FontStyle::Normal);
    ctx.canvas.set_text_color([0, 0, 0]);
    if !unit_lines.is_empty() {
        ctx.canvas.text_lines(&unit_lines, x3 + 2.0, baseline, Align::Left);
    }
    if !range_lines.is_empty() {
        ctx.canvas.text_lines(&range_lines, x4 + 2.0, baseline, Align::Left);
    }

    let mut y = y + row_h;
    for sub in &param.subparameters {
        y = print_row(ctx, sub, y, reported_on, layout, indent + 2);
    }
    y
}
