//! Page furniture and the vertical cursor: every section asks
//! [`RenderContext::ensure_space`] before drawing anything that might overflow.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::{PrintedByPosition, ReportConfig, color_or_black};
use crate::fonts::FontStyle;
use crate::model::{PatientData, format_number};
use crate::pdf::{Align, Canvas};

use super::ReportAssets;

pub const END_OF_REPORT: &str = "--------------------- END OF REPORT ---------------------";

/// Vertical step between header rows.
const HEADER_ROW_STEP: f32 = 5.0;
/// Space kept free above the footer band for the end marker.
const END_MARKER_ROOM: f32 = 10.0;

/// Parses the timestamp formats found in registration records.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// `DD/MM/YYYY, HH:MM AM` in the timestamp's own wall-clock time.
/// Strings that do not parse are printed as given.
pub fn format_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.format("%d/%m/%Y, %I:%M %p").to_string(),
        None => raw.to_string(),
    }
}

/// Everything one render owns: the canvas, the inputs it reads, and the
/// pagination bookkeeping.
pub struct RenderContext<'a> {
    pub canvas: Canvas,
    pub config: &'a ReportConfig,
    pub assets: &'a ReportAssets,
    pub patient: &'a PatientData,
    pub age_days: f64,
    pub gender: String,
    include_letterhead: bool,
    printed_by: String,
    /// The current page has been drawn on.
    page_dirty: bool,
    end_marker_on_page: bool,
    /// Cursor right below the running header of the current page.
    content_top: f32,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        patient: &'a PatientData,
        config: &'a ReportConfig,
        assets: &'a ReportAssets,
        include_letterhead: bool,
    ) -> Self {
        RenderContext {
            canvas: Canvas::new(),
            config,
            assets,
            patient,
            age_days: patient.age_days(),
            gender: patient.gender_key(),
            include_letterhead,
            printed_by: patient.printed_by(),
            page_dirty: false,
            end_marker_on_page: false,
            content_top: config.page.margin_top,
        }
    }

    pub fn left(&self) -> f32 {
        self.config.page.margin_horizontal
    }

    pub fn content_width(&self) -> f32 {
        self.config.content_width()
    }

    /// Lowest y content may reach.
    pub fn bottom(&self) -> f32 {
        self.config.content_bottom()
    }

    /// Returns `(y, false)` when `need` mm fit below `y`. Otherwise closes
    /// the page (end marker if there is room for it), starts a new one with
    /// the running header keyed to `reported_on`, and returns the header's
    /// bottom with `true`.
    ///
    /// A page that holds nothing but its header is never given up, so content
    /// taller than a page breaks once and then overflows instead of producing
    /// blank pages.
    pub fn ensure_space(&mut self, y: f32, need: f32, reported_on: Option<&str>) -> (f32, bool) {
        if y + need < self.bottom() || y <= self.content_top {
            return (y, false);
        }
        log::debug!(
            "page break at y={y:.1} need={need:.1} (page {})",
            self.canvas.page_count()
        );
        if y < self.bottom() - END_MARKER_ROOM {
            self.end_of_report(y);
        }
        (self.new_page(reported_on), true)
    }

    /// Unconditional break used between tests: closes the page with the end
    /// marker below `y` and starts a new one.
    pub fn break_page(&mut self, y: f32, reported_on: Option<&str>) -> f32 {
        log::debug!("forced page break at y={y:.1} (page {})", self.canvas.page_count());
        self.end_of_report(y);
        self.new_page(reported_on)
    }

    /// Prints the end marker below `y`, at most once per page. The marker
    /// never drops past [`RenderContext::bottom`] into the stamp band.
    pub fn end_of_report(&mut self, y: f32) {
        if self.end_marker_on_page {
            return;
        }
        let cfg = self.config;
        self.canvas.set_font(FontStyle::Italic, cfg.font_sizes.footer);
        self.canvas.set_text_color([0, 0, 0]);
        let x = self.canvas.width() / 2.0;
        let baseline = (y + 4.0).min(self.bottom());
        self.canvas.text(END_OF_REPORT, x, baseline, Align::Center);
        self.end_marker_on_page = true;
    }

    /// Draws a full-page image on the first page (nothing else goes there).
    pub fn draw_cover(&mut self) -> bool {
        let Some(cover) = self.assets.cover.clone() else {
            return false;
        };
        if self.page_dirty {
            self.canvas.add_page();
        }
        let (w, h) = (self.canvas.width(), self.canvas.height());
        self.canvas.image(&cover, 0.0, 0.0, w, h);
        self.page_dirty = true;
        true
    }

    /// Starts a data page (reusing the first page while it is still blank)
    /// and draws letterhead, running header, stamps and the printed-by line.
    pub fn new_page(&mut self, reported_on: Option<&str>) -> f32 {
        if self.page_dirty {
            self.canvas.add_page();
        }
        self.page_dirty = true;
        self.end_marker_on_page = false;

        if self.include_letterhead {
            if let Some(letterhead) = self.assets.letterhead.clone() {
                let (w, h) = (self.canvas.width(), self.canvas.height());
                self.canvas.image(&letterhead, 0.0, 0.0, w, h);
            }
        }
        let y = self.draw_header(reported_on);
        self.draw_stamps_and_printed_by();
        self.content_top = y;
        y
    }

    fn header_rows(&self, reported_on: Option<&str>) -> ([(&'static str, String); 4], [(&'static str, String); 4]) {
        let p = self.patient;
        let name = match p.title.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(title) => format!("{title} {}", p.name.to_uppercase()),
            None => p.name.to_uppercase(),
        };
        let or_dash = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("-")
                .to_uppercase()
        };
        let sample = p
            .sample_collected_at
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&p.created_at);
        let left = [
            ("Patient Name", name),
            (
                "Age/Sex",
                format!("{} {} / {}", format_number(p.age), p.age_unit.label(), p.gender),
            ),
            ("Ref Doctor", or_dash(&p.doctor_name)),
            ("Client Name", or_dash(&p.hospital_name)),
        ];
        let right = [
            ("Patient ID", p.merged_patient_id()),
            ("Sample Collected on", format_timestamp(sample)),
            ("Registration On", format_timestamp(&p.created_at)),
            (
                "Reported On",
                reported_on
                    .filter(|s| !s.trim().is_empty())
                    .map(format_timestamp)
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ];
        (left, right)
    }

    /// Two label/value columns with aligned colons. Returns the y below the block.
    fn draw_header(&mut self, reported_on: Option<&str>) -> f32 {
        let (left_rows, right_rows) = self.header_rows(reported_on);
        let canvas = &mut self.canvas;
        canvas.set_font(FontStyle::Normal, 10.0);
        canvas.set_text_color([0, 0, 0]);

        let widest = |rows: &[(&str, String)], canvas: &Canvas| {
            rows.iter()
                .map(|(label, _)| canvas.text_width(label))
                .fold(0.0f32, f32::max)
        };
        let x_ll = self.config.page.margin_horizontal;
        let x_lc = x_ll + widest(&left_rows, canvas) + 2.0;
        let x_lv = x_lc + 2.0;
        let x_rl = canvas.width() / 2.0 + 10.0;
        let x_rc = x_rl + widest(&right_rows, canvas) + 2.0;
        let x_rv = x_rc + 2.0;
        let left_value_width = x_rl - x_lv - 4.0;

        let mut y = self.config.page.margin_top;
        for (i, ((l_label, l_value), (r_label, r_value))) in
            left_rows.iter().zip(right_rows.iter()).enumerate()
        {
            let row_y = y;
            canvas.text(l_label, x_ll, row_y, Align::Left);
            canvas.text(":", x_lc, row_y, Align::Left);
            if i == 0 {
                canvas.set_font_style(FontStyle::Bold);
                let name_lines = canvas.split_text_to_size(l_value, left_value_width);
                canvas.text_lines(&name_lines, x_lv, row_y, Align::Left);
                canvas.set_font_style(FontStyle::Normal);
                y += name_lines.len().max(1) as f32 * HEADER_ROW_STEP;
            } else {
                canvas.text(l_value, x_lv, row_y, Align::Left);
                y += HEADER_ROW_STEP;
            }
            canvas.text(r_label, x_rl, row_y, Align::Left);
            canvas.text(":", x_rc, row_y, Align::Left);
            canvas.text(r_value, x_rv, row_y, Align::Left);
        }
        y
    }

    fn draw_stamps_and_printed_by(&mut self) {
        let cfg = self.config;
        let (w, h) = (self.canvas.width(), self.canvas.height());
        let left = cfg.page.margin_horizontal;

        let right = &cfg.stamps.stamp_right;
        if right.display {
            if let Some(stamp) = self.assets.stamp_right.clone() {
                let height = right.width / stamp.aspect_ratio();
                self.canvas.image(
                    &stamp,
                    w - left - right.width,
                    h - height - right.margin_bottom,
                    right.width,
                    height,
                );
            }
        }
        let center = &cfg.stamps.stamp_center;
        if center.display {
            if let Some(stamp) = self.assets.stamp_center.clone() {
                let height = center.width / stamp.aspect_ratio();
                self.canvas.image(
                    &stamp,
                    (w - center.width) / 2.0,
                    h - height - center.margin_bottom,
                    center.width,
                    height,
                );
            }
        }

        if cfg.printed_by.display {
            self.canvas.set_font(FontStyle::Normal, cfg.font_sizes.printed_by);
            self.canvas.set_text_color(color_or_black(&cfg.colors.printed_by));
            let text = format!("Printed by {}", self.printed_by);
            let y = h - cfg.page.margin_bottom + 5.0;
            match cfg.printed_by.position {
                PrintedByPosition::Left => self.canvas.text(&text, left, y, Align::Left),
                PrintedByPosition::Right => self.canvas.text(&text, w - left, y, Align::Right),
                PrintedByPosition::Center => self.canvas.text(&text, w / 2.0, y, Align::Center),
            }
            self.canvas.set_text_color([0, 0, 0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> PatientData {
        serde_json::from_value(serde_json::json!({
            "name": "Asha Rao",
            "age": 34,
            "gender": "Female",
            "createdAt": "2025-03-01T09:15:00",
            "bloodtest": {}
        }))
        .unwrap()
    }

    #[test]
    fn ensure_space_without_break_is_idempotent() {
        let patient = patient();
        let config = ReportConfig::default();
        let assets = ReportAssets::default();
        let mut ctx = RenderContext::new(&patient, &config, &assets, false);
        let top = ctx.new_page(None);
        let y = top + 40.0;

        let first = ctx.ensure_space(y, 30.0, None);
        let second = ctx.ensure_space(first.0, 30.0, None);
        assert_eq!(first, (y, false));
        assert_eq!(second, first);
        assert_eq!(ctx.canvas.page_count(), 1);
    }

    #[test]
    fn overflow_starts_a_page_below_the_header() {
        let patient = patient();
        let config = ReportConfig::default();
        let assets = ReportAssets::default();
        let mut ctx = RenderContext::new(&patient, &config, &assets, false);
        let top = ctx.new_page(None);

        let (y, broke) = ctx.ensure_space(ctx.bottom() - 3.0, 5.0, Some("2025-03-02T10:00:00"));
        assert!(broke);
        assert_eq!(y, top);
        assert_eq!(ctx.canvas.page_count(), 2);
    }

    #[test]
    fn header_only_page_is_not_abandoned() {
        let patient = patient();
        let config = ReportConfig::default();
        let assets = ReportAssets::default();
        let mut ctx = RenderContext::new(&patient, &config, &assets, false);
        let top = ctx.new_page(None);

        let (y, broke) = ctx.ensure_space(top, 1000.0, None);
        assert_eq!((y, broke), (top, false));
        assert_eq!(ctx.canvas.page_count(), 1);
    }

    /// Baseline, in PDF points from the page bottom, of the end marker on the
    /// first page.
    fn marker_baseline(pdf: &[u8]) -> f32 {
        let doc = lopdf::Document::load_mem(pdf).unwrap();
        let page = *doc.get_pages().values().next().unwrap();
        let raw = doc.get_page_content(page).unwrap();
        let content = miniz_oxide::inflate::decompress_to_vec_zlib(&raw).unwrap_or(raw);
        let content = String::from_utf8_lossy(&content);
        let at = content.find("END OF REPORT").unwrap();
        let open = content[..at].rfind('(').unwrap();
        let operands = content[..open].trim_end().strip_suffix("Td").unwrap();
        operands.split_whitespace().last().unwrap().parse().unwrap()
    }

    #[test]
    fn end_marker_stays_above_the_footer_band() {
        let patient = patient();
        let config = ReportConfig::default();
        let assets = ReportAssets::default();
        let mut ctx = RenderContext::new(&patient, &config, &assets, false);
        ctx.new_page(None);
        let bottom = ctx.bottom();
        ctx.end_of_report(bottom + 6.0);
        let pdf = ctx.canvas.finish().unwrap();

        let lowest = (crate::config::PAGE_HEIGHT_MM - bottom) * crate::pdf::MM;
        assert!(marker_baseline(&pdf) >= lowest - 0.01);
    }

    #[test]
    fn timestamps_print_in_wall_clock_time() {
        assert_eq!(format_timestamp("2025-03-01T14:05:00"), "01/03/2025, 02:05 PM");
        assert_eq!(format_timestamp("2025-03-01T00:30:00+05:30"), "01/03/2025, 12:30 AM");
        assert_eq!(format_timestamp("2025-03-01"), "01/03/2025, 12:00 AM");
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }
}
