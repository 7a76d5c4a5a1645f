//! Report assembly: input options, image assets, data preparation and the
//! three page-flow modes.

mod comparison;
mod cover;
mod pagination;
mod section;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use crate::config::ReportConfig;
use crate::error::Error;
use crate::formula;
use crate::model::{
    AiSuggestions, CombinedTestGroup, ComparisonSelection, HistoricalTestEntry, Parameter,
    ParameterValue, PatientData, TestResult, ValueType, Visibility, test_key,
};
use crate::pdf::EmbeddedImage;

pub use comparison::selected_entries;
pub use pagination::{END_OF_REPORT, RenderContext, format_timestamp, parse_timestamp};
pub use section::{ColumnLayout, test_heading};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Normal,
    Combined,
    Comparison,
}

impl std::str::FromStr for ReportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(ReportType::Normal),
            "combined" => Ok(ReportType::Combined),
            "comparison" => Ok(ReportType::Comparison),
            other => Err(Error::InvalidInput(format!("unknown report type '{other}'"))),
        }
    }
}

/// Per-test column visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayOptions {
    pub show_unit: bool,
    pub show_range: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        DisplayOptions {
            show_unit: true,
            show_range: true,
        }
    }
}

/// What to print and how, as chosen on the download screen.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Test keys in print order.
    pub selected_tests: Vec<String>,
    pub combined_groups: Vec<CombinedTestGroup>,
    pub historical_tests_data: BTreeMap<String, Vec<HistoricalTestEntry>>,
    pub comparison_selections: BTreeMap<String, ComparisonSelection>,
    pub report_type: ReportType,
    pub include_letterhead: bool,
    pub skip_cover: bool,
    pub ai_suggestions: Option<AiSuggestions>,
    pub include_ai_suggestions_page: bool,
    pub test_display_options: HashMap<String, DisplayOptions>,
    #[serde(deserialize_with = "crate::config::deserialize_overrides")]
    pub config: ReportConfig,
}

impl RenderOptions {
    pub fn display_for(&self, key: &str) -> DisplayOptions {
        self.test_display_options.get(key).copied().unwrap_or_default()
    }
}

/// Where the optional images live on disk.
#[derive(Clone, Debug, Default)]
pub struct AssetPaths {
    pub letterhead: Option<PathBuf>,
    pub cover: Option<PathBuf>,
    pub stamp_right: Option<PathBuf>,
    pub stamp_center: Option<PathBuf>,
    pub diet: Option<PathBuf>,
    pub exercise: Option<PathBuf>,
}

impl AssetPaths {
    /// Looks for `letterhead`, `cover`, `stamp-right`, `stamp-center`, `diet`
    /// and `exercise` with a `.jpg`, `.jpeg` or `.png` extension in `dir`.
    pub fn from_dir(dir: &Path) -> Self {
        let find = |stem: &str| {
            ["jpg", "jpeg", "png"]
                .iter()
                .map(|ext| dir.join(format!("{stem}.{ext}")))
                .find(|p| p.is_file())
        };
        AssetPaths {
            letterhead: find("letterhead"),
            cover: find("cover"),
            stamp_right: find("stamp-right"),
            stamp_center: find("stamp-center"),
            diet: find("diet"),
            exercise: find("exercise"),
        }
    }
}

/// Decoded images, loaded once before layout. Every slot is optional.
#[derive(Clone, Debug, Default)]
pub struct ReportAssets {
    pub letterhead: Option<Arc<EmbeddedImage>>,
    pub cover: Option<Arc<EmbeddedImage>>,
    pub stamp_right: Option<Arc<EmbeddedImage>>,
    pub stamp_center: Option<Arc<EmbeddedImage>>,
    pub diet: Option<Arc<EmbeddedImage>>,
    pub exercise: Option<Arc<EmbeddedImage>>,
}

fn load_image(path: Option<&PathBuf>, what: &str) -> Option<Arc<EmbeddedImage>> {
    let path = path?;
    let loaded = std::fs::read(path)
        .map_err(Error::from)
        .and_then(EmbeddedImage::from_bytes);
    match loaded {
        Ok(img) => {
            log::debug!(
                "loaded {what} image {} ({}x{})",
                path.display(),
                img.pixel_width,
                img.pixel_height
            );
            Some(Arc::new(img))
        }
        Err(e) => {
            log::warn!("skipping {what} image {}: {e}", path.display());
            None
        }
    }
}

impl ReportAssets {
    /// Reads every configured file. Files that are missing or do not decode
    /// are logged and left out.
    pub fn load(paths: &AssetPaths) -> Self {
        ReportAssets {
            letterhead: load_image(paths.letterhead.as_ref(), "letterhead"),
            cover: load_image(paths.cover.as_ref(), "cover"),
            stamp_right: load_image(paths.stamp_right.as_ref(), "right stamp"),
            stamp_center: load_image(paths.stamp_center.as_ref(), "centre stamp"),
            diet: load_image(paths.diet.as_ref(), "diet"),
            exercise: load_image(paths.exercise.as_ref(), "exercise"),
        }
    }
}

fn strip_hidden(params: &mut Vec<Parameter>) {
    params.retain(|p| p.visibility != Visibility::Hidden);
    for p in params {
        strip_hidden(&mut p.subparameters);
    }
}

fn numeric_value(value: &ParameterValue) -> Option<f64> {
    match value {
        ParameterValue::Number(n) => Some(*n),
        ParameterValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        ParameterValue::Pending => None,
    }
}

/// Fills computed parameters whose inputs are all numeric. Repeats so a
/// formula may build on another computed value.
fn recompute_formulas(key: &str, test: &mut TestResult) {
    for _ in 0..test.parameters.len() {
        let vars: HashMap<String, f64> = test
            .parameters
            .iter()
            .filter_map(|p| numeric_value(&p.value).map(|v| (p.name.clone(), v)))
            .collect();
        let mut changed = false;
        for param in &mut test.parameters {
            let Some(expr) = param.formula.as_deref().filter(|f| !f.trim().is_empty()) else {
                continue;
            };
            if param.value_type != ValueType::Number {
                continue;
            }
            if !formula::dependencies(expr).iter().all(|d| vars.contains_key(d)) {
                continue;
            }
            match formula::evaluate(expr, &vars) {
                Ok(v) => {
                    let v = (v * 100.0).round() / 100.0;
                    if numeric_value(&param.value) != Some(v) {
                        param.value = ParameterValue::Number(v);
                        changed = true;
                    }
                }
                Err(e) => log::debug!("{key}: formula for {} not applied: {e}", param.name),
            }
        }
        if !changed {
            break;
        }
    }
}

/// Copy of `patient` ready for layout: hidden parameters removed, formulas
/// recomputed, and tests that would print nothing dropped.
pub fn prepare(patient: &PatientData) -> PatientData {
    let mut data = patient.clone();
    for (key, test) in data.bloodtest.iter_mut() {
        strip_hidden(&mut test.parameters);
        recompute_formulas(key, test);
        for heading in test.subheadings.iter().filter(|h| h.sums_to_100) {
            let sum: f64 = test
                .heading_parameters(heading)
                .iter()
                .filter_map(|p| p.value.as_number())
                .sum();
            log::debug!("{key}: '{}' members sum to {sum}", heading.title);
        }
    }
    data.bloodtest.retain(|key, test| {
        let keep = test.is_renderable();
        if !keep {
            log::debug!("{key}: outsourced or empty, skipped");
        }
        keep
    });
    data
}

/// Selected keys in order, without duplicates, limited to tests that print.
/// A selection that is not a key itself is tried as a test name.
fn printable_keys<'a>(options: &RenderOptions, patient: &'a PatientData) -> Vec<&'a str> {
    let mut keys: Vec<&'a str> = Vec::new();
    for selected in &options.selected_tests {
        let found = patient
            .bloodtest
            .get_key_value(selected)
            .or_else(|| patient.bloodtest.get_key_value(&test_key(selected)));
        match found {
            Some((key, test)) if test.is_renderable() => {
                if !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
            Some(_) => {}
            None => log::debug!("{selected}: selected but not in the record, skipped"),
        }
    }
    keys
}

fn render_normal(ctx: &mut RenderContext, options: &RenderOptions, y: f32) -> (f32, bool) {
    let keys = printable_keys(options, ctx.patient);
    let patient = ctx.patient;
    let mut y = y;
    let mut rendered = false;
    let mut grouped: HashSet<&str> = HashSet::new();

    for group in &options.combined_groups {
        grouped.extend(group.tests.iter().map(String::as_str));
        let members: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| group.tests.iter().any(|t| t == k))
            .collect();
        if members.is_empty() {
            continue;
        }
        log::debug!("group '{}': {} test(s)", group.name, members.len());
        for key in members {
            let test = &patient.bloodtest[key];
            y = section::render_test(ctx, key, test, y, options.display_for(key));
            rendered = true;
        }
    }

    for key in keys.iter().copied().filter(|k| !grouped.contains(k)) {
        let test = &patient.bloodtest[key];
        if rendered {
            y = ctx.break_page(y, test.reported_on.as_deref());
        }
        y = section::render_test(ctx, key, test, y, options.display_for(key));
        rendered = true;
    }
    (y, rendered)
}

fn render_combined(ctx: &mut RenderContext, options: &RenderOptions, y: f32) -> (f32, bool) {
    let patient = ctx.patient;
    let mut y = y;
    let mut rendered = false;
    for key in printable_keys(options, patient) {
        let test = &patient.bloodtest[key];
        if rendered {
            y = ctx.break_page(y, test.reported_on.as_deref());
        }
        y = section::render_test(ctx, key, test, y, options.display_for(key));
        rendered = true;
    }
    (y, rendered)
}

/// Lays out the whole document and returns the PDF bytes.
pub fn render_report(
    patient: &PatientData,
    options: &RenderOptions,
    assets: &ReportAssets,
) -> Result<Vec<u8>, Error> {
    let t0 = Instant::now();
    options.config.validate()?;
    let data = prepare(patient);
    let t_prepare = t0.elapsed();

    let mut ctx = RenderContext::new(&data, &options.config, assets, options.include_letterhead);
    if !options.skip_cover && !ctx.draw_cover() {
        log::debug!("no cover image loaded, cover page left out");
    }
    if options.include_ai_suggestions_page {
        match &options.ai_suggestions {
            Some(ai) => {
                cover::render_ai_page(&mut ctx, ai);
            }
            None => log::warn!("AI suggestions page requested without suggestions, left out"),
        }
    }

    let first_reported_on = printable_keys(options, &data)
        .first()
        .and_then(|k| data.bloodtest.get(*k))
        .and_then(|t| t.reported_on.clone())
        .unwrap_or_else(|| data.created_at.clone());
    let y = ctx.new_page(Some(&first_reported_on));

    let (y, rendered) = match options.report_type {
        ReportType::Normal => render_normal(&mut ctx, options, y),
        ReportType::Combined => render_combined(&mut ctx, options, y),
        ReportType::Comparison => comparison::render_comparison(&mut ctx, options, y),
    };
    if rendered {
        ctx.end_of_report(y);
    } else {
        log::warn!("no printable tests selected");
    }
    let t_layout = t0.elapsed();
    let pages = ctx.canvas.page_count();

    let bytes = ctx.canvas.finish()?;
    let t_total = t0.elapsed();
    log::info!(
        "Timing: prepare={:.1}ms, layout={:.1}ms, assemble={:.1}ms, total={:.1}ms ({} pages, {} bytes)",
        t_prepare.as_secs_f64() * 1000.0,
        (t_layout - t_prepare).as_secs_f64() * 1000.0,
        (t_total - t_layout).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        pages,
        bytes.len(),
    );
    Ok(bytes)
}
