pub mod config;
mod error;
mod fonts;
pub mod formula;
pub mod model;
pub mod pdf;
pub mod range;
pub mod report;

pub use config::ReportConfig;
pub use error::Error;
pub use fonts::FontStyle;
pub use model::PatientData;
pub use report::{AssetPaths, DisplayOptions, RenderOptions, ReportAssets, ReportType, render_report};

use std::path::Path;
use std::time::Instant;

/// Reads the patient record and options from JSON files, renders, and
/// writes the PDF to `output`.
pub fn render_report_to_file(
    patient_json: &Path,
    options: &RenderOptions,
    assets: &AssetPaths,
    output: &Path,
) -> Result<(), Error> {
    let t0 = Instant::now();

    let patient: PatientData = serde_json::from_slice(&std::fs::read(patient_json)?)?;
    let assets = ReportAssets::load(assets);
    let t_load = t0.elapsed();

    let bytes = render_report(&patient, options, &assets)?;
    let t_render = t0.elapsed();

    std::fs::write(output, &bytes).map_err(Error::Io)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: load={:.1}ms, render={:.1}ms, write={:.1}ms, total={:.1}ms (output {} bytes)",
        t_load.as_secs_f64() * 1000.0,
        (t_render - t_load).as_secs_f64() * 1000.0,
        (t_total - t_render).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        bytes.len(),
    );

    Ok(())
}

/// Same as [`render_report`] but takes the patient record as JSON text.
pub fn render_report_from_json(
    patient_json: &str,
    options: &RenderOptions,
    assets: &ReportAssets,
) -> Result<Vec<u8>, Error> {
    let patient: PatientData = serde_json::from_str(patient_json)?;
    render_report(&patient, options, assets)
}
