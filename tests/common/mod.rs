#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use labreport::pdf::EmbeddedImage;
use labreport::{PatientData, RenderOptions, ReportAssets, render_report};
use serde_json::{Value, json};

/// Patient record with the given `bloodtest` map.
pub fn patient(bloodtest: Value) -> PatientData {
    serde_json::from_value(json!({
        "name": "Asha Rao",
        "title": "Mrs.",
        "age": 34,
        "day_type": "year",
        "gender": "Female",
        "patientId": "P-102",
        "registration_id": 881,
        "doctorName": "Dr. Mehta",
        "hospitalName": "City Care",
        "createdAt": "2025-03-01T09:15:00",
        "sampleCollectedAt": "2025-03-01T09:40:00",
        "bloodtest": bloodtest
    }))
    .expect("patient fixture")
}

pub fn cbc(hemoglobin: f64) -> Value {
    json!({
        "testId": "t-cbc",
        "testName": "CBC",
        "reportedOn": "2025-03-01T16:30:00",
        "enteredBy": "Ravi",
        "parameters": [
            { "name": "Hemoglobin", "unit": "g/dL", "value": hemoglobin, "range": "13-17" },
            { "name": "Platelets", "unit": "lakh/cumm", "value": 2.4, "range": "1.5-4.1" }
        ],
        "subheadings": []
    })
}

pub fn lft() -> Value {
    json!({
        "testId": "t-lft",
        "testName": "LFT",
        "reportedOn": "2025-03-01T17:00:00",
        "parameters": [
            { "name": "SGPT", "unit": "U/L", "value": 48, "range": "7-40" },
            { "name": "SGOT", "unit": "U/L", "value": 30, "range": "8-40" }
        ]
    })
}

pub fn options(value: Value) -> RenderOptions {
    serde_json::from_value(value).expect("options fixture")
}

pub fn render(patient: &PatientData, options: &RenderOptions) -> Vec<u8> {
    let _ = env_logger::try_init();
    render_report(patient, options, &ReportAssets::default()).expect("render")
}

/// Decoded content stream of every page, in page order.
pub fn page_contents(pdf: &[u8]) -> Vec<String> {
    let doc = lopdf::Document::load_mem(pdf).expect("parse generated PDF");
    doc.get_pages()
        .values()
        .map(|page_id| {
            let mut bytes = Vec::new();
            for id in doc.get_page_contents(*page_id) {
                let stream = doc
                    .get_object(id)
                    .and_then(lopdf::Object::as_stream)
                    .expect("content stream");
                match miniz_oxide::inflate::decompress_to_vec_zlib(&stream.content) {
                    Ok(raw) => bytes.extend(raw),
                    Err(_) => bytes.extend(&stream.content),
                }
            }
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .collect()
}

pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

pub fn end_markers(pages: &[String]) -> Vec<usize> {
    pages.iter().map(|p| count(p, "END OF REPORT")).collect()
}

/// Small solid-colour PNG.
pub fn png_image(width: u32, height: u32) -> Arc<EmbeddedImage> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    Arc::new(EmbeddedImage::from_bytes(buf.into_inner()).expect("decode png"))
}
