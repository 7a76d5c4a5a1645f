mod common;

use common::{cbc, count, end_markers, lft, options, page_contents, patient, render};
use labreport::{Error, ReportAssets, render_report, render_report_from_json};
use serde_json::json;

#[test]
fn low_hemoglobin_prints_with_low_flag_and_colour() {
    let patient = patient(json!({ "cbc": cbc(9.0) }));
    let opts = options(json!({
        "selectedTests": ["cbc"],
        "config": { "colors": { "lowValue": "#ff0000" } }
    }));
    let pages = page_contents(&render(&patient, &opts));

    assert_eq!(pages.len(), 1);
    assert!(pages[0].contains("(9 L)"));
    assert!(pages[0].contains("1 0 0 rg"));
    assert!(pages[0].contains("(2.4)"), "in-range value prints without a flag");
    assert!(pages[0].contains("(CBC)"));
    assert_eq!(end_markers(&pages), vec![1]);
}

#[test]
fn combined_mode_breaks_once_between_two_tests() {
    let patient = patient(json!({ "cbc": cbc(14.0), "lft": lft() }));
    let opts = options(json!({
        "selectedTests": ["cbc", "lft"],
        "reportType": "combined"
    }));
    let pages = page_contents(&render(&patient, &opts));

    assert_eq!(pages.len(), 2);
    assert!(pages[0].contains("(CBC)"));
    assert!(pages[1].contains("(LFT)"));
    assert_eq!(end_markers(&pages), vec![1, 1]);
}

#[test]
fn grouped_tests_share_a_page_and_ungrouped_tests_start_new_ones() {
    let patient = patient(json!({ "cbc": cbc(14.0), "lft": lft() }));

    let grouped = options(json!({
        "selectedTests": ["cbc", "lft"],
        "combinedGroups": [{ "id": 1, "name": "Routine", "tests": ["cbc", "lft"] }]
    }));
    let pages = page_contents(&render(&patient, &grouped));
    assert_eq!(pages.len(), 1);
    assert_eq!(end_markers(&pages), vec![1]);

    let separate = options(json!({ "selectedTests": ["cbc", "lft"] }));
    let pages = page_contents(&render(&patient, &separate));
    assert_eq!(pages.len(), 2);
    assert_eq!(end_markers(&pages), vec![1, 1]);
}

#[test]
fn selection_order_and_duplicates() {
    let patient = patient(json!({ "cbc": cbc(14.0), "lft": lft() }));
    let opts = options(json!({
        "selectedTests": ["lft", "cbc", "lft"],
        "reportType": "combined"
    }));
    let pages = page_contents(&render(&patient, &opts));
    assert_eq!(pages.len(), 2);
    assert!(pages[0].contains("(LFT)"));
    assert!(pages[1].contains("(CBC)"));
}

#[test]
fn outsourced_and_empty_tests_are_skipped() {
    let patient = patient(json!({
        "cbc": cbc(14.0),
        "thyroid": {
            "testName": "Thyroid",
            "type": "outsource",
            "parameters": [{ "name": "TSH", "unit": "uIU/mL", "value": 2.1, "range": "0.4-4.0" }]
        },
        "urine": { "testName": "Urine", "parameters": [] }
    }));
    let opts = options(json!({ "selectedTests": ["cbc", "thyroid", "urine"] }));
    let pages = page_contents(&render(&patient, &opts));

    assert_eq!(pages.len(), 1);
    assert!(!pages[0].contains("THYROID"));
    assert!(!pages[0].contains("(TSH)"));
    assert!(!pages[0].contains("URINE"));
}

#[test]
fn nothing_selected_gives_a_header_page_without_end_marker() {
    let patient = patient(json!({ "cbc": cbc(14.0) }));
    let pages = page_contents(&render(&patient, &options(json!({}))));
    assert_eq!(pages.len(), 1);
    assert!(pages[0].contains("(Patient Name)"));
    assert_eq!(end_markers(&pages), vec![0]);
}

#[test]
fn long_test_flows_over_pages_with_header_on_each() {
    let params: Vec<_> = (0..120)
        .map(|i| json!({ "name": format!("Marker {i}"), "unit": "mg/dL", "value": 50 + i % 7, "range": "40-60" }))
        .collect();
    let patient = patient(json!({
        "panel": { "testName": "Panel", "reportedOn": "2025-03-02T08:00:00", "parameters": params }
    }));
    let pages = page_contents(&render(&patient, &options(json!({ "selectedTests": ["panel"] }))));

    assert!(pages.len() >= 3, "got {} pages", pages.len());
    for page in &pages {
        assert_eq!(count(page, "(Patient Name)"), 1);
        assert_eq!(count(page, "(Mrs. ASHA RAO)"), 1);
        assert!(page.contains("(02/03/2025, 08:00 AM)"));
        assert!(count(page, "END OF REPORT") <= 1);
    }
    assert_eq!(count(pages.last().unwrap(), "END OF REPORT"), 1);
    assert!(pages.concat().contains("(Marker 119)"));
}

#[test]
fn header_shows_patient_identity() {
    let patient = patient(json!({ "cbc": cbc(14.0) }));
    let page = &page_contents(&render(&patient, &options(json!({ "selectedTests": ["cbc"] }))))[0];

    assert!(page.contains("(Mrs. ASHA RAO)"));
    assert!(page.contains("(34 Years / Female)"));
    assert!(page.contains("(DR. MEHTA)"));
    assert!(page.contains("(CITY CARE)"));
    assert!(page.contains("(P-102-881)"));
    assert!(page.contains("(01/03/2025, 09:40 AM)"));
    assert!(page.contains("(01/03/2025, 09:15 AM)"));
    assert!(page.contains("(01/03/2025, 04:30 PM)"));
    assert!(page.contains("(Printed by Ravi)"));
}

#[test]
fn comparison_marks_missing_dates_with_dash() {
    let patient = patient(json!({ "lft": lft() }));
    let entry = |date: &str, sgpt: Option<f64>| {
        let mut params = vec![json!({ "name": "SGOT", "unit": "U/L", "value": 30, "range": "8-40" })];
        if let Some(v) = sgpt {
            params.push(json!({ "name": "SGPT", "unit": "U/L", "value": v, "range": "7-40" }));
        }
        json!({ "registrationId": date, "reportedOn": date, "parameters": params })
    };
    let opts = options(json!({
        "selectedTests": ["lft"],
        "reportType": "comparison",
        "historicalTestsData": {
            "lft": [
                entry("2025-01-10T10:00:00", Some(35.0)),
                entry("2025-02-10T10:00:00", None),
                entry("2025-03-01T17:00:00", Some(48.0))
            ]
        },
        "comparisonSelections": {
            "lft": {
                "testName": "LFT",
                "selectedDates": ["2025-01-10T10:00:00", "2025-02-10T10:00:00", "2025-03-01T17:00:00"]
            }
        }
    }));
    let pages = page_contents(&render(&patient, &opts));

    assert_eq!(pages.len(), 1);
    let page = &pages[0];
    assert!(page.contains("(LFT COMPARISON REPORT)"));
    assert!(page.contains("(01 Mar)") && page.contains("(10 Feb)") && page.contains("(10 Jan)"));
    assert!(page.contains("(SGPT (U/L))"));
    assert!(page.contains("(48 H)"));
    assert!(page.contains("(35)"));
    assert_eq!(count(page, "(-)"), 1);
    assert_eq!(end_markers(&pages), vec![1]);
}

#[test]
fn comparison_blocks_after_the_first_start_new_pages() {
    let patient = patient(json!({ "cbc": cbc(12.0), "lft": lft() }));
    let history = |name: &str, value: f64| {
        json!([{ "reportedOn": "2025-03-01T10:00:00", "parameters": [
            { "name": name, "unit": "U/L", "value": value, "range": "7-40" }
        ] }])
    };
    let opts = options(json!({
        "selectedTests": ["cbc", "lft"],
        "reportType": "comparison",
        "historicalTestsData": { "cbc": history("Hemoglobin", 12.0), "lft": history("SGPT", 48.0) },
        "comparisonSelections": {
            "cbc": { "testName": "CBC", "selectedDates": ["2025-03-01T10:00:00"] },
            "lft": { "testName": "LFT", "selectedDates": ["2025-03-01T10:00:00"] },
            "kft": { "testName": "KFT", "selectedDates": ["2025-03-01T10:00:00"] }
        }
    }));
    let pages = page_contents(&render(&patient, &opts));

    assert_eq!(pages.len(), 2);
    assert!(pages[0].contains("(CBC COMPARISON REPORT)"));
    assert!(pages[1].contains("(LFT COMPARISON REPORT)"));
    assert!(!pages.concat().contains("KFT"));
    assert_eq!(end_markers(&pages), vec![1, 1]);
}

#[test]
fn sums_to_100_heading_renders_entered_members_only() {
    let patient = patient(json!({
        "dlc": {
            "testName": "DLC",
            "parameters": [
                { "name": "Neutrophils", "unit": "%", "value": 40, "range": "40-75" },
                { "name": "Lymphocytes", "unit": "%", "value": 35, "range": "20-45" },
                { "name": "Basophils", "unit": "%", "value": "", "range": "0-1" }
            ],
            "subheadings": [{
                "title": "Differential Count",
                "parameterNames": ["Neutrophils", "Lymphocytes", "Basophils"],
                "is100": true
            }]
        }
    }));
    let page = &page_contents(&render(&patient, &options(json!({ "selectedTests": ["dlc"] }))))[0];

    assert!(page.contains("(Differential Count)"));
    assert!(page.contains("(40)"));
    assert!(page.contains("(35)"));
    assert!(!page.contains("(Basophils)"));
}

#[test]
fn hidden_parameters_and_computed_values() {
    let patient = patient(json!({
        "lipid_profile": {
            "testName": "Lipid Profile",
            "parameters": [
                { "name": "Albumin", "unit": "g/dL", "value": 4.5, "range": "3.5-5" },
                { "name": "Globulin", "unit": "g/dL", "value": "3", "range": "2-3.5" },
                { "name": "AG_Ratio", "unit": "", "value": null, "range": "1-2.5",
                  "formula": "Albumin / Globulin", "valueType": "number" },
                { "name": "Internal QC", "unit": "", "value": 1, "visibility": "hidden" }
            ]
        }
    }));
    let page = &page_contents(&render(&patient, &options(json!({ "selectedTests": ["lipid_profile"] }))))[0];

    assert!(page.contains("(LIPID PROFILE)"));
    assert!(page.contains("(1.5)"));
    assert!(!page.contains("Internal QC"));
}

#[test]
fn hidden_unit_and_range_columns() {
    let patient = patient(json!({ "cbc": cbc(9.0) }));
    let opts = options(json!({
        "selectedTests": ["cbc"],
        "testDisplayOptions": { "cbc": { "showUnit": false, "showRange": false } }
    }));
    let page = &page_contents(&render(&patient, &opts))[0];

    assert!(page.contains("(PARAMETER)") && page.contains("(VALUE)"));
    assert!(!page.contains("(UNIT)"));
    assert!(!page.contains("(RANGE)"));
    assert!(!page.contains("(g/dL)"));
    assert!(page.contains("(9 L)"));
}

#[test]
fn interpretation_and_descriptions_are_drawn() {
    let mut test = cbc(14.0);
    test["interpretation"] = json!("<p><b>Note:</b> fasting sample</p>");
    test["descriptions"] = json!([{ "heading": "Method", "content": "Automated <i>cell counter</i>" }]);
    let patient = patient(json!({ "cbc": test }));
    let page = &page_contents(&render(&patient, &options(json!({ "selectedTests": ["cbc"] }))))[0];

    assert!(page.contains("(Note:)"));
    assert!(page.contains("(fasting)"));
    assert!(page.contains("(Method)"));
    assert!(page.contains("(counter)"));
}

#[test]
fn invalid_config_fails_before_layout() {
    let patient = patient(json!({ "cbc": cbc(14.0) }));
    let opts = options(json!({
        "selectedTests": ["cbc"],
        "config": { "columnWidths": { "parameter": 50 } }
    }));
    let err = render_report(&patient, &opts, &ReportAssets::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
}

#[test]
fn stamps_appear_on_every_data_page() {
    let patient = patient(json!({ "cbc": cbc(14.0), "lft": lft() }));
    let assets = ReportAssets {
        stamp_right: Some(common::png_image(40, 20)),
        ..ReportAssets::default()
    };
    let opts = options(json!({ "selectedTests": ["cbc", "lft"], "reportType": "combined" }));
    let pages = page_contents(&render_report(&patient, &opts, &assets).unwrap());

    assert_eq!(pages.len(), 2);
    for page in &pages {
        assert_eq!(count(page, "/Im1 Do"), 1);
    }
}

#[test]
fn cover_and_ai_pages_come_first() {
    let patient = patient(json!({ "cbc": cbc(14.0) }));
    let assets = ReportAssets {
        cover: Some(common::png_image(21, 30)),
        ..ReportAssets::default()
    };
    let opts = options(json!({
        "selectedTests": ["cbc"],
        "includeAiSuggestionsPage": true,
        "aiSuggestions": {
            "diet": {
                "title": "Diet",
                "description": "Iron rich meals.",
                "items": [{ "heading": "Greens", "content": "Spinach and lentils daily." }]
            },
            "exercise": {
                "title": "Exercise",
                "description": "Light cardio.",
                "items": [{ "heading": "Walking", "content": "Thirty minutes a day." }]
            }
        }
    }));
    let pages = page_contents(&render_report(&patient, &opts, &assets).unwrap());

    assert_eq!(pages.len(), 3);
    assert!(pages[0].contains("/Im1 Do"));
    assert!(!pages[0].contains("Patient Name"));
    assert!(pages[1].contains("(AI Expert Suggestion According to Report Value)"));
    assert!(pages[1].contains("(Diet)") && pages[1].contains("(Exercise)"));
    assert!(pages[2].contains("(CBC)"));
    assert_eq!(end_markers(&pages), vec![0, 0, 1]);
}

#[test]
fn skipped_cover_does_not_leave_a_blank_page() {
    let patient = patient(json!({ "cbc": cbc(14.0) }));
    let assets = ReportAssets {
        cover: Some(common::png_image(21, 30)),
        ..ReportAssets::default()
    };
    let opts = options(json!({ "selectedTests": ["cbc"], "skipCover": true }));
    let pages = page_contents(&render_report(&patient, &opts, &assets).unwrap());
    assert_eq!(pages.len(), 1);
    assert!(pages[0].contains("(CBC)"));
}

#[test]
fn renders_are_independent_and_deterministic() {
    let patient = patient(json!({ "cbc": cbc(9.0), "lft": lft() }));
    let opts = options(json!({ "selectedTests": ["cbc", "lft"] }));
    assert_eq!(render(&patient, &opts), render(&patient, &opts));
}

#[test]
fn selection_by_test_name_finds_the_key() {
    let mut lipid = cbc(14.0);
    lipid["testName"] = json!("Lipid Profile");
    let patient = patient(json!({ "lipid_profile": lipid }));
    let opts = options(json!({ "selectedTests": ["Lipid Profile", "lipid_profile"] }));
    let pages = page_contents(&render(&patient, &opts));

    assert_eq!(pages.len(), 1);
    assert_eq!(count(&pages[0], "(LIPID PROFILE)"), 1);
}

#[test]
fn first_page_reported_on_follows_the_first_printed_test() {
    let mut lipid = cbc(14.0);
    lipid["testName"] = json!("Lipid Profile");
    lipid["reportedOn"] = json!("2025-03-02T11:00:00");
    let patient = patient(json!({ "lipid_profile": lipid }));
    let opts = options(json!({ "selectedTests": ["X-Ray Chest", "Lipid Profile"] }));
    let page = &page_contents(&render(&patient, &opts))[0];

    assert_eq!(count(page, "(02/03/2025, 11:00 AM)"), 1);
    assert_eq!(count(page, "(01/03/2025, 09:15 AM)"), 1, "registration time only once");
}

#[test]
fn layout_error_aborts_the_render() {
    let patient = patient(json!({ "cbc": cbc(14.0) }));
    // Overflows f32 to infinity, so the heading has nowhere to go.
    let opts = options(json!({
        "selectedTests": ["cbc"],
        "config": { "fontSizes": { "heading": 1e39 } }
    }));
    let result = render_report(&patient, &opts, &ReportAssets::default());
    assert!(matches!(result, Err(Error::Layout(_))), "got {result:?}");
}

#[test]
fn renders_straight_from_patient_json() {
    let opts = options(json!({ "selectedTests": ["cbc"] }));
    let record = json!({
        "name": "Asha Rao",
        "age": 34,
        "gender": "Female",
        "createdAt": "2025-03-01T09:15:00",
        "bloodtest": { "cbc": cbc(9.0) }
    })
    .to_string();

    let bytes = render_report_from_json(&record, &opts, &ReportAssets::default()).expect("render");
    let pages = page_contents(&bytes);
    assert!(pages[0].contains("(9 L)"));

    let broken = render_report_from_json("{ \"name\": ", &opts, &ReportAssets::default());
    assert!(matches!(broken, Err(Error::Json(_))));
}
