use labreport::config::{PrintedByPosition, parse_color};
use labreport::report::ColumnLayout;
use labreport::{DisplayOptions, Error, RenderOptions, ReportConfig};
use serde_json::json;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn defaults_are_valid() {
    let config = ReportConfig::default();
    config.validate().expect("defaults validate");
    assert!(approx(config.content_width(), 164.0));
    assert!(approx(config.content_bottom(), 272.0));
    assert_eq!(config.colors.table_header_bg, "#FFFFFF");
    assert!(config.stamps.stamp_right.display);
    assert!(!config.stamps.stamp_center.display);
}

#[test]
fn partial_overrides_keep_other_defaults() {
    let config = ReportConfig::from_json(
        r#"{ "page": { "marginTop": 40 }, "colors": { "highValue": "red" },
             "printedBy": { "position": "right" } }"#,
    )
    .expect("valid config");
    assert!(approx(config.page.margin_top, 40.0));
    assert!(approx(config.page.margin_bottom, 25.0));
    assert_eq!(config.colors.high_value, "red");
    assert_eq!(config.colors.low_value, "#000000");
    assert_eq!(config.printed_by.position, PrintedByPosition::Right);
    assert!(config.printed_by.display);
}

#[test]
fn nulls_do_not_erase_defaults() {
    let config = ReportConfig::with_overrides(json!({ "fontSizes": { "heading": null } })).unwrap();
    assert!(approx(config.font_sizes.heading, 13.0));
}

#[test]
fn invalid_configs_are_rejected() {
    let bad_widths = r#"{ "columnWidths": { "parameter": 50 } }"#;
    assert!(matches!(ReportConfig::from_json(bad_widths), Err(Error::InvalidConfig(_))));

    let negative = r#"{ "columnWidths": { "parameter": 70, "value": -10 } }"#;
    assert!(matches!(ReportConfig::from_json(negative), Err(Error::InvalidConfig(_))));

    let margins = r#"{ "page": { "marginTop": 200, "marginBottom": 100 } }"#;
    assert!(matches!(ReportConfig::from_json(margins), Err(Error::InvalidConfig(_))));

    let spacing = r#"{ "parameterVerticalSpacing": 0 }"#;
    assert!(matches!(ReportConfig::from_json(spacing), Err(Error::InvalidConfig(_))));

    assert!(matches!(ReportConfig::from_json("{ not json"), Err(Error::Json(_))));
}

#[test]
fn colour_forms() {
    assert_eq!(parse_color("#003366"), Some([0, 51, 102]));
    assert_eq!(parse_color("#0f0"), Some([0, 255, 0]));
    assert_eq!(parse_color(" rgb(300, 20, 5) "), Some([255, 20, 5]));
    assert_eq!(parse_color("Navy"), Some([0, 0, 128]));
    assert_eq!(parse_color("#12"), None);
    assert_eq!(parse_color("#gggggg"), None);
    assert_eq!(parse_color("chartreuse-ish"), None);
}

#[test]
fn hidden_columns_share_their_width() {
    let config = ReportConfig::default();

    let all = ColumnLayout::new(&config, DisplayOptions::default());
    assert!(approx(all.widths[0], 65.6));
    assert!(approx(all.widths[3], 32.8));
    assert!(approx(all.xs[0], 23.0));
    assert!(approx(all.xs[3], 23.0 + 65.6 + 32.8 + 32.8));

    let no_unit_range = ColumnLayout::new(
        &config,
        DisplayOptions {
            show_unit: false,
            show_range: false,
        },
    );
    assert!(approx(no_unit_range.widths[0], 98.4));
    assert!(approx(no_unit_range.widths[1], 65.6));
    assert_eq!(no_unit_range.widths[2], 0.0);
    assert_eq!(no_unit_range.widths[3], 0.0);
    assert!(approx(no_unit_range.xs[1], 23.0 + 98.4));

    let no_unit = ColumnLayout::new(
        &config,
        DisplayOptions {
            show_unit: false,
            show_range: true,
        },
    );
    let total: f32 = no_unit.widths.iter().sum();
    assert!(approx(total, 164.0));
    assert!(approx(no_unit.widths[3], 32.8 + 32.8 / 3.0));
}

#[test]
fn render_options_from_camel_case_json() {
    let options: RenderOptions = serde_json::from_value(json!({
        "selectedTests": ["cbc"],
        "reportType": "comparison",
        "includeLetterhead": true,
        "testDisplayOptions": { "cbc": { "showRange": false } },
        "config": { "colors": { "heading": "#111111" } }
    }))
    .unwrap();
    assert_eq!(options.selected_tests, vec!["cbc"]);
    assert!(options.include_letterhead);
    assert!(!options.skip_cover);
    assert_eq!(
        options.display_for("cbc"),
        DisplayOptions {
            show_unit: true,
            show_range: false
        }
    );
    assert_eq!(options.display_for("lft"), DisplayOptions::default());
    assert_eq!(options.config.colors.heading, "#111111");
    assert!(approx(options.config.page.margin_top, 50.0));
}
