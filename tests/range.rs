use labreport::model::{Parameter, ParameterValue, RangeSpec};
use labreport::range::{
    Flag, NumericRange, classify, classify_value, evaluate_parameter, is_spanning,
    parse_leading_float, parse_numeric_range, parse_range_key, resolve_range,
};
use serde_json::json;

fn banded() -> RangeSpec {
    serde_json::from_value(json!({
        "male": [
            { "rangeKey": "0-30d", "rangeValue": "14-24" },
            { "rangeKey": "1-12y", "rangeValue": "11-16" },
            { "rangeKey": "12-100y", "rangeValue": "13-17" }
        ],
        "female": [
            { "rangeKey": "0-12y", "rangeValue": "11-15" },
            { "rangeKey": "12-100y", "rangeValue": "12-15.5" }
        ]
    }))
    .unwrap()
}

fn param(value: serde_json::Value, unit: &str, range: &str) -> Parameter {
    serde_json::from_value(json!({ "name": "X", "unit": unit, "value": value, "range": range })).unwrap()
}

#[test]
fn range_keys_convert_to_days() {
    assert_eq!(parse_range_key("0-30d"), (0.0, 30.0));
    assert_eq!(parse_range_key("1-12m"), (30.0, 360.0));
    assert_eq!(parse_range_key("12-100y"), (12.0 * 365.0, 36500.0));
    assert_eq!(parse_range_key("18-"), (18.0, f64::INFINITY));
    assert_eq!(parse_range_key("garbage"), (0.0, f64::INFINITY));
}

#[test]
fn bands_resolve_by_gender_and_age() {
    let range = banded();
    assert_eq!(resolve_range(&range, 10.0, "male"), "14-24");
    assert_eq!(resolve_range(&range, 40.0 * 365.0, "male"), "13-17");
    assert_eq!(resolve_range(&range, 40.0 * 365.0, "female"), "12-15.5");
    // Older than every band: the last band applies.
    assert_eq!(resolve_range(&range, 120.0 * 365.0, "female"), "12-15.5");
    assert_eq!(resolve_range(&range, 40.0 * 365.0, "other"), "");
}

#[test]
fn literal_newline_escapes_become_breaks() {
    let range = RangeSpec::Text("Adult: 70-100\\nChild: 60-90".into());
    assert_eq!(resolve_range(&range, 0.0, "male"), "Adult: 70-100\nChild: 60-90");
}

#[test]
fn numeric_range_forms() {
    assert_eq!(
        parse_numeric_range("13-17"),
        Some(NumericRange { lower: 13.0, upper: 17.0 })
    );
    assert_eq!(
        parse_numeric_range(" 1.5 to 4.1 "),
        Some(NumericRange { lower: 1.5, upper: 4.1 })
    );
    assert_eq!(
        parse_numeric_range("Up to 40"),
        Some(NumericRange { lower: 0.0, upper: 40.0 })
    );
    assert_eq!(parse_numeric_range("Negative"), None);
    assert_eq!(parse_numeric_range("<5"), None);
    assert_eq!(parse_numeric_range(""), None);
}

#[test]
fn leading_float_reads_prefixes() {
    assert_eq!(parse_leading_float("12 mg"), Some(12.0));
    assert_eq!(parse_leading_float("-3.5e2x"), Some(-350.0));
    assert_eq!(parse_leading_float("7."), Some(7.0));
    assert_eq!(parse_leading_float("<5"), None);
    assert_eq!(parse_leading_float("."), None);
}

#[test]
fn classification_is_against_a_closed_interval() {
    let r = NumericRange { lower: 13.0, upper: 17.0 };
    assert_eq!(classify(12.99, &r), Flag::Low);
    assert_eq!(classify(13.0, &r), Flag::Normal);
    assert_eq!(classify(17.0, &r), Flag::Normal);
    assert_eq!(classify(17.01, &r), Flag::High);
    assert_eq!(Flag::Low.suffix(), " L");
    assert_eq!(Flag::High.suffix(), " H");
    assert_eq!(Flag::Normal.suffix(), "");
}

#[test]
fn formatted_values_classify_like_the_numbers() {
    let r = "13-17";
    for v in [9.0, 12.5, 13.0, 15.25, 17.0, 18.75, 250.0] {
        let formatted = ParameterValue::Number(v).display();
        let reparsed = ParameterValue::Text(formatted);
        assert_eq!(
            classify_value(&reparsed, r),
            classify(v, &parse_numeric_range(r).unwrap()),
            "value {v}"
        );
    }
}

#[test]
fn unparsable_inputs_degrade_to_normal() {
    assert_eq!(classify_value(&ParameterValue::Text("Reactive".into()), "13-17"), Flag::Normal);
    assert_eq!(classify_value(&ParameterValue::Number(2.0), "Negative"), Flag::Normal);
    assert_eq!(classify_value(&ParameterValue::Pending, "13-17"), Flag::Normal);
}

#[test]
fn spanning_parameters_are_never_flagged() {
    assert!(is_spanning("", " "));
    assert!(!is_spanning("g/dL", ""));

    let p = param(json!(999), "", "");
    assert_eq!(evaluate_parameter(&p, 0.0, "male"), (String::new(), Flag::Normal));

    let p = param(json!(9), "g/dL", "13-17");
    assert_eq!(evaluate_parameter(&p, 0.0, "male"), ("13-17".to_string(), Flag::Low));
    let p = param(json!("18.2"), "g/dL", "13-17");
    assert_eq!(evaluate_parameter(&p, 0.0, "male").1, Flag::High);
}

#[test]
fn values_are_classified_once_at_ingestion() {
    assert_eq!(param(json!(4.5), "", "").value, ParameterValue::Number(4.5));
    assert_eq!(param(json!("Nil"), "", "").value, ParameterValue::Text("Nil".into()));
    assert_eq!(param(json!("  "), "", "").value, ParameterValue::Pending);
    assert_eq!(param(json!(null), "", "").value, ParameterValue::Pending);
    assert_eq!(ParameterValue::Number(14.0).display(), "14");
    assert_eq!(ParameterValue::Number(2.45).display(), "2.45");
}
