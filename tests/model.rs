use labreport::PatientData;
use labreport::model::{ParameterValue, TestResult, test_key};
use serde_json::json;

fn patient(extra: serde_json::Value) -> PatientData {
    let mut base = json!({
        "name": "Ravi Kumar",
        "age": "6",
        "gender": " Male ",
        "createdAt": "2025-03-01T09:15:00",
        "bloodtest": {}
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    serde_json::from_value(base).unwrap()
}

#[test]
fn test_keys_normalize_names() {
    assert_eq!(test_key("Lipid Profile"), "lipid_profile");
    assert_eq!(test_key("  Liver Function  Test (LFT) "), "liver_function_test_lft");
    assert_eq!(test_key("HbA1c"), "hba1c");
    assert_eq!(test_key("kidney_function"), "kidney_function");
}

#[test]
fn age_in_days_prefers_total_day() {
    assert_eq!(patient(json!({})).age_days(), 6.0 * 365.0);
    assert_eq!(patient(json!({ "day_type": "month" })).age_days(), 180.0);
    assert_eq!(patient(json!({ "day_type": "day", "total_day": 4 })).age_days(), 4.0);
    assert_eq!(patient(json!({ "gender": "FEMALE" })).gender_key(), "female");
}

#[test]
fn identity_fields_accept_numbers_or_strings() {
    let p = patient(json!({ "patientId": 77, "registrationId": "R-9" }));
    assert_eq!(p.merged_patient_id(), "77-R-9");
    assert_eq!(patient(json!({ "patient_id": "P1" })).merged_patient_id(), "P1");
    assert_eq!(patient(json!({})).merged_patient_id(), "-");

    assert_eq!(patient(json!({ "number": 9876543210u64 })).contact.as_deref(), Some("9876543210"));
    assert_eq!(patient(json!({ "contact": "98765" })).contact.as_deref(), Some("98765"));
    assert_eq!(patient(json!({})).contact, None);

    let test: TestResult = serde_json::from_value(json!({ "testId": 42, "testName": "CBC" })).unwrap();
    assert_eq!(test.test_id, "42");
}

#[test]
fn printed_by_comes_from_the_first_test() {
    let p = patient(json!({
        "bloodtest": {
            "a_test": { "testName": "A", "enteredBy": "Meena", "parameters": [] },
            "b_test": { "testName": "B", "enteredBy": "Ravi", "parameters": [] }
        }
    }));
    assert_eq!(p.printed_by(), "Meena");
    assert_eq!(patient(json!({})).printed_by(), "Lab System");
}

#[test]
fn sub_headings_split_parameters() {
    let test: TestResult = serde_json::from_value(json!({
        "testName": "DLC",
        "type": "outsource",
        "parameters": [
            { "name": "WBC", "value": 7.1 },
            { "name": "Neutrophils", "value": 60 },
            { "name": "Lymphocytes", "value": null }
        ],
        "subheadings": [{ "title": "Differential", "parameterNames": ["Neutrophils", "Lymphocytes"] }]
    }))
    .unwrap();

    assert!(!test.is_renderable());
    let globals = test.global_parameters();
    let names: Vec<&str> = globals.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["WBC"]);
    let members = test.heading_parameters(&test.subheadings[0]);
    assert_eq!(members.len(), 2);
    assert_eq!(members[1].value, ParameterValue::Pending);
}
