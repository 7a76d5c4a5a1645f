use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::range::parse_leading_float;

/// A parameter value, classified once when the record is read.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
    #[default]
    Pending,
}

impl ParameterValue {
    pub fn is_pending(&self) -> bool {
        matches!(self, ParameterValue::Pending)
    }

    /// Numeric reading used by the range classifier. Text values use
    /// leading-float semantics, so `"12 mg"` reads as 12 and `"<5"` does not parse.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            ParameterValue::Text(s) => parse_leading_float(s),
            ParameterValue::Pending => None,
        }
    }

    /// Text as printed in the value column. Pending values print as an empty string.
    pub fn display(&self) -> String {
        match self {
            ParameterValue::Number(n) => format_number(*n),
            ParameterValue::Text(s) => s.trim().to_string(),
            ParameterValue::Pending => String::new(),
        }
    }
}

impl From<Option<serde_json::Value>> for ParameterValue {
    fn from(raw: Option<serde_json::Value>) -> Self {
        match raw {
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .map(ParameterValue::Number)
                .unwrap_or(ParameterValue::Pending),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => ParameterValue::Text(s),
            Some(serde_json::Value::Bool(b)) => ParameterValue::Text(b.to_string()),
            _ => ParameterValue::Pending,
        }
    }
}

impl<'de> Deserialize<'de> for ParameterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<serde_json::Value>::deserialize(deserializer).map(ParameterValue::from)
    }
}

/// Shortest decimal that round-trips, without a trailing `.0` for integers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Number,
    Text,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Age interval (`"<lower>-<upper><d|m|y>"`) mapped to a printed reference range.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBand {
    pub range_key: String,
    pub range_value: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GenderRanges {
    #[serde(default)]
    pub male: Vec<RangeBand>,
    #[serde(default)]
    pub female: Vec<RangeBand>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RangeSpec {
    Text(String),
    ByGender(GenderRanges),
}

impl Default for RangeSpec {
    fn default() -> Self {
        RangeSpec::Text(String::new())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit: String,
    #[serde(default)]
    pub value: ParameterValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub range: RangeSpec,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value_type: ValueType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subparameters: Vec<Parameter>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubHeading {
    pub title: String,
    #[serde(default)]
    pub parameter_names: Vec<String>,
    /// Member values must sum to at most 100; enforced by data entry, not here.
    #[serde(default, rename = "is100", deserialize_with = "null_as_default")]
    pub sums_to_100: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Description {
    pub heading: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    #[default]
    InHospital,
    Outsource,
}

/// One diagnostic panel as entered for a registration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(default, deserialize_with = "string_or_number")]
    pub test_id: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<Parameter>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subheadings: Vec<SubHeading>,
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub descriptions: Vec<Description>,
    #[serde(default)]
    pub reported_on: Option<String>,
    #[serde(default)]
    pub entered_by: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub test_type: TestType,
}

impl TestResult {
    /// Outsourced panels and panels without parameters never reach the document.
    pub fn is_renderable(&self) -> bool {
        self.test_type != TestType::Outsource && !self.parameters.is_empty()
    }

    /// Parameters that belong to no sub-heading, in entry order.
    pub fn global_parameters(&self) -> Vec<&Parameter> {
        self.parameters
            .iter()
            .filter(|p| {
                !self
                    .subheadings
                    .iter()
                    .any(|sh| sh.parameter_names.iter().any(|n| n == &p.name))
            })
            .collect()
    }

    /// Parameters listed under `heading`, in entry order.
    pub fn heading_parameters<'a>(&'a self, heading: &SubHeading) -> Vec<&'a Parameter> {
        self.parameters
            .iter()
            .filter(|p| heading.parameter_names.iter().any(|n| n == &p.name))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeUnit {
    Day,
    Month,
    #[default]
    Year,
}

impl AgeUnit {
    pub fn days(self) -> f64 {
        match self {
            AgeUnit::Day => 1.0,
            AgeUnit::Month => 30.0,
            AgeUnit::Year => 365.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeUnit::Day => "Days",
            AgeUnit::Month => "Months",
            AgeUnit::Year => "Years",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientData {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub age: f64,
    #[serde(default, rename = "day_type", deserialize_with = "null_as_default")]
    pub age_unit: AgeUnit,
    #[serde(default, rename = "total_day", deserialize_with = "lenient_opt_f64")]
    pub total_day: Option<f64>,
    #[serde(default)]
    pub gender: String,
    #[serde(default, alias = "number", deserialize_with = "opt_string_or_number")]
    pub contact: Option<String>,
    #[serde(default, alias = "patient_id", deserialize_with = "opt_string_or_number")]
    pub patient_id: Option<String>,
    #[serde(
        default,
        rename = "registration_id",
        alias = "registrationId",
        deserialize_with = "opt_string_or_number"
    )]
    pub registration_id: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub hospital_name: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub sample_collected_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bloodtest: BTreeMap<String, TestResult>,
}

impl PatientData {
    pub fn age_days(&self) -> f64 {
        self.total_day
            .filter(|d| *d > 0.0)
            .unwrap_or(self.age * self.age_unit.days())
    }

    pub fn gender_key(&self) -> String {
        self.gender.trim().to_lowercase()
    }

    /// Name printed in the "Printed by" footer line.
    pub fn printed_by(&self) -> String {
        self.bloodtest
            .values()
            .next()
            .and_then(|t| t.entered_by.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Lab System".to_string())
    }

    /// Patient id and registration id joined as printed in the header.
    pub fn merged_patient_id(&self) -> String {
        match (self.patient_id.as_deref(), self.registration_id.as_deref()) {
            (Some(p), Some(r)) if !p.is_empty() && !r.is_empty() => format!("{p}-{r}"),
            (Some(p), _) if !p.is_empty() => p.to_string(),
            (_, Some(r)) if !r.is_empty() => r.to_string(),
            _ => "-".to_string(),
        }
    }
}

/// User-curated cluster of test keys rendered back to back.
#[derive(Clone, Debug, Deserialize)]
pub struct CombinedTestGroup {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tests: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDate {
    pub date: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub registration_id: String,
    #[serde(default)]
    pub reported_on: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSelection {
    pub test_name: String,
    #[serde(default)]
    pub available_dates: Vec<ComparisonDate>,
    #[serde(default)]
    pub selected_dates: Vec<String>,
}

/// Parameter values of one test as reported for an earlier (or the current) registration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalTestEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    pub registration_id: String,
    pub reported_on: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl HistoricalTestEntry {
    /// Finds a parameter by name at the top level or among sub-parameters.
    pub fn find(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .or_else(|| {
                self.parameters
                    .iter()
                    .flat_map(|p| p.subparameters.iter())
                    .find(|sp| sp.name == name)
            })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AiItem {
    pub heading: String,
    pub content: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AiRecommendationSection {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<AiItem>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AiSuggestions {
    pub diet: AiRecommendationSection,
    pub exercise: AiRecommendationSection,
}

/// Normalized test identifier: lower-cased, whitespace runs become `_`,
/// punctuation other than `_` is dropped.
pub fn test_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_ws = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push('_');
            }
            in_ws = true;
            continue;
        }
        in_ws = false;
        if ch.is_alphanumeric() || ch == '_' {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn value_to_string(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?
        .and_then(value_to_string)
        .unwrap_or_default())
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?.and_then(value_to_string))
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        },
    )
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(lenient_opt_f64(deserializer)?.unwrap_or(0.0))
}
