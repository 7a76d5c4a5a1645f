use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// A4 portrait, in millimetres.
pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;

pub type Rgb = [u8; 3];

/// Look and feel of the report. Partial JSON overrides go through
/// [`ReportConfig::with_overrides`], which keeps defaults for every key not given.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub page: PageConfig,
    pub printed_by: PrintedByConfig,
    pub colors: ColorConfig,
    pub font_sizes: FontSizes,
    pub stamps: StampsConfig,
    pub column_widths: ColumnWidths,
    /// Height of one parameter line, in millimetres.
    pub parameter_vertical_spacing: f32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            page: PageConfig::default(),
            printed_by: PrintedByConfig::default(),
            colors: ColorConfig::default(),
            font_sizes: FontSizes::default(),
            stamps: StampsConfig::default(),
            column_widths: ColumnWidths::default(),
            parameter_vertical_spacing: 5.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageConfig {
    /// Distance from the top edge to the first header line (room for the letterhead).
    pub margin_top: f32,
    /// Content never crosses `page height - margin_bottom`.
    pub margin_bottom: f32,
    pub margin_horizontal: f32,
}

impl Default for PageConfig {
    fn default() -> Self {
        PageConfig {
            margin_top: 50.0,
            margin_bottom: 25.0,
            margin_horizontal: 23.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintedByPosition {
    #[default]
    Left,
    Right,
    Center,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PrintedByConfig {
    pub display: bool,
    pub position: PrintedByPosition,
}

impl Default for PrintedByConfig {
    fn default() -> Self {
        PrintedByConfig {
            display: true,
            position: PrintedByPosition::Left,
        }
    }
}

/// CSS colour strings (`#rgb`, `#rrggbb`, `rgb(r, g, b)` or a basic colour name).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorConfig {
    pub heading: String,
    pub subheading: String,
    pub high_value: String,
    pub low_value: String,
    pub parameter: String,
    pub printed_by: String,
    pub table_header_bg: String,
    pub table_header_text: String,
    pub parameter_header_text: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        ColorConfig {
            heading: "#003366".into(),
            subheading: "#003366".into(),
            high_value: "#000000".into(),
            low_value: "#000000".into(),
            parameter: "#000000".into(),
            printed_by: "#555555".into(),
            table_header_bg: "#FFFFFF".into(),
            table_header_text: "#000000".into(),
            parameter_header_text: "#000000".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontSizes {
    pub heading: f32,
    pub subheading: f32,
    pub parameter: f32,
    pub parameter_header: f32,
    pub printed_by: f32,
    pub footer: f32,
}

impl Default for FontSizes {
    fn default() -> Self {
        FontSizes {
            heading: 13.0,
            subheading: 10.0,
            parameter: 9.0,
            parameter_header: 10.0,
            printed_by: 8.0,
            footer: 7.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StampConfig {
    pub display: bool,
    /// Drawn width in millimetres; height follows the image aspect ratio.
    pub width: f32,
    pub margin_bottom: f32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StampsConfig {
    pub stamp_right: StampConfig,
    pub stamp_center: StampConfig,
}

impl Default for StampsConfig {
    fn default() -> Self {
        StampsConfig {
            stamp_right: StampConfig {
                display: true,
                width: 35.0,
                margin_bottom: 21.0,
            },
            stamp_center: StampConfig {
                display: false,
                width: 40.0,
                margin_bottom: 21.0,
            },
        }
    }
}

impl Default for StampConfig {
    fn default() -> Self {
        StampConfig {
            display: false,
            width: 35.0,
            margin_bottom: 21.0,
        }
    }
}

/// Percentages of the content width; must sum to 100.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnWidths {
    pub parameter: f32,
    pub value: f32,
    pub unit: f32,
    pub range: f32,
}

impl Default for ColumnWidths {
    fn default() -> Self {
        ColumnWidths {
            parameter: 40.0,
            value: 20.0,
            unit: 20.0,
            range: 20.0,
        }
    }
}

impl ReportConfig {
    /// Defaults overridden by whatever keys `json` carries.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let overrides: serde_json::Value = serde_json::from_str(json)?;
        let config = Self::with_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Merges `overrides` key by key (recursively for nested objects) over the defaults.
    pub fn with_overrides(overrides: serde_json::Value) -> Result<Self, Error> {
        let mut base = serde_json::to_value(ReportConfig::default())?;
        merge_json(&mut base, overrides);
        Ok(serde_json::from_value(base)?)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let cw = &self.column_widths;
        let total = cw.parameter + cw.value + cw.unit + cw.range;
        if (total - 100.0).abs() > 0.01 {
            return Err(Error::InvalidConfig(format!(
                "column widths must sum to 100, got {total}"
            )));
        }
        if [cw.parameter, cw.value, cw.unit, cw.range]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(Error::InvalidConfig("column widths must not be negative".into()));
        }
        let p = &self.page;
        if p.margin_top < 0.0 || p.margin_bottom < 0.0 || p.margin_horizontal < 0.0 {
            return Err(Error::InvalidConfig("margins must not be negative".into()));
        }
        if p.margin_top + p.margin_bottom >= PAGE_HEIGHT_MM
            || 2.0 * p.margin_horizontal >= PAGE_WIDTH_MM
        {
            return Err(Error::InvalidConfig("margins leave no content area".into()));
        }
        if self.parameter_vertical_spacing <= 0.0 {
            return Err(Error::InvalidConfig(
                "parameterVerticalSpacing must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn content_width(&self) -> f32 {
        PAGE_WIDTH_MM - 2.0 * self.page.margin_horizontal
    }

    /// Lowest y (from the top) that content may reach.
    pub fn content_bottom(&self) -> f32 {
        PAGE_HEIGHT_MM - self.page.margin_bottom
    }
}

fn rgb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"rgb\s*\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)").expect("valid regex")
    })
}

fn named_color(name: &str) -> Option<Rgb> {
    Some(match name {
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "gray" | "grey" => [128, 128, 128],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "purple" => [128, 0, 128],
        "pink" => [255, 192, 203],
        "brown" => [165, 42, 42],
        "navy" => [0, 0, 128],
        "teal" => [0, 128, 128],
        "lime" => [0, 255, 0],
        "cyan" => [0, 255, 255],
        "magenta" => [255, 0, 255],
        "silver" => [192, 192, 192],
        "maroon" => [128, 0, 0],
        "olive" => [128, 128, 0],
        _ => return None,
    })
}

/// Parses a CSS colour. Unknown forms return `None`.
pub fn parse_color(val: &str) -> Option<Rgb> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        return match hex.len() {
            3 => {
                let ch = |i: usize| u8::from_str_radix(&hex[i..i + 1].repeat(2), 16).ok();
                Some([ch(0)?, ch(1)?, ch(2)?])
            }
            6 => {
                let ch = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                Some([ch(0)?, ch(2)?, ch(4)?])
            }
            _ => None,
        };
    }
    if let Some(caps) = rgb_re().captures(val) {
        let ch = |i: usize| caps[i].parse::<u16>().ok().map(|v| v.min(255) as u8);
        return Some([ch(1)?, ch(2)?, ch(3)?]);
    }
    named_color(&val.to_lowercase())
}

/// Configured colour, or black when the string does not parse.
pub fn color_or_black(val: &str) -> Rgb {
    parse_color(val).unwrap_or([0, 0, 0])
}

fn merge_json(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, serde_json::Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

/// Deserializes a partial config object as an override of the defaults.
pub(crate) fn deserialize_overrides<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ReportConfig, D::Error> {
    let overrides = Option::<serde_json::Value>::deserialize(deserializer)?
        .unwrap_or(serde_json::Value::Null);
    ReportConfig::with_overrides(overrides).map_err(serde::de::Error::custom)
}
