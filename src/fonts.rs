use std::borrow::Cow;

use pdf_writer::{Name, Pdf, Ref};

/// The four standard Helvetica faces. Every report font is one of these, so
/// measurement needs no font files and is identical on every machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FontStyle {
    Normal,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub const ALL: [FontStyle; 4] = [
        FontStyle::Normal,
        FontStyle::Bold,
        FontStyle::Italic,
        FontStyle::BoldItalic,
    ];

    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (true, true) => FontStyle::BoldItalic,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (false, false) => FontStyle::Normal,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    pub(crate) fn base_font(self) -> &'static str {
        match self {
            FontStyle::Normal => "Helvetica",
            FontStyle::Bold => "Helvetica-Bold",
            FontStyle::Italic => "Helvetica-Oblique",
            FontStyle::BoldItalic => "Helvetica-BoldOblique",
        }
    }

    /// Resource name used in content streams.
    pub(crate) fn pdf_name(self) -> &'static str {
        match self {
            FontStyle::Normal => "F1",
            FontStyle::Bold => "F2",
            FontStyle::Italic => "F3",
            FontStyle::BoldItalic => "F4",
        }
    }
}

pub(crate) struct FontEntry {
    pub(crate) pdf_name: &'static str,
    pub(crate) font_ref: Ref,
}

/// Helvetica advance widths (1000 units/em) for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,                               // digits
    278, 278, 584, 584, 584, 556, 1015,                                             // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,                // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,                // N..Z
    278, 278, 278, 469, 556, 333,                                                   // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,                // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,                // n..z
    334, 260, 334, 584,                                                             // '{'..'~'
];

/// Helvetica-Bold advance widths for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

/// Width of a WinAnsi byte in 1000-units. Oblique faces share the upright metrics.
fn byte_width_1000(style: FontStyle, byte: u8) -> f32 {
    let table = if style.is_bold() {
        &HELVETICA_BOLD_ASCII
    } else {
        &HELVETICA_ASCII
    };
    let w = match byte {
        32..=126 => table[(byte - 32) as usize],
        0x95 => 350,        // bullet
        0xA0 => 278,        // no-break space
        0xB0 => 400,        // degree
        0xB1 | 0xD7 | 0xF7 => 584, // plus-minus, multiply, divide
        _ => 556,
    };
    w as f32
}

/// Replaces characters that WinAnsi cannot carry with readable ASCII.
pub(crate) fn transliterate(text: &str) -> Cow<'_, str> {
    if text.chars().all(|c| char_to_winansi(c) != 0 || c.is_control()) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\u{2265}' => out.push_str(">="),
            '\u{2264}' => out.push_str("<="),
            '\u{2260}' => out.push_str("!="),
            '\u{03B1}' => out.push_str("alpha"),
            '\u{03B2}' => out.push_str("beta"),
            '\u{03B3}' => out.push_str("gamma"),
            '\u{03B4}' => out.push_str("delta"),
            '\u{03C9}' => out.push_str("omega"),
            '\u{03BC}' => out.push('\u{00B5}'),
            c if char_to_winansi(c) != 0 || c.is_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    Cow::Owned(out)
}

/// Width of `text` in points.
pub(crate) fn text_width_pt(text: &str, style: FontStyle, size: f32) -> f32 {
    to_winansi_bytes(&transliterate(text))
        .iter()
        .filter(|&&b| b >= 32)
        .map(|&b| byte_width_1000(style, b))
        .sum::<f32>()
        * size
        / 1000.0
}

/// Map a single Unicode char to its WinAnsi byte, or 0 if unmappable.
fn char_to_winansi(c: char) -> u8 {
    match c as u32 {
        0x0020..=0x007E => c as u8,
        0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => 0,
    }
}

/// Convert a UTF-8 string to WinAnsi (Windows-1252) bytes for PDF Str encoding.
/// Control characters are dropped.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .filter_map(|c| match char_to_winansi(c) {
            0 if c.is_control() => None,
            0 => Some(b'?'),
            b => Some(b),
        })
        .collect()
}

/// Writes the four Type1 font dictionaries and returns them in `FontStyle::ALL` order.
pub(crate) fn register_fonts(pdf: &mut Pdf, alloc: &mut impl FnMut() -> Ref) -> Vec<FontEntry> {
    FontStyle::ALL
        .iter()
        .map(|style| {
            let font_ref = alloc();
            pdf.type1_font(font_ref)
                .base_font(Name(style.base_font().as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            FontEntry {
                pdf_name: style.pdf_name(),
                font_ref,
            }
        })
        .collect()
}
