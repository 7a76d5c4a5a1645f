//! Page canvas: millimetre-based drawing primitives over `pdf-writer` content
//! streams, and final document assembly.

mod layout;
pub mod richtext;
pub mod table;

use std::io::Cursor;
use std::sync::Arc;

use image::ImageDecoder;
use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, Str};

use crate::config::{PAGE_HEIGHT_MM, PAGE_WIDTH_MM, Rgb};
use crate::error::Error;
use crate::fonts::{self, FontStyle, to_winansi_bytes, transliterate};

pub use layout::{StyledRun, split_text};
pub(crate) use layout::{TextLine, build_lines, render_lines, text_width};

/// Points per millimetre.
pub const MM: f32 = 72.0 / 25.4;

/// Baseline-to-baseline distance of multi-line text, as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Paint {
    Stroke,
    Fill,
    FillStroke,
}

enum ImageData {
    /// Baseline JPEG, embedded untouched.
    Jpeg { data: Vec<u8>, gray: bool },
    /// Decoded pixels with an optional alpha plane.
    Raw { rgb: Vec<u8>, alpha: Option<Vec<u8>> },
}

/// An image decoded once and embedded into the document on first use.
pub struct EmbeddedImage {
    data: ImageData,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl std::fmt::Debug for EmbeddedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedImage")
            .field("pixel_width", &self.pixel_width)
            .field("pixel_height", &self.pixel_height)
            .finish_non_exhaustive()
    }
}

impl EmbeddedImage {
    /// Reads a JPEG or PNG file held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, Error> {
        if data.starts_with(&[0xFF, 0xD8]) {
            let (w, h, gray) = {
                let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(&data))?;
                let (w, h) = decoder.dimensions();
                (w, h, matches!(decoder.color_type(), image::ColorType::L8))
            };
            return Ok(EmbeddedImage {
                data: ImageData::Jpeg { data, gray },
                pixel_width: w,
                pixel_height: h,
            });
        }

        let decoded = image::load_from_memory(&data)?;
        let rgba = decoded.to_rgba8();
        let (w, h) = (rgba.width(), rgba.height());
        let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);
        let rgb: Vec<u8> = rgba
            .pixels()
            .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
            .collect();
        let alpha = has_alpha.then(|| rgba.pixels().map(|p| p.0[3]).collect());
        Ok(EmbeddedImage {
            data: ImageData::Raw { rgb, alpha },
            pixel_width: w,
            pixel_height: h,
        })
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f32 {
        if self.pixel_height == 0 {
            return 1.0;
        }
        self.pixel_width as f32 / self.pixel_height as f32
    }
}

fn embed_image(img: &EmbeddedImage, pdf: &mut Pdf, alloc: &mut impl FnMut() -> Ref) -> Ref {
    let xobj_ref = alloc();
    let (w, h) = (img.pixel_width as i32, img.pixel_height as i32);
    match &img.data {
        ImageData::Jpeg { data, gray } => {
            let mut xobj = pdf.image_xobject(xobj_ref, data);
            xobj.filter(Filter::DctDecode);
            xobj.width(w);
            xobj.height(h);
            if *gray {
                xobj.color_space().device_gray();
            } else {
                xobj.color_space().device_rgb();
            }
            xobj.bits_per_component(8);
        }
        ImageData::Raw { rgb, alpha } => {
            let smask_ref = alpha.as_ref().map(|alpha| {
                let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(alpha, 6);
                let mask_ref = alloc();
                let mut mask = pdf.image_xobject(mask_ref, &compressed_alpha);
                mask.filter(Filter::FlateDecode);
                mask.width(w);
                mask.height(h);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                mask_ref
            });

            let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(rgb, 6);
            let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
            xobj.filter(Filter::FlateDecode);
            xobj.width(w);
            xobj.height(h);
            xobj.color_space().device_rgb();
            xobj.bits_per_component(8);
            if let Some(mask_ref) = smask_ref {
                xobj.s_mask(mask_ref);
            }
        }
    }
    xobj_ref
}

fn pt_y(y_mm: f32) -> f32 {
    (PAGE_HEIGHT_MM - y_mm) * MM
}

fn unit(c: Rgb) -> (f32, f32, f32) {
    (c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0)
}

/// A4 drawing surface. Coordinates are millimetres from the top-left corner;
/// text is placed by its baseline.
///
/// Primitives never fail individually. The first non-finite coordinate is
/// recorded and [`Canvas::finish`] reports it as [`Error::Layout`], so a
/// broken layout yields no document at all.
pub struct Canvas {
    pages: Vec<Content>,
    font: FontStyle,
    font_size: f32,
    text_color: Rgb,
    draw_color: Rgb,
    fill_color: Rgb,
    line_width: f32,
    images: Vec<Arc<EmbeddedImage>>,
    fault: Option<String>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    /// A canvas with one empty page.
    pub fn new() -> Self {
        Canvas {
            pages: vec![Content::new()],
            font: FontStyle::Normal,
            font_size: 10.0,
            text_color: [0, 0, 0],
            draw_color: [0, 0, 0],
            fill_color: [0, 0, 0],
            line_width: 0.2,
            images: Vec::new(),
            fault: None,
        }
    }

    /// Fresh canvas carrying the current font state, for measuring content
    /// before it is drawn for real. Its output is never assembled.
    pub fn scratch(&self) -> Canvas {
        Canvas {
            font: self.font,
            font_size: self.font_size,
            text_color: self.text_color,
            ..Canvas::new()
        }
    }

    pub fn width(&self) -> f32 {
        PAGE_WIDTH_MM
    }

    pub fn height(&self) -> f32 {
        PAGE_HEIGHT_MM
    }

    pub fn add_page(&mut self) {
        self.pages.push(Content::new());
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn set_font(&mut self, style: FontStyle, size: f32) {
        self.font = style;
        self.font_size = size;
    }

    pub fn set_font_style(&mut self, style: FontStyle) {
        self.font = style;
    }

    pub fn set_font_size(&mut self, size: f32) {
        self.font_size = size;
    }

    pub fn font_style(&self) -> FontStyle {
        self.font
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn set_text_color(&mut self, color: Rgb) {
        self.text_color = color;
    }

    pub fn text_color(&self) -> Rgb {
        self.text_color
    }

    pub fn set_draw_color(&mut self, color: Rgb) {
        self.draw_color = color;
    }

    pub fn set_fill_color(&mut self, color: Rgb) {
        self.fill_color = color;
    }

    /// Stroke width in millimetres.
    pub fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    /// Width of `text` in the current font, in millimetres.
    pub fn text_width(&self, text: &str) -> f32 {
        text_width(text, self.font, self.font_size)
    }

    /// Baseline pitch of multi-line text in the current font, in millimetres.
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_HEIGHT_FACTOR / MM
    }

    /// Word-wraps `text` in the current font.
    pub fn split_text_to_size(&self, text: &str, max_width: f32) -> Vec<String> {
        split_text(text, self.font, self.font_size, max_width)
    }

    fn content(&mut self) -> &mut Content {
        if self.pages.is_empty() {
            self.pages.push(Content::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn guard(&mut self, op: &str, values: &[f32]) -> bool {
        if values.iter().all(|v| v.is_finite()) {
            return true;
        }
        if self.fault.is_none() {
            self.fault = Some(format!(
                "{op} called with non-finite coordinates {values:?} on page {}",
                self.pages.len()
            ));
        }
        false
    }

    /// Single line of text in the current font and text colour.
    pub fn text(&mut self, text: &str, x: f32, y: f32, align: Align) {
        let w = self.text_width(text);
        let x = match align {
            Align::Left => x,
            Align::Center => x - w / 2.0,
            Align::Right => x - w,
        };
        self.draw_run(text, x, y, self.font, self.font_size, self.text_color);
    }

    /// Several lines, the first baseline at `y`, spaced by [`Canvas::line_height`].
    pub fn text_lines<S: AsRef<str>>(&mut self, lines: &[S], x: f32, y: f32, align: Align) {
        let pitch = self.line_height();
        for (i, line) in lines.iter().enumerate() {
            self.text(line.as_ref(), x, y + i as f32 * pitch, align);
        }
    }

    pub(crate) fn draw_run(
        &mut self,
        text: &str,
        x: f32,
        y: f32,
        style: FontStyle,
        size: f32,
        color: Rgb,
    ) {
        if text.is_empty() || !self.guard("text", &[x, y, size]) {
            return;
        }
        let bytes = to_winansi_bytes(&transliterate(text));
        let (r, g, b) = unit(color);
        let content = self.content();
        content.save_state();
        content.set_fill_rgb(r, g, b);
        content.begin_text();
        content.set_font(Name(style.pdf_name().as_bytes()), size);
        content.next_line(x * MM, pt_y(y));
        content.show(Str(&bytes));
        content.end_text();
        content.restore_state();
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        if !self.guard("line", &[x1, y1, x2, y2]) {
            return;
        }
        let (r, g, b) = unit(self.draw_color);
        let lw = self.line_width * MM;
        let content = self.content();
        content.save_state();
        content.set_stroke_rgb(r, g, b);
        content.set_line_width(lw);
        content.move_to(x1 * MM, pt_y(y1));
        content.line_to(x2 * MM, pt_y(y2));
        content.stroke();
        content.restore_state();
    }

    fn begin_paint(&mut self) {
        let (fr, fg, fb) = unit(self.fill_color);
        let (sr, sg, sb) = unit(self.draw_color);
        let lw = self.line_width * MM;
        let content = self.content();
        content.save_state();
        content.set_fill_rgb(fr, fg, fb);
        content.set_stroke_rgb(sr, sg, sb);
        content.set_line_width(lw);
    }

    fn end_paint(&mut self, paint: Paint) {
        let content = self.content();
        match paint {
            Paint::Stroke => content.stroke(),
            Paint::Fill => content.fill_nonzero(),
            Paint::FillStroke => content.fill_nonzero_and_stroke(),
        };
        content.restore_state();
    }

    /// Axis-aligned rectangle with its top-left corner at (`x`, `y`).
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, paint: Paint) {
        if !self.guard("rect", &[x, y, w, h]) {
            return;
        }
        self.begin_paint();
        self.content().rect(x * MM, pt_y(y + h), w * MM, h * MM);
        self.end_paint(paint);
    }

    /// Rectangle with circular corners of radius `radius`.
    pub fn rounded_rect(&mut self, x: f32, y: f32, w: f32, h: f32, radius: f32, paint: Paint) {
        if !self.guard("rounded_rect", &[x, y, w, h, radius]) {
            return;
        }
        let r = radius.min(w / 2.0).min(h / 2.0).max(0.0) * MM;
        // Control-point distance for a quarter circle drawn with one cubic.
        let k = 0.552_284_8 * r;
        let (left, right) = (x * MM, (x + w) * MM);
        let (top, bottom) = (pt_y(y), pt_y(y + h));

        self.begin_paint();
        let c = self.content();
        c.move_to(left + r, bottom);
        c.line_to(right - r, bottom);
        c.cubic_to(right - r + k, bottom, right, bottom + r - k, right, bottom + r);
        c.line_to(right, top - r);
        c.cubic_to(right, top - r + k, right - r + k, top, right - r, top);
        c.line_to(left + r, top);
        c.cubic_to(left + r - k, top, left, top - r + k, left, top - r);
        c.line_to(left, bottom + r);
        c.cubic_to(left, bottom + r - k, left + r - k, bottom, left + r, bottom);
        c.close_path();
        self.end_paint(paint);
    }

    /// Draws `img` scaled into the box with top-left (`x`, `y`).
    pub fn image(&mut self, img: &Arc<EmbeddedImage>, x: f32, y: f32, w: f32, h: f32) {
        if !self.guard("image", &[x, y, w, h]) {
            return;
        }
        let index = match self.images.iter().position(|known| Arc::ptr_eq(known, img)) {
            Some(i) => i,
            None => {
                self.images.push(Arc::clone(img));
                self.images.len() - 1
            }
        };
        let name = format!("Im{}", index + 1);
        let content = self.content();
        content.save_state();
        content.transform([w * MM, 0.0, 0.0, h * MM, x * MM, pt_y(y + h)]);
        content.x_object(Name(name.as_bytes()));
        content.restore_state();
    }

    /// Assembles the PDF file.
    pub fn finish(self) -> Result<Vec<u8>, Error> {
        if let Some(fault) = self.fault {
            return Err(Error::Layout(fault));
        }

        let mut pdf = Pdf::new();
        let mut next_id = 1i32;
        let mut alloc = || {
            let r = Ref::new(next_id);
            next_id += 1;
            r
        };

        let catalog_id = alloc();
        let pages_id = alloc();

        let font_pairs = fonts::register_fonts(&mut pdf, &mut alloc);

        let image_xobjects: Vec<(String, Ref)> = self
            .images
            .iter()
            .enumerate()
            .map(|(i, img)| (format!("Im{}", i + 1), embed_image(img, &mut pdf, &mut alloc)))
            .collect();

        let n = self.pages.len();
        let page_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();
        let content_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();

        for (i, c) in self.pages.into_iter().enumerate() {
            let raw = c.finish();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
            pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);
        }

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(n as i32);

        for i in 0..n {
            let mut page = pdf.page(page_ids[i]);
            page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH_MM * MM, PAGE_HEIGHT_MM * MM))
                .parent(pages_id)
                .contents(content_ids[i]);
            let mut resources = page.resources();
            {
                let mut fonts = resources.fonts();
                for entry in &font_pairs {
                    fonts.pair(Name(entry.pdf_name.as_bytes()), entry.font_ref);
                }
            }
            if !image_xobjects.is_empty() {
                let mut xobjects = resources.x_objects();
                for (name, xobj_ref) in &image_xobjects {
                    xobjects.pair(Name(name.as_bytes()), *xobj_ref);
                }
            }
        }

        Ok(pdf.finish())
    }
}
