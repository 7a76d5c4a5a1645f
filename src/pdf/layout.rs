use crate::config::Rgb;
use crate::fonts::{FontStyle, text_width_pt};

use super::{Align, Canvas, MM};

/// A stretch of text in one face, size and colour.
#[derive(Clone, Debug, PartialEq)]
pub struct StyledRun {
    pub text: String,
    pub style: FontStyle,
    pub size: f32,
    pub color: Rgb,
}

pub(crate) struct WordChunk {
    pub(crate) text: String,
    pub(crate) style: FontStyle,
    pub(crate) size: f32,
    pub(crate) color: Rgb,
    pub(crate) x_offset: f32, // mm from line start
    pub(crate) width: f32,
}

pub(crate) struct TextLine {
    pub(crate) chunks: Vec<WordChunk>,
    pub(crate) total_width: f32,
}

/// Width of `text` in millimetres.
pub(crate) fn text_width(text: &str, style: FontStyle, size: f32) -> f32 {
    text_width_pt(text, style, size) / MM
}

fn finish_line(chunks: &mut Vec<WordChunk>) -> TextLine {
    let total_width = chunks.last().map(|c| c.x_offset + c.width).unwrap_or(0.0);
    TextLine {
        chunks: std::mem::take(chunks),
        total_width,
    }
}

/// Splits a word that is wider than `max_width` into pieces that each fit.
fn break_word(word: &str, style: FontStyle, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if !current.is_empty() && text_width(&candidate, style, size) > max_width {
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Layout runs into wrapped lines.
///
/// The first line starts `first_line_offset` mm in, which lets inline content
/// continue on a line that earlier content already occupies. No space is
/// inserted between runs unless the preceding text ended with whitespace or
/// the new run starts with whitespace, so `"<b>bold</b>, plain"` keeps the
/// comma attached. Words wider than a whole line are broken by character.
pub(crate) fn build_lines(
    runs: &[StyledRun],
    max_width: f32,
    first_line_offset: f32,
) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut current_chunks: Vec<WordChunk> = Vec::new();
    let mut current_x: f32 = first_line_offset;
    let mut prev_ended_with_ws = false;
    let mut prev_space_w: f32 = 0.0;

    for run in runs {
        let space_w = text_width(" ", run.style, run.size);
        let starts_with_ws = run.text.starts_with(char::is_whitespace);

        for (i, word) in run.text.split_whitespace().enumerate() {
            let ww = text_width(word, run.style, run.size);
            let pieces = if ww > max_width {
                break_word(word, run.style, run.size, max_width)
            } else {
                vec![word.to_string()]
            };

            for (pi, piece) in pieces.into_iter().enumerate() {
                let pw = text_width(&piece, run.style, run.size);
                let line_has_content = !current_chunks.is_empty();
                let need_space = pi == 0
                    && line_has_content
                    && (i > 0 || starts_with_ws || prev_ended_with_ws);
                let effective_space_w = if i > 0 || starts_with_ws {
                    space_w
                } else {
                    prev_space_w
                };
                let proposed_x = if need_space {
                    current_x + effective_space_w
                } else {
                    current_x
                };

                let carried_in = lines.is_empty() && current_x > 0.0 && !line_has_content;
                if (line_has_content || carried_in) && proposed_x + pw > max_width {
                    lines.push(finish_line(&mut current_chunks));
                    current_x = 0.0;
                } else {
                    current_x = proposed_x;
                }

                current_chunks.push(WordChunk {
                    text: piece,
                    style: run.style,
                    size: run.size,
                    color: run.color,
                    x_offset: current_x,
                    width: pw,
                });
                current_x += pw;
            }
        }

        if !run.text.is_empty() {
            prev_ended_with_ws = run.text.ends_with(char::is_whitespace);
            prev_space_w = space_w;
        }
    }

    if !current_chunks.is_empty() {
        lines.push(finish_line(&mut current_chunks));
    }

    if lines.is_empty() {
        lines.push(TextLine {
            chunks: vec![],
            total_width: first_line_offset,
        });
    }
    lines
}

/// Word-wraps plain text to `max_width` mm. Explicit newlines always start a
/// new line; blank input lines are kept as empty strings.
pub fn split_text(text: &str, style: FontStyle, size: f32, max_width: f32) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.split('\n') {
        let run = StyledRun {
            text: paragraph.to_string(),
            style,
            size,
            color: [0, 0, 0],
        };
        for line in build_lines(std::slice::from_ref(&run), max_width, 0.0) {
            out.push(
                line.chunks
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
    }
    out
}

/// Draws wrapped lines with their first baseline at `first_baseline`.
pub(crate) fn render_lines(
    canvas: &mut Canvas,
    lines: &[TextLine],
    x: f32,
    width: f32,
    first_baseline: f32,
    line_pitch: f32,
    align: Align,
) {
    for (line_num, line) in lines.iter().enumerate() {
        let y = first_baseline + line_num as f32 * line_pitch;
        let line_start_x = match align {
            Align::Center => x + (width - line.total_width) / 2.0,
            Align::Right => x + width - line.total_width,
            Align::Left => x,
        };
        for chunk in &line.chunks {
            canvas.draw_run(
                &chunk.text,
                line_start_x + chunk.x_offset,
                y,
                chunk.style,
                chunk.size,
                chunk.color,
            );
        }
    }
}
