use kuchiki::NodeRef;

use crate::config::Rgb;
use crate::fonts::FontStyle;

use super::richtext::{InlineStyle, attribute, element_name, parse_inline_css, text_content};
use super::{Align, Canvas, Paint, split_text};

const LINE_HEIGHT: f32 = 5.0;
const DEFAULT_PADDING: f32 = 2.0;
const DEFAULT_BORDER_WIDTH: f32 = 0.5;
const HEADER_FILL: Rgb = [240, 240, 240];
/// Gap left below a table.
const TRAILING_GAP: f32 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub struct TableCell {
    /// Plain text; `<br>` became `\n`.
    pub content: String,
    pub is_header: bool,
    pub colspan: usize,
    pub rowspan: usize,
    pub style: InlineStyle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    pub style: InlineStyle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTable {
    pub rows: Vec<TableRow>,
    pub has_header: bool,
    pub style: InlineStyle,
}

fn span_attr(node: &NodeRef, name: &str) -> usize {
    attribute(node, name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

fn style_of(node: &NodeRef) -> InlineStyle {
    parse_inline_css(&attribute(node, "style").unwrap_or_default())
}

fn cell_text(node: &NodeRef, out: &mut String) {
    for child in node.children() {
        if let Some(text) = text_content(&child) {
            out.push_str(&text);
        } else if element_name(&child).as_deref() == Some("br") {
            out.push('\n');
        } else if child.as_element().is_some() {
            cell_text(&child, out);
        }
    }
}

fn children_named<'a>(node: &NodeRef, tag: &'a str) -> impl Iterator<Item = NodeRef> + 'a {
    node.children()
        .filter(move |c| element_name(c).as_deref() == Some(tag))
}

fn parse_row(row: &NodeRef, header_section: bool) -> TableRow {
    let cells = row
        .children()
        .filter_map(|cell| {
            let tag = element_name(&cell)?;
            if tag != "td" && tag != "th" {
                return None;
            }
            let mut content = String::new();
            cell_text(&cell, &mut content);
            Some(TableCell {
                content: content.trim().to_string(),
                is_header: header_section || tag == "th",
                colspan: span_attr(&cell, "colspan"),
                rowspan: span_attr(&cell, "rowspan"),
                style: style_of(&cell),
            })
        })
        .collect();
    TableRow {
        cells,
        style: style_of(row),
    }
}

/// Reads a `<table>` element. Rows of `<thead>` come first and are all header
/// rows; `<tbody>`, `<tfoot>` and bare `<tr>` rows follow in document order.
pub fn parse_table(table: &NodeRef) -> ParsedTable {
    let mut header_rows = Vec::new();
    let mut body_rows = Vec::new();

    for child in table.children() {
        match element_name(&child).as_deref() {
            Some("thead") => {
                header_rows.extend(children_named(&child, "tr").map(|tr| parse_row(&tr, true)));
            }
            Some("tbody" | "tfoot") => {
                body_rows.extend(children_named(&child, "tr").map(|tr| parse_row(&tr, false)));
            }
            Some("tr") => body_rows.push(parse_row(&child, false)),
            _ => {}
        }
    }

    let has_header = !header_rows.is_empty();
    header_rows.extend(body_rows);
    ParsedTable {
        rows: header_rows,
        has_header,
        style: style_of(table),
    }
}

/// Grid slot of one cell after colspan/rowspan placement.
struct Placement {
    row: usize,
    col: usize,
    colspan: usize,
    rowspan: usize,
}

/// Places cells on the grid. A slot covered by a rowspan from an earlier row
/// is skipped. Returns placements per row and the column count.
fn place_cells(table: &ParsedTable) -> (Vec<Vec<Placement>>, usize) {
    let nrows = table.rows.len();
    let mut occupied: Vec<Vec<bool>> = vec![Vec::new(); nrows];
    let mut ncols = 0usize;
    let mut placements = Vec::with_capacity(nrows);

    for (ri, row) in table.rows.iter().enumerate() {
        let mut col = 0usize;
        let mut row_placements = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            while occupied[ri].get(col).copied().unwrap_or(false) {
                col += 1;
            }
            let rowspan = cell.rowspan.min(nrows - ri);
            for taken in occupied.iter_mut().skip(ri).take(rowspan) {
                if taken.len() < col + cell.colspan {
                    taken.resize(col + cell.colspan, false);
                }
                for slot in &mut taken[col..col + cell.colspan] {
                    *slot = true;
                }
            }
            row_placements.push(Placement {
                row: ri,
                col,
                colspan: cell.colspan,
                rowspan,
            });
            col += cell.colspan;
            ncols = ncols.max(col);
        }
        placements.push(row_placements);
    }
    (placements, ncols)
}

fn cell_font(cell: &TableCell) -> (FontStyle, f32) {
    let (bold, size) = if cell.is_header { (true, 9.0) } else { (false, 8.0) };
    let bold = cell.style.bold.unwrap_or(bold);
    let italic = cell.style.italic.unwrap_or(false);
    let size = cell.style.font_size.filter(|s| *s > 0.0).unwrap_or(size);
    (FontStyle::from_flags(bold, italic), size)
}

fn cell_padding(cell: &TableCell) -> f32 {
    cell.style.padding.filter(|p| *p > 0.0).unwrap_or(DEFAULT_PADDING)
}

/// Draws `table` with its top edge at `y` and returns the cursor a fixed gap
/// below the last row.
pub fn render_table(canvas: &mut Canvas, table: &ParsedTable, x: f32, y: f32, max_width: f32) -> f32 {
    if table.rows.is_empty() {
        return y;
    }
    let (placements, ncols) = place_cells(table);
    if ncols == 0 {
        return y;
    }
    let table_width = table
        .style
        .width
        .filter(|w| *w > 0.0)
        .map_or(max_width, |w| w.min(max_width));
    let col_w = table_width / ncols as f32;
    let saved = (canvas.font_style(), canvas.font_size(), canvas.text_color());

    // Wrapped lines and minimum height of every cell.
    let mut measured: Vec<Vec<(Vec<String>, f32)>> = Vec::with_capacity(table.rows.len());
    for (row, row_placements) in table.rows.iter().zip(&placements) {
        let cells = row
            .cells
            .iter()
            .zip(row_placements)
            .map(|(cell, p)| {
                let padding = cell_padding(cell);
                let (font, size) = cell_font(cell);
                let text_w = (col_w * p.colspan as f32 - 2.0 * padding).max(1.0);
                let lines = split_text(&cell.content, font, size, text_w);
                let lines = if cell.content.is_empty() { Vec::new() } else { lines };
                let height = (lines.len() as f32 * LINE_HEIGHT + 2.0 * padding)
                    .max(LINE_HEIGHT + 2.0 * padding)
                    .max(cell.style.height.unwrap_or(0.0));
                (lines, height)
            })
            .collect();
        measured.push(cells);
    }

    let mut row_heights = vec![0.0f32; table.rows.len()];
    for (row_placements, cells) in placements.iter().zip(&measured) {
        for (p, (_, h)) in row_placements.iter().zip(cells) {
            if p.rowspan == 1 {
                row_heights[p.row] = row_heights[p.row].max(*h);
            }
        }
    }
    // Spanning cells stretch the last row they cover.
    for (row_placements, cells) in placements.iter().zip(&measured) {
        for (p, (_, h)) in row_placements.iter().zip(cells) {
            if p.rowspan > 1 {
                let covered: f32 = row_heights[p.row..p.row + p.rowspan].iter().sum();
                if *h > covered {
                    row_heights[p.row + p.rowspan - 1] += h - covered;
                }
            }
        }
    }
    for h in &mut row_heights {
        if *h == 0.0 {
            *h = LINE_HEIGHT + 2.0 * DEFAULT_PADDING;
        }
    }

    let mut row_tops = Vec::with_capacity(row_heights.len());
    let mut top = y;
    for h in &row_heights {
        row_tops.push(top);
        top += h;
    }

    for (ri, row) in table.rows.iter().enumerate() {
        log::debug!(
            "TABLE row={} row_h={:.2} cells={} top={:.2}",
            ri,
            row_heights[ri],
            row.cells.len(),
            row_tops[ri]
        );
        for ((cell, p), (lines, _)) in row.cells.iter().zip(&placements[ri]).zip(&measured[ri]) {
            let cell_x = x + p.col as f32 * col_w;
            let cell_w = col_w * p.colspan as f32;
            let cell_y = row_tops[ri];
            let cell_h: f32 = row_heights[ri..ri + p.rowspan].iter().sum();
            let padding = cell_padding(cell);

            let fill = cell
                .style
                .background_color
                .or(row.style.background_color)
                .or(cell.is_header.then_some(HEADER_FILL));
            canvas.set_line_width(cell.style.border_width.filter(|w| *w > 0.0).unwrap_or(DEFAULT_BORDER_WIDTH));
            canvas.set_draw_color(cell.style.border_color.unwrap_or([0, 0, 0]));
            let paint = match fill {
                Some(color) => {
                    canvas.set_fill_color(color);
                    Paint::FillStroke
                }
                None => Paint::Stroke,
            };
            canvas.rect(cell_x, cell_y, cell_w, cell_h, paint);

            let (font, size) = cell_font(cell);
            let color = cell.style.color.unwrap_or([0, 0, 0]);
            let align = cell.style.text_align.unwrap_or(Align::Left);
            let text_x = match align {
                Align::Left => cell_x + padding,
                Align::Center => cell_x + cell_w / 2.0,
                Align::Right => cell_x + cell_w - padding,
            };
            canvas.set_font(font, size);
            canvas.set_text_color(color);
            for (li, line) in lines.iter().enumerate() {
                canvas.text(line, text_x, cell_y + padding + (li + 1) as f32 * LINE_HEIGHT, align);
            }
        }
    }

    canvas.set_font(saved.0, saved.1);
    canvas.set_text_color(saved.2);
    top + TRAILING_GAP
}
