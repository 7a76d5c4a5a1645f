use std::sync::Arc;

use crate::fonts::FontStyle;
use crate::model::{AiRecommendationSection, AiSuggestions};
use crate::pdf::{Align, EmbeddedImage, Paint, StyledRun, TextLine, build_lines, render_lines, text_width};

use super::pagination::RenderContext;

const TITLE: &str = "AI Expert Suggestion According to Report Value";
const TITLE_COLOR: [u8; 3] = [0, 51, 102];
const CARD_FILL: [u8; 3] = [245, 245, 245];
const DESCRIPTION_COLOR: [u8; 3] = [50, 50, 50];
const CARD_PADDING: f32 = 5.0;
const IMAGE_SIZE: f32 = 30.0;
const TEXT_GAP: f32 = 5.0;
const ITEM_PITCH: f32 = 4.0;
const CARD_GAP: f32 = 10.0;

/// Puts the recommendation page on its own page, keyed to the registration
/// time. Returns the cursor below the last card.
pub fn render_ai_page(ctx: &mut RenderContext, ai: &AiSuggestions) -> f32 {
    let created_at = ctx.patient.created_at.clone();
    let created_at = Some(created_at.as_str());
    let y = ctx.new_page(created_at);
    let (mut y, _) = ctx.ensure_space(y, 30.0, created_at);

    let page_w = ctx.canvas.width();
    ctx.canvas.set_font(FontStyle::Bold, 16.0);
    ctx.canvas.set_text_color(TITLE_COLOR);
    ctx.canvas.text(TITLE, page_w / 2.0, y + 10.0, Align::Center);
    y += 20.0;

    let diet = ctx.assets.diet.clone();
    let exercise = ctx.assets.exercise.clone();
    y = recommendation_card(ctx, &ai.diet, diet.as_ref(), y, created_at);
    y = recommendation_card(ctx, &ai.exercise, exercise.as_ref(), y, created_at);
    log::debug!("AI suggestions page done at y={y:.1}");
    y
}

struct ItemLayout {
    heading: String,
    lines: Vec<TextLine>,
}

impl ItemLayout {
    fn height(&self) -> f32 {
        self.lines.len().max(1) as f32 * ITEM_PITCH + 1.0
    }
}

fn layout_item(heading: &str, content: &str, text_w: f32) -> ItemLayout {
    let heading = format!("• {heading}:");
    let heading_width = text_width(&heading, FontStyle::Bold, 9.0);
    let gap = text_width(" ", FontStyle::Normal, 8.0);
    let run = StyledRun {
        text: content.to_string(),
        style: FontStyle::Normal,
        size: 8.0,
        color: [0, 0, 0],
    };
    ItemLayout {
        heading,
        lines: build_lines(std::slice::from_ref(&run), text_w, heading_width + gap),
    }
}

fn recommendation_card(
    ctx: &mut RenderContext,
    section: &AiRecommendationSection,
    image: Option<&Arc<EmbeddedImage>>,
    y: f32,
    created_at: Option<&str>,
) -> f32 {
    let left = ctx.left();
    let card_w = ctx.content_width();
    let text_x = left + CARD_PADDING + IMAGE_SIZE + TEXT_GAP;
    let text_w = card_w - 2.0 * CARD_PADDING - IMAGE_SIZE - TEXT_GAP;

    ctx.canvas.set_font(FontStyle::Bold, 12.0);
    let title_h = ctx.canvas.line_height();
    ctx.canvas.set_font(FontStyle::Normal, 8.0);
    let description = if section.description.trim().is_empty() {
        Vec::new()
    } else {
        ctx.canvas.split_text_to_size(&section.description, text_w)
    };
    let items: Vec<ItemLayout> = section
        .items
        .iter()
        .map(|item| layout_item(&item.heading, &item.content, text_w))
        .collect();

    let text_block_h = title_h
        + 2.0
        + description.len() as f32 * ITEM_PITCH
        + 2.0
        + items.iter().map(ItemLayout::height).sum::<f32>();
    let card_h = (text_block_h + 2.0 * CARD_PADDING).max(IMAGE_SIZE + 2.0 * CARD_PADDING);
    let (card_y, _) = ctx.ensure_space(y, card_h + CARD_GAP, created_at);

    ctx.canvas.set_draw_color([0, 0, 0]);
    ctx.canvas.set_line_width(0.2);
    ctx.canvas.set_fill_color(CARD_FILL);
    ctx.canvas.rect(left, card_y, card_w, card_h, Paint::FillStroke);
    if let Some(image) = image {
        ctx.canvas.image(image, left + CARD_PADDING, card_y + CARD_PADDING, IMAGE_SIZE, IMAGE_SIZE);
    }

    let mut text_y = card_y + CARD_PADDING;
    ctx.canvas.set_font(FontStyle::Bold, 12.0);
    ctx.canvas.set_text_color(TITLE_COLOR);
    ctx.canvas.text(&section.title, text_x, text_y + title_h / 2.0, Align::Left);
    text_y += title_h + 2.0;

    ctx.canvas.set_font(FontStyle::Normal, 8.0);
    ctx.canvas.set_text_color(DESCRIPTION_COLOR);
    for (i, line) in description.iter().enumerate() {
        ctx.canvas.text(line, text_x, text_y + i as f32 * ITEM_PITCH, Align::Left);
    }
    text_y += description.len() as f32 * ITEM_PITCH + 2.0;

    for item in &items {
        text_y = ctx.ensure_space(text_y, item.height(), created_at).0;
        ctx.canvas.set_font(FontStyle::Bold, 9.0);
        ctx.canvas.set_text_color([0, 0, 0]);
        ctx.canvas.text(&item.heading, text_x, text_y, Align::Left);
        render_lines(&mut ctx.canvas, &item.lines, text_x, text_w, text_y, ITEM_PITCH, Align::Left);
        text_y += item.height();
    }
    card_y + card_h + CARD_GAP
}
