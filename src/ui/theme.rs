use egui::{Color32, FontFamily, FontId, Rounding, Stroke, Style, TextStyle, Visuals};

use crate::schedule::Feedback;

pub const ACCENT: Color32 = Color32::from_rgb(19, 152, 244);
pub const SAVED: Color32 = Color32::from_rgb(105, 211, 107);
pub const FAILED: Color32 = Color32::from_rgb(255, 110, 110);

pub fn setup_fonts(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();

    // Phosphor icons as fallback in the Proportional family
    egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);

    ctx.set_fonts(fonts);
}

pub fn setup_theme(ctx: &egui::Context) {
    let mut style = Style::default();

    let mut visuals = Visuals::dark();

    let bg = Color32::BLACK;
    visuals.panel_fill = bg;
    visuals.window_fill = bg;
    visuals.faint_bg_color = Color32::from_rgb(20, 20, 18);
    visuals.extreme_bg_color = Color32::from_rgb(14, 14, 12);

    // Warm grays (R=G > B)
    visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(40, 40, 38);
    visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, Color32::from_rgb(176, 176, 168));

    visuals.widgets.inactive.bg_fill = Color32::from_rgb(56, 56, 52);
    visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, Color32::from_rgb(200, 200, 192));

    visuals.widgets.hovered.bg_fill = Color32::from_rgb(80, 80, 74);
    visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, Color32::WHITE);

    visuals.widgets.active.bg_fill = ACCENT;
    visuals.widgets.active.fg_stroke = Stroke::new(1.0, Color32::WHITE);

    visuals.selection.bg_fill = ACCENT;
    visuals.selection.stroke = Stroke::new(1.0, Color32::WHITE);

    visuals.widgets.noninteractive.rounding = Rounding::same(4.0);
    visuals.widgets.inactive.rounding = Rounding::same(4.0);
    visuals.widgets.hovered.rounding = Rounding::same(4.0);
    visuals.widgets.active.rounding = Rounding::same(4.0);
    visuals.window_rounding = Rounding::same(8.0);

    style.visuals = visuals;

    style.text_styles = [
        (TextStyle::Small, FontId::new(11.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(13.0, FontFamily::Proportional)),
        (TextStyle::Button, FontId::new(13.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(15.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(13.0, FontFamily::Monospace)),
    ]
    .into();

    // The grid is dense; keep spacing tight
    style.spacing.item_spacing = egui::vec2(4.0, 2.0);
    style.spacing.button_padding = egui::vec2(12.0, 6.0);
    style.spacing.window_margin = egui::Margin::same(20.0);

    ctx.set_style(style);
}

/// Colour of a cell's duration while a save highlight is showing
pub fn feedback_color(feedback: Option<Feedback>) -> Color32 {
    match feedback {
        Some(Feedback::Saved) => SAVED,
        Some(Feedback::Failed) => FAILED,
        None => Color32::from_rgb(208, 208, 200),
    }
}

/// Returns (bg_color, text_color) for button-like elements
pub fn button_colors() -> (Color32, Color32) {
    (
        Color32::from_rgb(56, 56, 52),
        Color32::from_rgb(200, 200, 192),
    )
}

/// Returns (content_bg, frame_color) for dialogs
pub fn dialog_colors() -> (Color32, Color32) {
    (Color32::BLACK, Color32::from_rgb(40, 40, 38))
}

/// Returns (weekday_bg, weekend_bg) for day columns
pub fn day_column_colors() -> (Color32, Color32) {
    (Color32::from_rgb(20, 20, 18), Color32::from_rgb(32, 26, 26))
}
