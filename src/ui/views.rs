use std::time::Instant;

use chrono::{Datelike, Weekday};
use egui::{Color32, RichText, Ui};

use crate::schedule::time::format_duration;
use crate::schedule::{Autosaver, Completion, FieldRef, GridEvent, ScheduleGrid, Side};
use super::theme::{day_column_colors, feedback_color};

const FIELD_WIDTH: f32 = 42.0;

/// Render the month grid and collect what the user did to it this frame.
/// `focus_request` moves keyboard focus to a field, e.g. after Enter.
pub fn render_grid(
    ui: &mut Ui,
    grid: &ScheduleGrid,
    autosaver: &Autosaver,
    now: Instant,
    focus_request: Option<FieldRef>,
) -> Vec<GridEvent> {
    let mut events = Vec::new();
    let month = grid.month();
    let days = month.days();
    let (weekday_bg, weekend_bg) = day_column_colors();
    let enter_pressed = ui.input(|i| i.key_pressed(egui::Key::Enter));

    egui::ScrollArea::both()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            egui::Grid::new(("schedule_grid", month))
                .striped(true)
                .spacing([4.0, 4.0])
                .show(ui, |ui| {
                    // Header
                    ui.label(RichText::new("Worker").strong());
                    for date in &days {
                        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
                        let color = if weekend { Color32::from_rgb(224, 108, 117) } else { Color32::from_rgb(176, 176, 168) };
                        ui.vertical_centered(|ui| {
                            ui.label(RichText::new(date.day().to_string()).strong().color(color));
                            ui.label(RichText::new(weekday_letter(date.weekday())).small().color(color));
                        });
                    }
                    ui.label(RichText::new("Total").strong());
                    ui.label(RichText::new("Shifts").strong());
                    ui.end_row();

                    for (row_idx, row) in grid.rows().iter().enumerate() {
                        let name = if row.editable {
                            RichText::new(&row.name).color(Color32::WHITE)
                        } else {
                            RichText::new(format!("{} {}", egui_phosphor::regular::LOCK_SIMPLE, row.name))
                                .color(Color32::from_rgb(120, 120, 112))
                        };
                        ui.label(name);

                        for (day, date) in days.iter().enumerate() {
                            let Some(cell) = row.cells.get(day) else { continue };
                            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
                            let fill = if weekend { weekend_bg } else { weekday_bg };

                            egui::Frame::none()
                                .fill(fill)
                                .rounding(egui::Rounding::same(4.0))
                                .inner_margin(egui::Margin::same(2.0))
                                .show(ui, |ui| {
                                    ui.vertical(|ui| {
                                        for side in [Side::Start, Side::End] {
                                            let field = FieldRef::new(row_idx, day, side);
                                            let mut text = cell.text(side).to_string();
                                            let response = ui.add(
                                                egui::TextEdit::singleline(&mut text)
                                                    .id(egui::Id::new(("shift_field", month, field)))
                                                    .desired_width(FIELD_WIDTH)
                                                    .horizontal_align(egui::Align::Center)
                                                    .interactive(row.editable),
                                            );
                                            if focus_request == Some(field) {
                                                response.request_focus();
                                            }
                                            if response.gained_focus() {
                                                events.push(GridEvent::Focus(field));
                                            }
                                            if response.changed() {
                                                events.push(GridEvent::Input(field, text));
                                            }
                                            if response.lost_focus() {
                                                let how = if enter_pressed { Completion::Confirm } else { Completion::Blur };
                                                events.push(GridEvent::Complete(field, how));
                                            }
                                        }

                                        let feedback = grid
                                            .key(row_idx, day)
                                            .and_then(|key| autosaver.feedback(&key, now));
                                        let duration = cell.span().map(format_duration).unwrap_or_default();
                                        ui.label(RichText::new(duration).small().color(feedback_color(feedback)));

                                        let mut double_shift = cell.double_shift();
                                        let toggle = ui.add_enabled(
                                            row.editable,
                                            egui::Checkbox::new(&mut double_shift, RichText::new("x2").small()),
                                        );
                                        if toggle.changed() {
                                            events.push(GridEvent::SetDouble { row: row_idx, day, double_shift });
                                        }
                                    });
                                });
                        }

                        // Totals are derived from the cells every frame
                        let totals = row.totals();
                        ui.label(RichText::new(format_duration(totals.total_minutes)).strong().color(Color32::WHITE));
                        ui.label(RichText::new(totals.shift_units.to_string()).color(Color32::WHITE));
                        ui.end_row();
                    }
                });
        });

    events
}

fn weekday_letter(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mo",
        Weekday::Tue => "Tu",
        Weekday::Wed => "We",
        Weekday::Thu => "Th",
        Weekday::Fri => "Fr",
        Weekday::Sat => "Sa",
        Weekday::Sun => "Su",
    }
}

/// Empty-state message shown when the month has no workers
pub fn render_empty(ui: &mut Ui) {
    ui.add_space(40.0);
    ui.vertical_centered(|ui| {
        ui.label(
            RichText::new(egui_phosphor::regular::USERS_THREE)
                .size(34.0)
                .color(Color32::from_rgb(120, 120, 112)),
        );
        ui.add_space(12.0);
        ui.label(RichText::new("No workers on this month's roster").size(16.0).color(Color32::from_rgb(200, 200, 192)));
    });
}

/// Shown when the month snapshot could not be loaded
pub fn render_offline(ui: &mut Ui) -> bool {
    let mut retry = false;
    ui.add_space(40.0);
    ui.vertical_centered(|ui| {
        ui.label(
            RichText::new(egui_phosphor::regular::WIFI_SLASH)
                .size(34.0)
                .color(Color32::from_rgb(224, 108, 117)),
        );
        ui.add_space(16.0);
        ui.label(RichText::new("Schedule unavailable").size(20.0).color(Color32::from_rgb(200, 200, 210)));
        ui.add_space(8.0);
        ui.label(
            RichText::new("Check the store address in settings and try again")
                .size(14.0)
                .color(Color32::from_rgb(120, 120, 140)),
        );
        ui.add_space(12.0);
        retry = ui.button(format!("{} Retry", egui_phosphor::regular::ARROW_CLOCKWISE)).clicked();
    });
    retry
}
