use anyhow::{Context, Result};
use eframe::egui;
use egui::{Color32, RichText};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::api::{MemoryStore, MonthSnapshot, ScheduleStore, StoreClient, StoreError};
use crate::config::Config;
use crate::export;
use crate::schedule::{Acknowledgment, Autosaver, BulkState, Feedback, FieldRef, GridEffect, ScheduleGrid, YearMonth};
use super::views;

pub struct ShiftGridApp {
    config: Config,
    store: Arc<dyn ScheduleStore>,
    demo: bool,

    // Current month and its grid; `None` while loading
    month: YearMonth,
    grid: Option<ScheduleGrid>,
    autosaver: Autosaver,
    pending_focus: Option<FieldRef>,

    // Settings dialog
    show_settings: bool,
    settings_url: String,
    settings_token: String,
    settings_font_scale: f32,
    settings_markers: String,
    settings_off_display: String,

    // Status
    status_message: Option<(String, bool)>, // (message, is_error)
    loading: bool,
    load_failed: bool,
    load_generation: u64,

    // Async communication
    runtime: tokio::runtime::Runtime,
    result_rx: Receiver<AsyncResult>,
    result_tx: Sender<AsyncResult>,
}

enum AsyncResult {
    MonthLoaded(u64, MonthSnapshot),
    LoadFailed(u64, StoreError),
}

impl ShiftGridApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Result<Self> {
        let config = Config::load_or_default();
        super::setup_fonts(&cc.egui_ctx);
        super::setup_theme(&cc.egui_ctx);

        let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        let (result_tx, result_rx) = channel();

        let month = YearMonth::parse_or_current(config.last_month.as_deref());
        let (store, demo, status_message) = Self::connect(&config, month);
        let autosaver = Autosaver::new(Arc::clone(&store), runtime.handle().clone(), config.autosave_settings());

        let mut app = Self {
            show_settings: false,
            settings_url: config.store_url.clone(),
            settings_token: String::new(),
            settings_font_scale: config.font_scale,
            settings_markers: config.off_markers.join(", "),
            settings_off_display: config.off_display.clone(),
            config,
            store,
            demo,
            month,
            grid: None,
            autosaver,
            pending_focus: None,
            status_message,
            loading: false,
            load_failed: false,
            load_generation: 0,
            runtime,
            result_rx,
            result_tx,
        };

        app.load_month(month);
        Ok(app)
    }

    /// Pick the store for this config. Falls back to the demo store when no
    /// server is configured or the client cannot be built.
    fn connect(config: &Config, month: YearMonth) -> (Arc<dyn ScheduleStore>, bool, Option<(String, bool)>) {
        if config.is_offline() {
            info!("no store configured, running demo");
            return (Arc::new(MemoryStore::demo(month)), true, None);
        }
        match StoreClient::new(config) {
            Ok(client) => (Arc::new(client), false, None),
            Err(e) => {
                warn!("store client unavailable: {:#}", e);
                (
                    Arc::new(MemoryStore::demo(month)),
                    true,
                    Some((format!("Running demo: {:#}", e), true)),
                )
            }
        }
    }

    fn load_month(&mut self, month: YearMonth) {
        // The old grid goes away with its pending edits; late replies for it
        // are dropped as stale
        self.month = month;
        self.grid = None;
        self.pending_focus = None;
        self.autosaver.reset();
        self.loading = true;
        self.load_failed = false;
        self.load_generation += 1;

        if self.config.last_month.as_deref() != Some(month.to_string().as_str()) {
            self.config.last_month = Some(month.to_string());
            if let Err(e) = self.config.save() {
                warn!("failed to remember month: {:#}", e);
            }
        }

        let generation = self.load_generation;
        let store = Arc::clone(&self.store);
        let tx = self.result_tx.clone();
        info!(%month, "loading month");
        self.runtime.spawn(async move {
            let result = match store.load_month(month).await {
                Ok(snapshot) => AsyncResult::MonthLoaded(generation, snapshot),
                Err(e) => AsyncResult::LoadFailed(generation, e),
            };
            let _ = tx.send(result);
        });
    }

    fn check_async_results(&mut self) {
        while let Ok(result) = self.result_rx.try_recv() {
            match result {
                AsyncResult::MonthLoaded(generation, snapshot) if generation == self.load_generation => {
                    self.loading = false;
                    self.grid = Some(ScheduleGrid::from_snapshot(&snapshot, self.config.parser()));
                }
                AsyncResult::LoadFailed(generation, e) if generation == self.load_generation => {
                    warn!(month = %self.month, error = %e, "month load failed");
                    self.loading = false;
                    self.load_failed = true;
                    self.status_message = Some((format!("Load failed: {}", e), true));
                }
                // A newer month was requested meanwhile
                _ => {}
            }
        }
    }

    fn apply_acknowledgments(&mut self, now: Instant) {
        for ack in self.autosaver.poll(now) {
            match ack {
                Acknowledgment::Applied { key, feedback: Feedback::Failed } => {
                    if let Some(grid) = &mut self.grid {
                        grid.mark_send_failed(key);
                    }
                }
                Acknowledgment::Applied { .. } | Acknowledgment::Stale { .. } => {}
                Acknowledgment::Bulk(state) => {
                    self.status_message = match state {
                        BulkState::Saved(saved) => Some((format!("Month saved: {} shifts", saved), false)),
                        BulkState::Failed(reason) => Some((format!("Month save failed: {}", reason), true)),
                        BulkState::Idle | BulkState::Pending => None,
                    };
                }
            }
        }
    }

    fn apply_effects(&mut self, effects: Vec<GridEffect>) {
        for effect in effects {
            match effect {
                GridEffect::EditStarted(key) => self.autosaver.mark_editing(key),
                GridEffect::Normalized(key) => self.autosaver.mark_normalized(key),
                GridEffect::Save { key, request } => {
                    self.autosaver.submit(key, request);
                }
                GridEffect::FocusMoved(field) => self.pending_focus = Some(field),
            }
        }
    }

    fn save_whole_month(&mut self) {
        if let Some(grid) = &self.grid {
            let request = grid.bulk_request();
            self.autosaver.submit_bulk(request);
        }
    }

    fn export(&mut self) {
        let Some(grid) = &self.grid else { return };
        self.status_message = match export::export_month(grid, None) {
            Ok(path) => Some((format!("Exported to {}", path.display()), false)),
            Err(e) => Some((format!("Export failed: {:#}", e), true)),
        };
    }

    fn open_settings(&mut self) {
        self.settings_url = self.config.store_url.clone();
        self.settings_token = String::new();
        self.settings_font_scale = self.config.font_scale;
        self.settings_markers = self.config.off_markers.join(", ");
        self.settings_off_display = self.config.off_display.clone();
        self.show_settings = true;
    }

    fn save_settings(&mut self) {
        let connection_changed =
            self.config.store_url != self.settings_url.trim() || !self.settings_token.is_empty();

        self.config.store_url = self.settings_url.trim().to_string();
        self.config.font_scale = self.settings_font_scale;
        self.config.off_markers = self
            .settings_markers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.config.off_display = self.settings_off_display.trim().to_string();
        if !self.settings_token.is_empty() {
            self.config.session_token = Some(self.settings_token.clone());
        }

        match self.config.save() {
            Ok(_) => {
                self.show_settings = false;
                if connection_changed {
                    let (store, demo, status) = Self::connect(&self.config, self.month);
                    self.store = store;
                    self.demo = demo;
                    self.status_message = status;
                }
                self.autosaver = Autosaver::new(
                    Arc::clone(&self.store),
                    self.runtime.handle().clone(),
                    self.config.autosave_settings(),
                );
                // Markers may have changed; rebuild from the store
                self.load_month(self.month);
            }
            Err(e) => {
                self.status_message = Some((format!("Failed to save: {:#}", e), true));
            }
        }
    }

    fn render_header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let (button_bg, button_text) = super::theme::button_colors();

            egui::Frame::none()
                .fill(button_bg)
                .rounding(egui::Rounding::same(12.0))
                .inner_margin(egui::Margin::symmetric(8.0, 4.0))
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        let left = ui.add(egui::Label::new(
                            RichText::new(egui_phosphor::regular::CARET_LEFT).size(14.0).color(button_text)
                        ).sense(egui::Sense::click()));
                        if left.hovered() {
                            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
                        }
                        if left.clicked() {
                            self.load_month(self.month.prev());
                        }

                        ui.add_space(4.0);
                        let title = self.month.first_day().format("%B %Y").to_string();
                        ui.allocate_ui_with_layout(
                            egui::vec2(110.0, 14.0),
                            egui::Layout::centered_and_justified(egui::Direction::LeftToRight),
                            |ui| {
                                ui.label(RichText::new(&title).size(14.0).color(button_text));
                            },
                        );
                        ui.add_space(4.0);

                        let right = ui.add(egui::Label::new(
                            RichText::new(egui_phosphor::regular::CARET_RIGHT).size(14.0).color(button_text)
                        ).sense(egui::Sense::click()));
                        if right.hovered() {
                            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
                        }
                        if right.clicked() {
                            self.load_month(self.month.next());
                        }
                    });
                });

            if self.demo {
                ui.add_space(12.0);
                ui.label(RichText::new("DEMO").size(12.0).color(Color32::from_rgb(229, 192, 123)));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let text_color = Color32::from_rgb(150, 150, 150);
                let hover_color = Color32::WHITE;
                let font_id = egui::FontId::proportional(18.0);

                let icon_button = |ui: &mut egui::Ui, icon: &str, hint: &str| -> bool {
                    let size = ui.fonts(|f| f.layout_no_wrap(icon.to_string(), font_id.clone(), Color32::WHITE).size());
                    let (rect, response) = ui.allocate_exact_size(size + egui::vec2(8.0, 4.0), egui::Sense::click());
                    let color = if response.hovered() { hover_color } else { text_color };
                    ui.painter().text(rect.center(), egui::Align2::CENTER_CENTER, icon, font_id.clone(), color);
                    ui.add_space(12.0);
                    response.on_hover_text(hint).clicked()
                };

                if icon_button(ui, egui_phosphor::regular::FADERS_HORIZONTAL, "Settings") {
                    self.open_settings();
                }
                if icon_button(ui, egui_phosphor::regular::CLOUD_ARROW_DOWN, "Reload month") {
                    self.load_month(self.month);
                }
                if icon_button(ui, egui_phosphor::regular::BRACKETS_CURLY, "Export totals to JSON") {
                    self.export();
                }

                let can_bulk = self.grid.as_ref().map(|g| g.rows().iter().any(|r| r.editable)).unwrap_or(false)
                    && *self.autosaver.bulk_state() != BulkState::Pending;
                let save = ui.add_enabled(
                    can_bulk,
                    egui::Button::new(format!("{} Save month", egui_phosphor::regular::FLOPPY_DISK)),
                );
                if save.clicked() {
                    self.save_whole_month();
                }
            });
        });
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        let section_color = Color32::from_rgb(140, 140, 160);

        ui.label(RichText::new("Store").color(section_color).strong());
        ui.add_space(8.0);

        egui::Grid::new("store_grid")
            .num_columns(2)
            .spacing([20.0, 10.0])
            .show(ui, |ui| {
                ui.label("Server");
                ui.add(egui::TextEdit::singleline(&mut self.settings_url)
                    .hint_text("Empty runs the demo")
                    .desired_width(350.0));
                ui.end_row();

                ui.label("Session token");
                ui.add(
                    egui::TextEdit::singleline(&mut self.settings_token)
                        .password(true)
                        .hint_text("Leave blank to keep existing")
                        .desired_width(350.0),
                );
                ui.end_row();
            });

        ui.add_space(20.0);

        ui.label(RichText::new("Schedule").color(section_color).strong());
        ui.add_space(8.0);

        egui::Grid::new("schedule_settings_grid")
            .num_columns(2)
            .spacing([20.0, 10.0])
            .show(ui, |ui| {
                ui.label("Day-off markers");
                ui.add(egui::TextEdit::singleline(&mut self.settings_markers)
                    .hint_text("OFF, B, V, ...")
                    .desired_width(350.0));
                ui.end_row();

                ui.label("Day-off text");
                ui.add(egui::TextEdit::singleline(&mut self.settings_off_display).desired_width(120.0));
                ui.end_row();

                ui.label("Font scale");
                ui.horizontal(|ui| {
                    ui.add(egui::Slider::new(&mut self.settings_font_scale, 0.75..=2.0).show_value(false));
                    ui.label(format!("{:.0}%", self.settings_font_scale * 100.0));
                });
                ui.end_row();
            });

        ui.add_space(24.0);

        ui.horizontal(|ui| {
            if ui.button("Save").clicked() {
                self.save_settings();
            }
            if ui.button("Cancel").clicked() {
                self.show_settings = false;
            }
        });
    }
}

impl eframe::App for ShiftGridApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        // Pinch-to-zoom or Ctrl+scroll
        let zoom_delta = ctx.input(|i| i.zoom_delta());
        if zoom_delta != 1.0 {
            self.config.font_scale = (self.config.font_scale * zoom_delta).clamp(0.75, 2.5);
            if (zoom_delta - 1.0).abs() > 0.01 {
                if let Err(e) = self.config.save() {
                    warn!("failed to save font scale: {:#}", e);
                }
            }
        }
        ctx.set_pixels_per_point(self.config.font_scale);

        self.check_async_results();
        self.apply_acknowledgments(now);

        if self.show_settings {
            let (content_bg, frame_color) = super::theme::dialog_colors();
            let dialog_frame = egui::Frame::none()
                .fill(content_bg)
                .stroke(egui::Stroke::new(2.0, frame_color))
                .rounding(egui::Rounding::same(8.0))
                .inner_margin(egui::Margin::same(20.0));

            egui::Window::new("Settings")
                .collapsible(false)
                .resizable(false)
                .default_width(560.0)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .frame(dialog_frame)
                .show(ctx, |ui| {
                    self.render_settings(ui);
                });
        }

        egui::CentralPanel::default().frame(
            egui::Frame::none().inner_margin(egui::Margin::symmetric(12.0, 8.0))
        ).show(ctx, |ui| {
            self.render_header(ui);
            ui.add_space(8.0);

            let mut dismiss_message = false;
            if let Some((msg, is_error)) = &self.status_message {
                let color = if *is_error {
                    Color32::from_rgb(224, 108, 117)
                } else {
                    Color32::from_rgb(152, 195, 121)
                };
                ui.horizontal(|ui| {
                    ui.add(egui::Label::new(RichText::new(msg).color(color)));
                    ui.add_space(8.0);
                    let close = ui.add(egui::Label::new(
                        RichText::new(egui_phosphor::regular::X).size(14.0).color(Color32::from_rgb(120, 120, 130))
                    ).sense(egui::Sense::click()));
                    if close.clicked() {
                        dismiss_message = true;
                    }
                });
                ui.add_space(8.0);
            }
            if dismiss_message {
                self.status_message = None;
            }

            if self.loading {
                ui.add_space(40.0);
                ui.vertical_centered(|ui| {
                    ui.spinner();
                });
                return;
            }
            if self.load_failed {
                if views::render_offline(ui) {
                    self.load_month(self.month);
                }
                return;
            }

            let Some(grid) = &self.grid else { return };
            if grid.rows().is_empty() {
                views::render_empty(ui);
                return;
            }

            let events = views::render_grid(ui, grid, &self.autosaver, now, self.pending_focus.take());
            for event in events {
                if let Some(grid) = self.grid.as_mut() {
                    let effects = grid.handle(event);
                    self.apply_effects(effects);
                }
            }
        });

        // Keep repainting while highlights fade or replies are due
        if self.loading || self.pending_focus.is_some() {
            ctx.request_repaint();
        } else if self.autosaver.is_busy(now) {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}
