#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use eframe::egui;
use tracing_subscriber::EnvFilter;

use shiftgrid::ui;

fn init_logging() {
    // RUST_LOG overrides, e.g. RUST_LOG=shiftgrid=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> eframe::Result<()> {
    init_logging();

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1400.0, 800.0])
        .with_min_inner_size([900.0, 500.0])
        .with_title("Shift Grid");

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Shift Grid",
        options,
        Box::new(|cc| Ok(Box::new(ui::ShiftGridApp::new(cc)?))),
    )
}
