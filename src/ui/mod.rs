mod app;
pub mod theme;
mod views;

pub use app::ShiftGridApp;
pub use theme::{setup_fonts, setup_theme};
