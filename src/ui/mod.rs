//! UI components and views.

pub mod components;
mod root;
mod theme;

pub use root::RootView;
pub use theme::Theme;
