//! Title/branding component.

use gpui::*;

use crate::ui::Theme;

/// The application title with a one-line description and version.
pub struct Title;

impl Title {
    pub fn new() -> Self {
        Self
    }

    pub fn render<V: 'static>(&self, cx: &Context<V>) -> impl IntoElement {
        let theme = cx.global::<Theme>();

        div()
            .flex()
            .flex_col()
            .items_center()
            .gap_1()
            .child(
                div()
                    .font_weight(FontWeight::EXTRA_BOLD)
                    .text_size(px(20.0))
                    .text_color(theme.foreground)
                    .child("ADBee"),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(theme.muted)
                    .child(format!(
                        "Wireless debugging pairing · v{}",
                        env!("CARGO_PKG_VERSION")
                    )),
            )
    }
}

impl Default for Title {
    fn default() -> Self {
        Self::new()
    }
}
