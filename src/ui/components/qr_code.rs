//! The QR code component - paints the pairing payload module by module.

use gpui::*;

use crate::app::AppState;
use crate::ui::Theme;

/// A GPUI view showing the QR code of the current pairing attempt.
pub struct QrCodeView {
    /// Edge length the code is scaled towards.
    target_px: u32,
}

impl QrCodeView {
    pub fn new(target_px: u32, _cx: &mut Context<Self>) -> Self {
        Self { target_px }
    }
}

impl Render for QrCodeView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.global::<Theme>();
        let app_state = cx.global::<AppState>();
        let target = px(self.target_px as f32);

        let Some(qr) = app_state.pairing().and_then(|p| p.qr) else {
            // Nothing to scan yet (or encoding failed); keep the layout stable.
            return div()
                .id("qr-placeholder")
                .size(target)
                .flex()
                .items_center()
                .justify_center()
                .rounded_md()
                .bg(theme.surface)
                .text_sm()
                .text_color(theme.muted)
                .child("No QR code");
        };

        let module = px(qr.module_px(self.target_px) as f32);
        let dark = theme.foreground;
        // Quiet zone must stay white regardless of theme.
        let light = hsla(0.0, 0.0, 1.0, 1.0);

        div()
            .id("qr-code")
            .flex()
            .flex_col()
            .bg(light)
            .rounded_md()
            .overflow_hidden()
            .children(qr.rows().map(|row| {
                div().flex().flex_row().children(row.iter().map(|&is_dark| {
                    div()
                        .size(module)
                        .bg(if is_dark { dark } else { light })
                }))
            }))
    }
}
