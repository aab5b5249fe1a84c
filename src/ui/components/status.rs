//! Status panel - service name, pairing code, status line and the
//! "new code" button.

use gpui::prelude::FluentBuilder;
use gpui::*;
use tracing::info;

use crate::app::{AppState, PairingStatus};
use crate::ui::Theme;

/// A GPUI view for the pairing details and status.
pub struct StatusView;

impl StatusView {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self
    }

    fn detail_row(label: &'static str, value: String, theme: &Theme) -> impl IntoElement {
        div()
            .flex()
            .flex_row()
            .justify_between()
            .w_full()
            .child(div().text_sm().text_color(theme.muted).child(label))
            .child(
                div()
                    .text_sm()
                    .font_weight(FontWeight::SEMIBOLD)
                    .text_color(theme.foreground)
                    .child(value),
            )
    }
}

impl Render for StatusView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.global::<Theme>();
        let app_state = cx.global::<AppState>();
        let status = app_state.status();
        let pairing = app_state.pairing();

        let (service_name, code) = pairing
            .map(|p| {
                (
                    p.credentials.service_name().to_string(),
                    p.credentials.code(),
                )
            })
            .unwrap_or_else(|| ("—".to_string(), "—".to_string()));

        let status_color = match &status {
            PairingStatus::Paired | PairingStatus::Connected => theme.success,
            PairingStatus::Error(_) => theme.error,
            _ => theme.muted,
        };

        div()
            .id("status-panel")
            .flex()
            .flex_col()
            .items_center()
            .gap_2()
            .w(px(280.0))
            .child(Self::detail_row("Service", service_name, theme))
            .child(Self::detail_row("Code", code, theme))
            .child(
                div()
                    .pt_2()
                    .text_sm()
                    .text_color(status_color)
                    .when(status.is_success(), |this| {
                        this.font_weight(FontWeight::SEMIBOLD)
                    })
                    .child(status.label()),
            )
            .child(
                div()
                    .id("new-code-button")
                    .mt_2()
                    .px_4()
                    .py_2()
                    .rounded_md()
                    .bg(theme.surface)
                    .hover(|style| style.bg(theme.foreground.opacity(0.15)))
                    .cursor_pointer()
                    .text_sm()
                    .font_weight(FontWeight::MEDIUM)
                    .text_color(theme.foreground)
                    .child("New code")
                    .on_click(cx.listener(|_this, _: &ClickEvent, _window, cx| {
                        info!("New pairing code requested");
                        cx.global::<AppState>().request_new_pairing();
                    })),
            )
    }
}
