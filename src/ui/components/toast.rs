//! Toast overlay - transient notifications at the bottom of the window.

use gpui::prelude::FluentBuilder;
use gpui::*;

use crate::app::AppState;
use crate::ui::Theme;

/// A GPUI view that shows the current toast, if any.
pub struct ToastView;

impl ToastView {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self
    }
}

impl Render for ToastView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.global::<Theme>();
        let toast = cx.global::<AppState>().active_toast();

        div()
            .id("toast-overlay")
            .absolute()
            .bottom(px(16.0))
            .left_0()
            .right_0()
            .flex()
            .justify_center()
            .when_some(toast, |this, toast| {
                this.child(
                    div()
                        .px_4()
                        .py_2()
                        .rounded_md()
                        .bg(theme.foreground.opacity(0.85))
                        .text_sm()
                        .text_color(theme.background)
                        .child(toast.message.to_string()),
                )
            })
    }
}
