//! Root view - the main application window content.

use std::time::Duration;

use gpui::*;

use crate::app::AppState;
use crate::ui::Theme;
use crate::ui::components::{QrCodeView, StatusView, Title, ToastView};

/// How often the view checks the shared state for changes.
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// The root view containing the entire application UI.
pub struct RootView {
    title: Title,
    qr_code: Entity<QrCodeView>,
    status: Entity<StatusView>,
    toast: Entity<ToastView>,
    /// Last `AppState` revision that was rendered.
    rendered_revision: u64,
    /// Whether a toast was visible at the last render.
    toast_visible: bool,
}

impl RootView {
    pub fn new(qr_size_px: u32, cx: &mut Context<Self>) -> Self {
        let qr_code = cx.new(|cx| QrCodeView::new(qr_size_px, cx));
        let status = cx.new(StatusView::new);
        let toast = cx.new(ToastView::new);

        // The networking thread mutates `AppState` directly; poll its
        // revision and re-render only when something changed.
        cx.spawn(async move |this, cx| {
            loop {
                cx.background_executor().timer(REFRESH_INTERVAL).await;
                if this.update(cx, |this, cx| this.refresh(cx)).is_err() {
                    break; // View released
                }
            }
        })
        .detach();

        Self {
            title: Title::new(),
            qr_code,
            status,
            toast,
            rendered_revision: 0,
            toast_visible: false,
        }
    }

    fn refresh(&mut self, cx: &mut Context<Self>) {
        let app_state = cx.global::<AppState>();
        let revision = app_state.revision();
        let toast_visible = app_state.active_toast().is_some();

        if revision != self.rendered_revision || toast_visible != self.toast_visible {
            self.rendered_revision = revision;
            self.toast_visible = toast_visible;
            cx.notify();
        }
    }
}

impl Render for RootView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.global::<Theme>();

        div()
            .id("root")
            .size_full()
            .bg(theme.background)
            .relative()
            .flex()
            .flex_col()
            .items_center()
            .justify_center()
            .gap_4()
            .p_4()
            .child(self.title.render(cx))
            .child(self.qr_code.clone())
            .child(self.status.clone())
            .child(self.toast.clone())
    }
}
