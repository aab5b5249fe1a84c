//! Reusable UI components.

mod qr_code;
mod status;
mod title;
mod toast;

pub use qr_code::QrCodeView;
pub use status::StatusView;
pub use title::Title;
pub use toast::ToastView;
