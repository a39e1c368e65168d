pub mod chromium;
pub mod cookies;
pub mod locator;
pub mod manager;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

pub use chromium::ChromiumSession;
pub use cookies::load_cookies;
pub use locator::{KeyChord, Locator, WaitCondition, WindowHandle};
pub use manager::BrowserManager;
pub use session::BrowserSession;
