//! Browser driving: the driver seam, selector handling and the Chrome backend.

mod chrome;
mod driver;
mod screenshot;
mod selectors;

pub use chrome::{ChromeDriver, ChromeOptions, DEFAULT_ACTION_TIMEOUT, DEFAULT_NAVIGATION_TIMEOUT};
pub use driver::{
    BrowserDriver, DriverError, NavigationInfo, ScrollDirection, WaitState, WaitUntil,
};
pub use screenshot::{save_png, screenshot_filename, DEFAULT_SCREENSHOT_DIR};
pub use selectors::{description_candidates, xpath_literal, Selector};
