pub mod common;
pub mod locators;
pub mod traits;
pub mod web;

pub use traits::PageActions;
pub use web::{PlaywrightPage, WebPageConfig};
