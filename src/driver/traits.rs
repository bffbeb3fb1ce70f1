use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Browser page capability used by page objects and step definitions.
///
/// Selectors are Playwright selector strings (CSS, `text=`, `xpath=`).
#[async_trait]
pub trait PageActions: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the field and type `text`
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Select a `<select>` option by value or visible label
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// `false` when no element matches
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Wait up to `timeout_ms` for the selector to become visible
    async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<bool>;

    async fn text_content(&self, selector: &str) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    async fn press_key(&self, key: &str) -> Result<()>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;
}
