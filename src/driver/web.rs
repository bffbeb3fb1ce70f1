//! [`PageActions`] over a Playwright browser page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use playwright::api::{Browser, BrowserContext, Page, Viewport};
use playwright::Playwright;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::PageActions;
use crate::utils::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    /// Map a configured browser name; unknown names use Chromium
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "firefox" => BrowserType::Firefox,
            "webkit" | "safari" => BrowserType::Webkit,
            _ => BrowserType::Chromium,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebPageConfig {
    pub browser_type: BrowserType,
    pub headless: bool,
    pub base_url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub default_timeout_ms: u64,
}

impl WebPageConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser_type: BrowserType::from_name(&config.browser),
            headless: config.headless,
            base_url: config.base_url.clone(),
            viewport_width: 1280,
            viewport_height: 720,
            default_timeout_ms: config.timeouts.default_ms,
        }
    }
}

pub struct PlaywrightPage {
    #[allow(dead_code)]
    playwright: Arc<Playwright>,
    browser: Arc<Browser>,
    #[allow(dead_code)]
    context: Arc<BrowserContext>,
    page: Arc<Mutex<Page>>,
    config: WebPageConfig,
}

impl PlaywrightPage {
    pub async fn launch(config: WebPageConfig) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let browser_type = match config.browser_type {
            BrowserType::Chromium => playwright.chromium(),
            BrowserType::Firefox => playwright.firefox(),
            BrowserType::Webkit => playwright.webkit(),
        };
        println!(
            "{} Launching {:?} (headless: {})",
            "🌐".blue(),
            config.browser_type,
            config.headless
        );
        let browser = browser_type
            .launcher()
            .headless(config.headless)
            .launch()
            .await
            .context("Failed to launch browser")?;

        let context = browser.context_builder().build().await?;
        let page = context.new_page().await?;
        page.set_viewport_size(Viewport {
            width: config.viewport_width as i32,
            height: config.viewport_height as i32,
        })
        .await?;

        Ok(Self {
            playwright: Arc::new(playwright),
            browser: Arc::new(browser),
            context: Arc::new(context),
            page: Arc::new(Mutex::new(page)),
            config,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }

    fn full_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl PageActions for PlaywrightPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        let full_url = self.full_url(url);
        page.goto_builder(&full_url)
            .goto()
            .await
            .with_context(|| format!("Failed to navigate to {}", full_url))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.click_builder(selector)
            .click()
            .await
            .with_context(|| format!("Failed to click {}", selector))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let page = self.page.lock().await;
        match page.query_selector(selector).await? {
            Some(el) => {
                el.fill_builder(text).fill().await?;
                Ok(())
            }
            None => anyhow::bail!("Element not found: {}", selector),
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let page = self.page.lock().await;
        let js = r#"(el, wanted) => {
            const option = Array.from(el.options).find(o => o.value === wanted || o.text.trim() === wanted);
            if (!option) return '';
            el.value = option.value;
            el.dispatchEvent(new Event('change', { bubbles: true }));
            return option.value;
        }"#;
        let selected = page
            .evaluate_on_selector::<String, String>(selector, js, Some(value.to_string()))
            .await?;
        if selected.is_empty() {
            anyhow::bail!("Option '{}' not found in {}", value, selector);
        }
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let page = self.page.lock().await;
        match page.query_selector(selector).await? {
            Some(el) => Ok(el.is_visible().await?),
            None => Ok(false),
        }
    }

    async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<bool> {
        let page = self.page.lock().await;
        let result = page
            .wait_for_selector_builder(selector)
            .timeout(timeout_ms as f64)
            .wait_for_selector()
            .await;
        Ok(result.is_ok())
    }

    async fn text_content(&self, selector: &str) -> Result<String> {
        let page = self.page.lock().await;
        let js = "el => el.value || el.innerText || el.textContent || ''";
        match page
            .evaluate_on_selector::<String, String>(selector, js, None)
            .await
        {
            Ok(text) => Ok(text),
            Err(_) => Ok(String::new()),
        }
    }

    async fn title(&self) -> Result<String> {
        let page = self.page.lock().await;
        let title: String = page.evaluate::<(), String>("() => document.title", ()).await?;
        Ok(title)
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.page.lock().await;
        let url: String = page
            .evaluate::<(), String>("() => window.location.href", ())
            .await?;
        Ok(url)
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.keyboard.down(key).await?;
        page.keyboard.up(key).await?;
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        let page = self.page.lock().await;
        page.set_viewport_size(Viewport {
            width: width as i32,
            height: height as i32,
        })
        .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let page = self.page.lock().await;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        page.screenshot_builder()
            .path(path.to_path_buf())
            .screenshot()
            .await?;
        Ok(())
    }
}
