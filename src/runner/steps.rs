//! Generic UI step definitions shared by all feature files.

use anyhow::{bail, Result};
use colored::Colorize;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;

use crate::driver::locators::{
    candidates, expand, first_visible, visible_candidates, BUTTON_STRATEGIES, CLICK_STRATEGIES,
    FILL_STRATEGIES, SEARCH_BOX_SELECTORS, SELECT_STRATEGIES, VISIBLE_STRATEGIES,
};
use crate::driver::PageActions;
use crate::utils::Config;

const PAGE_PATHS: &[(&str, &str)] = &[
    ("home", "/"),
    ("login", "/login"),
    ("register", "/register"),
    ("dashboard", "/dashboard"),
    ("profile", "/profile"),
    ("settings", "/settings"),
    ("CreateAccountPage", "/register"),
    ("LoginPage", "/login"),
    ("HomePage", "/"),
    ("DashboardPage", "/dashboard"),
    ("GoogleHomePage", "/"),
    ("GoogleSearchPage", "/search"),
];

const PROBE_TIMEOUT_MS: u64 = 2000;
const VISIBLE_TIMEOUT_MS: u64 = 5000;
const MOBILE_VIEWPORT: (u32, u32) = (375, 667);

/// Path for a page name; unknown pages map to `/<lowercase name>`
pub fn page_path(page: &str) -> String {
    PAGE_PATHS
        .iter()
        .find(|(name, _)| *name == page)
        .map(|(_, path)| path.to_string())
        .unwrap_or_else(|| format!("/{}", page.to_lowercase()))
}

pub struct GenericSteps<'a> {
    page: &'a dyn PageActions,
    config: &'a Config,
    probe_timeout_ms: u64,
    visible_timeout_ms: u64,
}

impl<'a> GenericSteps<'a> {
    pub fn new(page: &'a dyn PageActions, config: &'a Config) -> Self {
        Self {
            page,
            config,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            visible_timeout_ms: VISIBLE_TIMEOUT_MS,
        }
    }

    /// Shorter per-selector waits, for fast failure
    pub fn with_probe_timeout(mut self, timeout_ms: u64) -> Self {
        self.probe_timeout_ms = timeout_ms;
        self.visible_timeout_ms = timeout_ms;
        self
    }

    /// Relative URLs are appended to the base URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let full_url = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.config.base_url, url)
        };
        self.page.navigate(&full_url).await?;
        println!("{} Navigated to: {}", "✓".green(), full_url);
        Ok(())
    }

    pub async fn navigate_to_page(&self, page_name: &str) -> Result<()> {
        let full_url = format!("{}{}", self.config.base_url, page_path(page_name));
        self.page.navigate(&full_url).await?;
        println!(
            "{} Navigated to \"{}\" page: {}",
            "✓".green(),
            page_name,
            full_url
        );
        Ok(())
    }

    /// Resolve a data source: generated values, then test data, then the
    /// literal text
    pub fn resolve_value(&self, source: &str) -> String {
        let now_ms = chrono::Utc::now().timestamp_millis();
        match source {
            "randomEmail" => format!("test{}@example.com", now_ms),
            "randomString" => {
                let suffix: String = rand::thread_rng()
                    .sample_iter(rand::distributions::Alphanumeric)
                    .take(6)
                    .map(|c| (c as char).to_ascii_lowercase())
                    .collect();
                format!("test_{}_{}", now_ms, suffix)
            }
            "currentTimestamp" => now_ms.to_string(),
            _ => self.lookup_or_literal(source),
        }
    }

    fn lookup_or_literal(&self, key: &str) -> String {
        self.config.lookup(key).unwrap_or_else(|| key.to_string())
    }

    pub async fn enter_value(&self, element: &str, page_name: &str, source: &str) -> Result<()> {
        let value = self.resolve_value(source);
        let selectors = candidates(page_name, element, FILL_STRATEGIES);
        let Some(selector) = first_visible(self.page, &selectors, self.probe_timeout_ms).await
        else {
            bail!(
                "Could not find element \"{}\" on \"{}\" page",
                element,
                page_name
            );
        };
        self.page.fill(&selector, &value).await?;
        println!(
            "{} Entered \"{}\" for \"{}\" on \"{}\" page (from: {})",
            "✓".green(),
            value,
            element,
            page_name,
            source
        );
        Ok(())
    }

    /// Type into an explicit selector; dotted text is read from test data
    pub async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let value = if text.contains('.') {
            self.lookup_or_literal(text)
        } else {
            text.to_string()
        };
        self.page.fill(selector, &value).await?;
        println!("{} Typed \"{}\" into element: {}", "✓".green(), value, selector);
        Ok(())
    }

    pub async fn click_element(&self, element: &str, page_name: &str) -> Result<()> {
        let selectors = candidates(page_name, element, CLICK_STRATEGIES);
        let Some(selector) = first_visible(self.page, &selectors, self.probe_timeout_ms).await
        else {
            bail!(
                "Could not find clickable element \"{}\" on \"{}\" page",
                element,
                page_name
            );
        };
        self.page.click(&selector).await?;
        println!(
            "{} Clicked \"{}\" on \"{}\" page",
            "✓".green(),
            element,
            page_name
        );
        Ok(())
    }

    pub async fn click_button(&self, text: &str, page_name: &str) -> Result<()> {
        let selectors = expand(BUTTON_STRATEGIES, text);
        let Some(selector) = first_visible(self.page, &selectors, 0).await else {
            bail!(
                "Could not find \"{}\" button on page \"{}\"",
                text,
                page_name
            );
        };
        self.page.click(&selector).await?;
        println!(
            "{} Clicked \"{}\" button on page \"{}\"",
            "✓".green(),
            text,
            page_name
        );
        Ok(())
    }

    pub async fn select_option(&self, option: &str, element: &str, page_name: &str) -> Result<()> {
        let selectors = candidates(page_name, element, SELECT_STRATEGIES);
        let Some(selector) = first_visible(self.page, &selectors, self.probe_timeout_ms).await
        else {
            bail!(
                "Could not find dropdown \"{}\" on \"{}\" page",
                element,
                page_name
            );
        };
        self.page.select_option(&selector, option).await?;
        println!(
            "{} Selected \"{}\" from \"{}\" dropdown on \"{}\" page",
            "✓".green(),
            option,
            element,
            page_name
        );
        Ok(())
    }

    pub async fn assert_visible(&self, element: &str, page_name: &str) -> Result<()> {
        let selectors = visible_candidates(page_name, element);
        if first_visible(self.page, &selectors, self.visible_timeout_ms)
            .await
            .is_none()
        {
            bail!(
                "Element \"{}\" is not visible on \"{}\" page",
                element,
                page_name
            );
        }
        println!(
            "{} Verified \"{}\" element is visible on \"{}\" page",
            "✓".green(),
            element,
            page_name
        );
        Ok(())
    }

    /// Single probe per strategy; any visible match fails
    pub async fn assert_not_visible(&self, element: &str, page_name: &str) -> Result<()> {
        let selectors = expand(VISIBLE_STRATEGIES, element);
        if let Some(selector) = first_visible(self.page, &selectors, 0).await {
            bail!(
                "Element \"{}\" is visible on \"{}\" page ({})",
                element,
                page_name,
                selector
            );
        }
        println!(
            "{} Verified \"{}\" element is not visible on \"{}\" page",
            "✓".green(),
            element,
            page_name
        );
        Ok(())
    }

    pub async fn wait_for_element(&self, element: &str, page_name: &str) -> Result<()> {
        let timeout = self.config.timeouts.default_ms;
        for selector in expand(VISIBLE_STRATEGIES, element) {
            if self.page.wait_for_visible(&selector, timeout).await.unwrap_or(false) {
                println!(
                    "{} Element \"{}\" appeared on \"{}\" page",
                    "✓".green(),
                    element,
                    page_name
                );
                return Ok(());
            }
        }
        bail!(
            "Element \"{}\" did not appear on \"{}\" page within {} seconds",
            element,
            page_name,
            timeout / 1000
        )
    }

    pub async fn assert_text_visible(&self, text: &str, page_name: &str) -> Result<()> {
        let expected = self.lookup_or_literal(text);
        if !self.page.is_visible(&format!("text={}", expected)).await? {
            bail!("Text \"{}\" is not visible on \"{}\" page", expected, page_name);
        }
        println!(
            "{} Verified text \"{}\" is visible on \"{}\" page",
            "✓".green(),
            expected,
            page_name
        );
        Ok(())
    }

    pub async fn assert_title_contains(&self, expected: &str) -> Result<()> {
        let title = self.page.title().await?;
        if !title.to_lowercase().contains(&expected.to_lowercase()) {
            bail!("Page title \"{}\" does not contain \"{}\"", title, expected);
        }
        println!("{} Page title contains: {}", "✓".green(), expected);
        Ok(())
    }

    /// Search term from `searchData.<term>`, a dotted test-data path, or the
    /// literal term
    pub fn resolve_search_term(&self, term: &str) -> String {
        match self.config.test_data.pointer(&format!("/searchData/{}", term)) {
            Some(Value::String(s)) => s.clone(),
            _ if term.contains('.') => self.lookup_or_literal(term),
            _ => term.to_string(),
        }
    }

    /// Fill the search box and, when `submit`, press Enter
    pub async fn search(&self, term: &str, page_name: &str, submit: bool) -> Result<()> {
        let value = self.resolve_search_term(term);
        let selectors: Vec<String> = SEARCH_BOX_SELECTORS.iter().map(|s| s.to_string()).collect();
        let Some(selector) = first_visible(self.page, &selectors, self.probe_timeout_ms).await
        else {
            bail!("Could not find search box on \"{}\" page", page_name);
        };
        self.page.fill(&selector, &value).await?;
        if submit {
            self.page.press_key("Enter").await?;
            println!(
                "{} Searched for \"{}\" on \"{}\" page",
                "✓".green(),
                value,
                page_name
            );
        } else {
            println!(
                "{} Started typing \"{}\" in search box on \"{}\" page",
                "✓".green(),
                value,
                page_name
            );
        }
        Ok(())
    }

    pub async fn press_enter(&self) -> Result<()> {
        self.page.press_key("Enter").await
    }

    pub async fn set_mobile_viewport(&self) -> Result<()> {
        let (width, height) = MOBILE_VIEWPORT;
        self.page.set_viewport(width, height).await
    }

    pub async fn wait_seconds(&self, seconds: u64) {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        println!("Waited for {} seconds", seconds);
    }
}
