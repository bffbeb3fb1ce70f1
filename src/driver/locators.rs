//! Named page locators and the selector fallback chains used when a step
//! refers to an element by a loose name.

use log::debug;

use super::common::{wait_until, PollConfig};
use super::traits::PageActions;

/// Element name to selector, per page
pub type PageLocators = &'static [(&'static str, &'static str)];

pub const LOGIN_PAGE: PageLocators = &[
    ("loginForm", r#"form[data-testid="login-form"]"#),
    ("emailInput", r#"input[name="email"]"#),
    ("passwordInput", r#"input[name="password"]"#),
    ("submitButton", r#"button[type="submit"]"#),
    ("errorMessage", ".error-message"),
    ("successMessage", ".success-message"),
    ("forgotPasswordLink", r#"a[href*="forgot-password"]"#),
    ("signUpLink", r#"a[href*="signup"]"#),
];

pub const COMMON_ELEMENTS: PageLocators = &[
    ("loadingSpinner", ".loading-spinner"),
    ("modal", ".modal"),
    ("closeButton", r#"[data-testid="close-button"]"#),
    ("confirmButton", r#"[data-testid="confirm-button"]"#),
    ("cancelButton", r#"[data-testid="cancel-button"]"#),
    ("notification", ".notification"),
    ("alertMessage", ".alert"),
    ("breadcrumb", ".breadcrumb"),
    ("dashboard", r#"[data-testid="dashboard"]"#),
    ("backButton", r#"[data-testid="back-button"]"#),
    ("saveButton", r#"[data-testid="save-button"]"#),
    ("editButton", r#"[data-testid="edit-button"]"#),
    ("deleteButton", r#"[data-testid="delete-button"]"#),
];

pub const GOOGLE_HOME_PAGE: PageLocators = &[
    ("searchBox", r#"textarea[name="q"]"#),
    ("searchButton", r#"input[name="btnK"]"#),
    ("luckyButton", r#"input[name="btnI"]"#),
    ("suggestions", r#"[role="listbox"]"#),
    ("logo", r#"img[alt="Google"]"#),
    ("languageLinks", "#SIvCob a"),
    ("footerLinks", "#fbar a"),
];

pub const GOOGLE_SEARCH_PAGE: PageLocators = &[
    ("searchBox", r#"textarea[name="q"], input[name="q"]"#),
    (
        "searchButton",
        r#"input[value="Google Search"], button[aria-label="Google Search"]"#,
    ),
    ("searchResults", "#rso"),
    ("searchSuggestions", ".wM6W7d"),
    ("imagesTab", r#"a[href*="tbm=isch"]"#),
    ("newsTab", r#"a[href*="tbm=nws"]"#),
    ("videosTab", r#"a[href*="tbm=vid"]"#),
    ("shoppingTab", r#"a[href*="tbm=shop"]"#),
    ("imageResults", "#islrg"),
    ("newsResults", "#rso"),
    ("resultStats", "#result-stats"),
    ("noResultsMessage", ".med"),
    ("logo", r#"img[alt="Google"]"#),
    ("nextPageButton", "#pnnext"),
    ("previousPageButton", "#pnprev"),
];

pub const CREATE_ACCOUNT_PAGE: PageLocators = &[
    ("emailInput", r#"input[name="email"]"#),
    ("firstNameInput", r#"input[name="firstName"]"#),
    ("lastNameInput", r#"input[name="lastName"]"#),
    ("passwordInput", r#"input[name="password"]"#),
    ("confirmPasswordInput", r#"input[name="confirmPassword"]"#),
    ("countryDropdown", r#"select[name="country"]"#),
    ("submitButton", r#"button[type="submit"]"#),
    ("errorMessage", ".error-message"),
    ("successMessage", ".success-message"),
    ("dataEntryComplete", r#"[data-testid="data-complete"]"#),
    ("termsCheckbox", r#"input[name="terms"]"#),
    ("newsletterCheckbox", r#"input[name="newsletter"]"#),
];

const PAGES: &[(&str, PageLocators)] = &[
    ("LoginPage", LOGIN_PAGE),
    ("CommonElements", COMMON_ELEMENTS),
    ("GoogleHomePage", GOOGLE_HOME_PAGE),
    ("GoogleSearchPage", GOOGLE_SEARCH_PAGE),
    ("CreateAccountPage", CREATE_ACCOUNT_PAGE),
];

pub struct LocatorRegistry;

impl LocatorRegistry {
    pub fn page(name: &str) -> Option<PageLocators> {
        PAGES
            .iter()
            .find(|(page, _)| *page == name)
            .map(|(_, locators)| *locators)
    }

    /// Selector for `element`: the named page first, then any page in
    /// registration order
    pub fn resolve(page: &str, element: &str) -> Option<&'static str> {
        Self::page(page)
            .and_then(|locators| lookup(locators, element))
            .or_else(|| PAGES.iter().find_map(|(_, locators)| lookup(locators, element)))
    }
}

fn lookup(locators: PageLocators, element: &str) -> Option<&'static str> {
    locators
        .iter()
        .find(|(name, _)| *name == element)
        .map(|(_, selector)| *selector)
}

// Selector templates; `{}` is replaced with the element name.

pub const FILL_STRATEGIES: &[&str] = &[
    r#"[data-testid="{}"]"#,
    r#"[data-test="{}"]"#,
    r#"[name="{}"]"#,
    r#"[id="{}"]"#,
    "#{}",
    ".{}",
    r#"input[placeholder*="{}"]"#,
    r#"textarea[placeholder*="{}"]"#,
    r#"[aria-label="{}"]"#,
    r#"label:has-text("{}") + input"#,
    r#"label:has-text("{}") + textarea"#,
    r#"xpath=//label[contains(text(), "{}")]/following-sibling::input"#,
    r#"xpath=//label[contains(text(), "{}")]/following-sibling::textarea"#,
];

pub const CLICK_STRATEGIES: &[&str] = &[
    r#"[data-testid="{}"]"#,
    r#"[data-test="{}"]"#,
    r#"button:has-text("{}")"#,
    r#"[aria-label="{}"]"#,
    r#"[name="{}"]"#,
    r#"[id="{}"]"#,
    "#{}",
    ".{}",
    r#"input[type="submit"][value="{}"]"#,
    r#"input[type="button"][value="{}"]"#,
    r#"a:has-text("{}")"#,
    r#"xpath=//button[contains(text(), "{}")]"#,
    r#"xpath=//a[contains(text(), "{}")]"#,
    r#"xpath=//input[@type="submit" and @value="{}"]"#,
    r#"xpath=//span[contains(text(), "{}")]/parent::button"#,
    r#"xpath=//div[contains(text(), "{}") and contains(@class, "button")]"#,
];

pub const BUTTON_STRATEGIES: &[&str] = &[
    r#"button:has-text("{}")"#,
    r#"input[type="submit"][value="{}"]"#,
    r#"[data-testid="{}"]"#,
    r#"[aria-label="{}"]"#,
    r#"xpath=//button[contains(text(), "{}")]"#,
    r#"xpath=//input[@type="submit" and @value="{}"]"#,
];

pub const SELECT_STRATEGIES: &[&str] = &[
    r#"[data-testid="{}"]"#,
    r#"[data-test="{}"]"#,
    r#"[name="{}"]"#,
    r#"[id="{}"]"#,
    "#{}",
    r#"select[aria-label="{}"]"#,
    r#"xpath=//label[contains(text(), "{}")]/following-sibling::select"#,
];

pub const VISIBLE_STRATEGIES: &[&str] = &[
    r#"[data-testid="{}"]"#,
    r#"[data-test="{}"]"#,
    r#"[name="{}"]"#,
    r#"[id="{}"]"#,
    "#{}",
    ".{}",
    r#"[aria-label="{}"]"#,
];

pub const SEARCH_BOX_SELECTORS: &[&str] = &[
    r#"textarea[name="q"]"#,
    r#"input[name="q"]"#,
    r#"[data-testid="searchBox"]"#,
    "#searchBox",
    ".searchBox",
];

const SEARCH_RESULT_EXTRAS: &[&str] = &["#search", "#center_col", "[data-async-context]", ".g", ".MjjYud"];

/// Expand `templates` for one element name, in order
pub fn expand(templates: &[&str], name: &str) -> Vec<String> {
    templates.iter().map(|t| t.replace("{}", name)).collect()
}

/// The registered locator for `element` (if any) followed by `templates`
pub fn candidates(page: &str, element: &str, templates: &[&str]) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(selector) = LocatorRegistry::resolve(page, element) {
        candidates.push(selector.to_string());
    }
    candidates.extend(expand(templates, element));
    candidates
}

/// Visibility candidates, plus extra result containers for `searchResults`
pub fn visible_candidates(page: &str, element: &str) -> Vec<String> {
    let mut candidates = candidates(page, element, VISIBLE_STRATEGIES);
    if element == "searchResults" {
        candidates.extend(SEARCH_RESULT_EXTRAS.iter().map(|s| s.to_string()));
    }
    candidates
}

/// First candidate that becomes visible within `timeout_ms`. Candidates are
/// tried strictly in order; lookup errors count as not visible.
pub async fn first_visible(
    actions: &dyn PageActions,
    candidates: &[String],
    timeout_ms: u64,
) -> Option<String> {
    for selector in candidates {
        let visible = wait_until(
            move || async move { actions.is_visible(selector).await.unwrap_or(false) },
            PollConfig::with_timeout(timeout_ms),
        )
        .await;
        if visible {
            debug!("Matched selector {}", selector);
            return Some(selector.clone());
        }
    }
    None
}
