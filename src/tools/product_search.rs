//! Storefront product search via browser automation
//!
//! Drives a headless Chrome session through the storefront's search flow and
//! scrapes the first result items. Failures never surface as tool errors:
//! they travel inside the raw output as the single-element error-marker
//! array, so the conversation can explain the problem to the customer.

use super::{Tool, ToolOutput};
use crate::products::{self, ProductRecord};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const STOREFRONT_URL: &str = "https://www.jd.com";
const SEARCH_BOX: &str = "#key";
const SEARCH_BUTTON: &str = ".button";
const RESULT_ITEM: &str = ".gl-item";
const ITEM_TITLE: &str = ".p-name a";
const ITEM_PRICE: &str = ".p-price strong i";
const ITEM_IMAGE: &str = ".p-img img";

/// Result items scraped per search
const SCRAPE_LIMIT: usize = 3;

const NAV_TIMEOUT: Duration = Duration::from_secs(30);
const RESULTS_TIMEOUT: Duration = Duration::from_secs(15);
const ELEMENT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
enum SearchError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Browser operation failed: {0}")]
    Operation(String),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<chromiumoxide::error::CdpError> for SearchError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        SearchError::Operation(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    keyword: String,
}

/// Storefront search tool
pub struct ProductSearchTool {
    results_path: PathBuf,
    cookies_path: PathBuf,
}

impl ProductSearchTool {
    pub fn new(results_path: PathBuf, cookies_path: PathBuf) -> Self {
        Self {
            results_path,
            cookies_path,
        }
    }

    async fn search(&self, keyword: &str) -> Result<Vec<ProductRecord>, SearchError> {
        let user_data_dir = format!("/tmp/shopgraph-chrome-{}", uuid::Uuid::new_v4());
        let config = BrowserConfig::builder()
            .new_headless_mode()
            .no_sandbox()
            .arg("--disable-gpu")
            .user_data_dir(&user_data_dir)
            .build()
            .map_err(SearchError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SearchError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("CDP handler error: {e}");
                }
            }
        });

        let result = self.run_search_flow(&browser, keyword).await;

        let _ = browser.close().await;
        handler_task.abort();
        let _ = std::fs::remove_dir_all(&user_data_dir);

        result
    }

    async fn run_search_flow(
        &self,
        browser: &Browser,
        keyword: &str,
    ) -> Result<Vec<ProductRecord>, SearchError> {
        let page = browser.new_page("about:blank").await?;

        self.apply_cookies(&page).await;

        tokio::time::timeout(NAV_TIMEOUT, page.goto(STOREFRONT_URL))
            .await
            .map_err(|_| SearchError::Timeout("storefront home page"))??;

        let search_box = wait_for_element(&page, SEARCH_BOX, RESULTS_TIMEOUT).await?;
        search_box.click().await?;
        search_box.type_str(keyword).await?;

        let button = wait_for_element(&page, SEARCH_BUTTON, RESULTS_TIMEOUT).await?;
        button.click().await?;

        wait_for_element(&page, RESULT_ITEM, RESULTS_TIMEOUT).await?;
        let items = page.find_elements(RESULT_ITEM).await?;
        tracing::info!(keyword, found = items.len(), "Search results loaded");

        let mut records = Vec::new();
        for (index, item) in items.iter().take(SCRAPE_LIMIT).enumerate() {
            // Small jittered pause between items; result tiles hydrate lazily.
            let jitter = {
                use rand::Rng;
                rand::thread_rng().gen_range(300..1200)
            };
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            match scrape_item(item).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping result item");
                }
            }
        }

        Ok(records)
    }

    /// Load the opaque credential file into the page, if present. Entries
    /// that do not convert to cookie parameters are skipped.
    async fn apply_cookies(&self, page: &Page) {
        if !self.cookies_path.exists() {
            return;
        }
        let raw = match products::load_cookies(&self.cookies_path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cookie file");
                return;
            }
        };

        let cookies: Vec<CookieParam> = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();

        if cookies.is_empty() {
            return;
        }
        let count = cookies.len();
        if let Err(e) = page.set_cookies(cookies).await {
            tracing::warn!(error = %e, "Could not apply cookies");
        } else {
            tracing::info!(count, "Applied storefront cookies");
        }
    }
}

#[async_trait]
impl Tool for ProductSearchTool {
    fn name(&self) -> &str {
        "product_search"
    }

    fn description(&self) -> String {
        "Search the storefront for products matching a keyword. Returns a JSON \
         array of product records (title, price, image URL, purchase link) and \
         saves the same records to the results file for later reads."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["keyword"],
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "Search keyword distilled from the customer's question"
                }
            }
        })
    }

    async fn run(&self, args: &Map<String, Value>, cancel: CancellationToken) -> ToolOutput {
        let input: SearchInput = match serde_json::from_value(Value::Object(args.clone())) {
            Ok(input) => input,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let keyword = input.keyword.trim();
        if keyword.is_empty() {
            return ToolOutput::error("Search keyword must not be empty");
        }

        tracing::info!(keyword, "Running storefront search");
        let records = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                vec![ProductRecord::error(format!("search for '{keyword}' was cancelled"))]
            }
            result = self.search(keyword) => match result {
                Ok(records) if records.is_empty() => {
                    vec![ProductRecord::error(format!("no products found for '{keyword}'"))]
                }
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(keyword, error = %e, "Search failed");
                    vec![ProductRecord::error(format!(
                        "search for '{keyword}' failed: {e}"
                    ))]
                }
            },
        };

        if let Err(e) = products::save_results(&self.results_path, &records) {
            tracing::warn!(error = %e, "Could not persist search results");
        }

        match serde_json::to_string(&records) {
            Ok(raw) => ToolOutput::success(raw),
            Err(e) => ToolOutput::error(format!("Could not serialize results: {e}")),
        }
    }
}

/// Poll for a selector until it appears or the budget runs out
async fn wait_for_element(
    page: &Page,
    selector: &'static str,
    budget: Duration,
) -> Result<Element, SearchError> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SearchError::Timeout(selector));
        }
        tokio::time::sleep(ELEMENT_POLL).await;
    }
}

async fn scrape_item(item: &Element) -> Result<ProductRecord, SearchError> {
    let title_element = item.find_element(ITEM_TITLE).await?;
    let title = title_element
        .inner_text()
        .await?
        .unwrap_or_else(|| "untitled".to_string());
    let purchase_link = absolutize(title_element.attribute("href").await?.unwrap_or_default());

    let price = match item.find_element(ITEM_PRICE).await {
        Ok(element) => element.inner_text().await?.unwrap_or_default(),
        Err(_) => String::new(),
    };

    let image_url = match item.find_element(ITEM_IMAGE).await {
        Ok(element) => absolutize(element.attribute("src").await?.unwrap_or_default()),
        Err(_) => String::new(),
    };

    Ok(ProductRecord {
        title: title.trim().to_string(),
        price: price.trim().to_string(),
        image_url,
        purchase_link,
        image_text: String::new(),
    })
}

/// Storefront markup uses protocol-relative URLs
fn absolutize(url: String) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.trim().to_string()
    }
}
