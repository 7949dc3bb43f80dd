//! Environment-driven configuration

use std::path::PathBuf;

/// Default OpenAI-compatible endpoint (the storefront assistant was built
/// against OpenRouter's gateway).
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "qwen/qwen2.5-vl-32b-instruct:free";
const DEFAULT_PORT: u16 = 7861;

/// Runtime configuration, collected once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the HTTP boundary
    pub port: u16,
    /// API key for the reasoner provider; absent keys surface as reasoner
    /// errors at call time rather than refusing to start
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint
    pub base_url: String,
    /// Model identifier passed to the provider
    pub model: String,
    /// Where the search tool persists product records
    pub results_path: PathBuf,
    /// Optional storefront credential file (JSON array of cookie objects)
    pub cookies_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("SHOPGRAPH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let api_key = std::env::var("SHOPGRAPH_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        let base_url = std::env::var("SHOPGRAPH_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model =
            std::env::var("SHOPGRAPH_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let results_path = std::env::var("SHOPGRAPH_RESULTS_PATH")
            .map_or_else(|_| PathBuf::from("product_details.json"), PathBuf::from);

        let cookies_path = std::env::var("SHOPGRAPH_COOKIES_PATH")
            .map_or_else(|_| PathBuf::from("storefront_cookies.json"), PathBuf::from);

        Self {
            port,
            api_key,
            base_url,
            model,
            results_path,
            cookies_path,
        }
    }
}
