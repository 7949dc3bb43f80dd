//! Product records and result rendering
//!
//! The storefront search tool emits a JSON array of these records as its raw
//! output and persists the same array to disk. Failures travel inside the
//! data: a single-element array whose title starts with [`ERROR_MARKER`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Titles beginning with this marker carry an error message instead of a
/// product.
pub const ERROR_MARKER: &str = "error:";

/// Rows shown in a rendered result table
pub const TABLE_ROW_LIMIT: usize = 5;

/// Characters of a title shown in a table row
const TITLE_DISPLAY_LIMIT: usize = 40;

/// Characters of raw output quoted when rendering falls back to an excerpt
const RAW_EXCERPT_LIMIT: usize = 200;

/// One scraped product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub title: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub purchase_link: String,
    #[serde(default)]
    pub image_text: String,
}

impl ProductRecord {
    /// Build the error sentinel the search tool returns on failure
    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            title: format!("{ERROR_MARKER} {}", message.as_ref()),
            price: "N/A".to_string(),
            image_url: "#".to_string(),
            purchase_link: "#".to_string(),
            image_text: "#".to_string(),
        }
    }

    fn is_error(&self) -> bool {
        self.title.starts_with(ERROR_MARKER)
    }
}

#[derive(Debug, Error)]
pub enum ProductStoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed product file {path}: {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
}

/// Persist records as a bare JSON array (the file the `read_results` tool
/// reads back).
pub fn save_results(path: &Path, records: &[ProductRecord]) -> Result<(), ProductStoreError> {
    let json = serde_json::to_string_pretty(records).expect("product records serialize");
    std::fs::write(path, json).map_err(|source| ProductStoreError::Write {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_results(path: &Path) -> Result<Vec<ProductRecord>, ProductStoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ProductStoreError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ProductStoreError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

/// Load the storefront credential file. The contents are opaque cookie-like
/// objects handed to the browser untouched.
pub fn load_cookies(path: &Path) -> Result<Vec<serde_json::Value>, ProductStoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ProductStoreError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ProductStoreError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

/// Render a search tool's raw output as user-facing text.
///
/// Returns `None` when the output does not parse as a non-empty record array;
/// the caller falls back to a raw excerpt.
pub fn render_search_results(raw: &str) -> Option<String> {
    let records: Vec<ProductRecord> = serde_json::from_str(raw).ok()?;
    let first = records.first()?;

    if first.is_error() {
        let detail = first.title.trim_start_matches(ERROR_MARKER).trim();
        return Some(format!("The search ran into a problem: {detail}"));
    }

    let mut rendered = format!("Found {} products:\n\n", records.len());
    rendered.push_str("| Name | Price | Image | Link |\n| --- | --- | --- | --- |\n");
    for record in records.iter().take(TABLE_ROW_LIMIT) {
        let title = crate::message::truncate_chars(record.title.trim(), TITLE_DISPLAY_LIMIT);
        let image = if record.image_url.is_empty() || record.image_url == "#" {
            "no image".to_string()
        } else {
            format!("![product]({})", record.image_url)
        };
        let link = if record.purchase_link.is_empty() || record.purchase_link == "#" {
            "no link".to_string()
        } else {
            format!("[buy]({})", record.purchase_link)
        };
        let price = if record.price.is_empty() {
            "unknown"
        } else {
            record.price.as_str()
        };
        rendered.push_str(&format!("| {title} | {price} | {image} | {link} |\n"));
    }
    Some(rendered)
}

/// Excerpt used when structured rendering is not possible
pub fn raw_excerpt(name: &str, raw: &str) -> String {
    format!(
        "Ran {name}.\nResult: {}",
        crate::message::truncate_chars(raw.trim(), RAW_EXCERPT_LIMIT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> Vec<ProductRecord> {
        (0..n)
            .map(|i| ProductRecord {
                title: format!("Phone {i}"),
                price: format!("{}99.00", i + 1),
                image_url: format!("https://img.example/{i}.jpg"),
                purchase_link: format!("https://shop.example/item/{i}"),
                image_text: String::new(),
            })
            .collect()
    }

    #[test]
    fn renders_count_and_rows() {
        let raw = serde_json::to_string(&sample(3)).unwrap();
        let rendered = render_search_results(&raw).unwrap();
        assert!(rendered.starts_with("Found 3 products:"));
        assert_eq!(rendered.matches("[buy]").count(), 3);
        assert!(rendered.contains("Phone 0"));
    }

    #[test]
    fn table_is_capped_but_count_is_not() {
        let raw = serde_json::to_string(&sample(8)).unwrap();
        let rendered = render_search_results(&raw).unwrap();
        assert!(rendered.starts_with("Found 8 products:"));
        assert_eq!(rendered.matches("[buy]").count(), TABLE_ROW_LIMIT);
    }

    #[test]
    fn error_sentinel_renders_as_problem_line() {
        let records = vec![ProductRecord::error("storefront unreachable")];
        let raw = serde_json::to_string(&records).unwrap();
        let rendered = render_search_results(&raw).unwrap();
        assert!(rendered.contains("storefront unreachable"));
        assert!(!rendered.contains('|'));
    }

    #[test]
    fn unparseable_output_yields_none() {
        assert_eq!(render_search_results("not json"), None);
        assert_eq!(render_search_results("[]"), None);
        assert_eq!(render_search_results("{\"title\": \"obj\"}"), None);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let records = sample(2);
        save_results(&path, &records).unwrap();
        assert_eq!(load_results(&path).unwrap(), records);
    }

    #[test]
    fn cookies_are_loaded_opaquely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[{"name": "session", "value": "abc", "domain": ".example.com"}]"#,
        )
        .unwrap();
        let cookies = load_cookies(&path).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0]["name"], "session");
    }

    #[test]
    fn missing_results_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_results(&dir.path().join("absent.json")).is_err());
    }
}
