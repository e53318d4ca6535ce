//! Per-sender menu catalog: item records, extraction from model output, and listing.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fence that delimits the structured block in a model reply.
const FENCE: &str = "```";

/// Kind of menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Dish,
    Sandwich,
    Drink,
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dish" => Ok(Self::Dish),
            "sandwich" => Ok(Self::Sandwich),
            "drink" => Ok(Self::Drink),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dish => "dish",
            Self::Sandwich => "sandwich",
            Self::Drink => "drink",
        };
        f.write_str(s)
    }
}

impl<'de> Deserialize<'de> for ItemKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One menu entry. Prices are in cents, preparation time in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: ItemKind,
    pub unit_price: u64,
    #[serde(alias = "prep_time")]
    pub preparation_time: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no fenced block in reply")]
    MissingBlock,
    #[error("invalid item json: {0}")]
    InvalidItem(#[from] serde_json::Error),
}

/// Take the text between the first pair of ``` fences. A leading info string
/// (e.g. `json`) on the opening fence line is dropped.
pub fn fenced_block(text: &str) -> Option<&str> {
    let mut parts = text.split(FENCE);
    parts.next()?;
    let inner = parts.next()?;
    // split yields the tail after an unmatched opening fence too; require the closing one.
    parts.next()?;
    let inner = match inner.split_once('\n') {
        Some((first, rest)) if is_info_string(first) => rest,
        _ => inner,
    };
    Some(inner.trim())
}

/// A language tag: one alphabetic word and nothing else on the line.
fn is_info_string(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c.is_ascii_alphabetic())
}

/// Parse a [`CatalogItem`] from the fenced block of a model reply.
pub fn extract_item(reply: &str) -> Result<CatalogItem, ExtractionError> {
    let block = fenced_block(reply).ok_or(ExtractionError::MissingBlock)?;
    Ok(serde_json::from_str(block)?)
}

/// JSON array rendering of a catalog, as shown to the model and the sender.
pub fn render_catalog(items: &[CatalogItem]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Message delivered when the sender asks for the menu.
pub fn render_listing(items: &[CatalogItem]) -> String {
    format!(
        "Here are your menu items, JSON formatted: {}",
        render_catalog(items)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tea() -> CatalogItem {
        CatalogItem {
            name: "Tea".to_string(),
            kind: ItemKind::Drink,
            unit_price: 500,
            preparation_time: 3,
        }
    }

    #[test]
    fn extracts_item_from_json_fence() {
        let reply = "Sure, here it is:\n```json\n{\"name\": \"Tea\", \"type\": \"Drink\", \"unit_price\": 500, \"preparation_time\": 3}\n```\nAnything else?";
        assert_eq!(extract_item(reply).unwrap(), tea());
    }

    #[test]
    fn extracts_item_from_bare_fence() {
        let reply = "```{\"name\": \"Tea\", \"kind\": \"drink\", \"unit_price\": 500, \"prep_time\": 3}```";
        assert_eq!(extract_item(reply).unwrap(), tea());
    }

    #[test]
    fn content_on_the_fence_line_is_kept() {
        assert_eq!(
            fenced_block("```SELECT 1\nFROM t\n```"),
            Some("SELECT 1\nFROM t")
        );
        assert_eq!(fenced_block("```sql\nSELECT 1\n```"), Some("SELECT 1"));
        assert_eq!(fenced_block("```\nSELECT 1\n```"), Some("SELECT 1"));
        let reply = "```{\"name\": \"Tea\",\n\"type\": \"drink\", \"unit_price\": 500, \"preparation_time\": 3}\n```";
        assert_eq!(extract_item(reply).unwrap(), tea());
    }

    #[test]
    fn missing_or_unclosed_fence_is_an_error() {
        assert!(matches!(
            extract_item("{\"name\": \"Tea\"}"),
            Err(ExtractionError::MissingBlock)
        ));
        assert!(matches!(
            extract_item("```json\n{\"name\": \"Tea\"}"),
            Err(ExtractionError::MissingBlock)
        ));
    }

    #[test]
    fn bad_fields_are_invalid_item() {
        let reply = "```\n{\"name\": \"Soup\", \"type\": \"dessert\", \"unit_price\": 100, \"preparation_time\": 5}\n```";
        assert!(matches!(
            extract_item(reply),
            Err(ExtractionError::InvalidItem(_))
        ));
        let reply = "```\n{\"name\": \"Soup\", \"type\": \"dish\", \"unit_price\": 1.5, \"preparation_time\": 5}\n```";
        assert!(extract_item(reply).is_err());
    }

    #[test]
    fn listing_renders_records() {
        assert_eq!(
            render_listing(&[tea()]),
            "Here are your menu items, JSON formatted: [{\"name\":\"Tea\",\"type\":\"drink\",\"unit_price\":500,\"preparation_time\":3}]"
        );
        assert_eq!(render_catalog(&[]), "[]");
    }
}
