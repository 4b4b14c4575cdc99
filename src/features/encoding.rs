//! Persisted merchant-category code table

use anyhow::{Context, Result};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Code assigned to categories absent from the table
pub const UNKNOWN_CATEGORY_CODE: i32 = -1;

/// Stable category -> integer mapping.
///
/// Codes are positions in the lexicographically sorted set of categories seen
/// when the table was fit. The table is built once from history, written next
/// to the model, and loaded unchanged by the online path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EncodingFile", into = "EncodingFile")]
pub struct CategoryEncoding {
    version: String,
    categories: Vec<String>,
    codes: HashMap<String, i32>,
}

/// On-disk shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncodingFile {
    version: String,
    categories: Vec<String>,
}

impl From<EncodingFile> for CategoryEncoding {
    fn from(file: EncodingFile) -> Self {
        Self::from_sorted(file.version, file.categories)
    }
}

impl From<CategoryEncoding> for EncodingFile {
    fn from(encoding: CategoryEncoding) -> Self {
        Self {
            version: encoding.version,
            categories: encoding.categories,
        }
    }
}

impl CategoryEncoding {
    /// Fit a table over every distinct category in `categories`.
    pub fn fit<'a, I>(categories: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sorted: Vec<String> = categories
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let version = fingerprint(&sorted);
        Self::from_sorted(version, sorted)
    }

    fn from_sorted(version: String, categories: Vec<String>) -> Self {
        let codes = categories
            .iter()
            .enumerate()
            .map(|(code, name)| (name.clone(), code as i32))
            .collect();
        Self {
            version,
            categories,
            codes,
        }
    }

    /// Code for `category`, or `UNKNOWN_CATEGORY_CODE` if it was never seen
    pub fn code(&self, category: &str) -> i32 {
        match self.codes.get(category) {
            Some(&code) => code,
            None => {
                debug!(category, version = %self.version, "Category not in encoding table");
                UNKNOWN_CATEGORY_CODE
            }
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Load a table written by `save`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read encoding table {}", path.display()))?;
        let encoding: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse encoding table {}", path.display()))?;
        info!(
            path = %path.display(),
            version = %encoding.version,
            categories = encoding.len(),
            "Category encoding loaded"
        );
        Ok(encoding)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write encoding table {}", path.display()))?;
        Ok(())
    }
}

fn fingerprint(categories: &[String]) -> String {
    let mut hasher = Hasher::new();
    for name in categories {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    format!("{:08x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_sorted_order() {
        let encoding = CategoryEncoding::fit(
            ["Pharmacy", "Dining", "Groceries", "Dining", "Entertainment"]
                .iter()
                .copied(),
        );
        assert_eq!(encoding.len(), 4);
        assert_eq!(encoding.code("Dining"), 0);
        assert_eq!(encoding.code("Entertainment"), 1);
        assert_eq!(encoding.code("Groceries"), 2);
        assert_eq!(encoding.code("Pharmacy"), 3);
    }

    #[test]
    fn test_fit_is_independent_of_input_order() {
        let a = CategoryEncoding::fit(["Travel", "Dining"].iter().copied());
        let b = CategoryEncoding::fit(["Dining", "Travel", "Travel"].iter().copied());
        assert_eq!(a, b);
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn test_unknown_category() {
        let encoding = CategoryEncoding::fit(["Dining"].iter().copied());
        assert_eq!(encoding.code("Casino"), UNKNOWN_CATEGORY_CODE);
    }

    #[test]
    fn test_saved_table_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merchant_categories.json");
        let encoding = CategoryEncoding::fit(["Travel", "Electronics", "Dining"].iter().copied());

        encoding.save(&path).unwrap();
        let loaded = CategoryEncoding::load(&path).unwrap();

        assert_eq!(loaded, encoding);
        for name in encoding.categories() {
            assert_eq!(loaded.code(name), encoding.code(name));
        }
    }
}
