use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::products::CanonicalProduct;
use crate::ConfigError;

/// Records the merge engine drops before grouping.
///
/// Matching is case-insensitive: categories and tags compare whole values,
/// name keywords match anywhere in the product name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergePolicy {
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default)]
    pub excluded_tags: Vec<String>,
    #[serde(default)]
    pub excluded_name_keywords: Vec<String>,
}

/// Why a record was excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    Category(String),
    Tag(String),
    NameKeyword(String),
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::Category(c) => write!(f, "excluded category '{c}'"),
            ExclusionReason::Tag(t) => write!(f, "excluded tag '{t}'"),
            ExclusionReason::NameKeyword(k) => write!(f, "excluded name keyword '{k}'"),
        }
    }
}

impl MergePolicy {
    /// Returns the first exclusion rule `product` matches, if any.
    #[must_use]
    pub fn exclusion_for(&self, product: &CanonicalProduct) -> Option<ExclusionReason> {
        let category = product.category.trim().to_lowercase();
        if let Some(hit) = self
            .excluded_categories
            .iter()
            .find(|c| c.trim().to_lowercase() == category)
        {
            return Some(ExclusionReason::Category(hit.clone()));
        }

        let tags: HashSet<String> = product
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect();
        if let Some(hit) = self
            .excluded_tags
            .iter()
            .find(|t| tags.contains(&t.trim().to_lowercase()))
        {
            return Some(ExclusionReason::Tag(hit.clone()));
        }

        let name = product.name.to_lowercase();
        self.excluded_name_keywords
            .iter()
            .find(|k| name.contains(&k.trim().to_lowercase()))
            .map(|k| ExclusionReason::NameKeyword(k.clone()))
    }
}

/// Load and validate the merge policy from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_merge_policy(path: &Path) -> Result<MergePolicy, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let policy: MergePolicy = serde_yaml::from_str(&content)?;
    validate_policy(&policy)?;
    Ok(policy)
}

fn validate_policy(policy: &MergePolicy) -> Result<(), ConfigError> {
    let lists = [
        ("excluded_categories", &policy.excluded_categories),
        ("excluded_tags", &policy.excluded_tags),
        ("excluded_name_keywords", &policy.excluded_name_keywords),
    ];

    for (field, values) in lists {
        let mut seen = HashSet::new();
        for value in values {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{field} must not contain empty entries"
                )));
            }
            if !seen.insert(value.trim().to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate entry '{value}' in {field}"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;

    use super::*;
    use crate::products::{RawStock, SourceTag};

    fn make_product(name: &str, category: &str, tags: &[&str]) -> CanonicalProduct {
        CanonicalProduct {
            source: SourceTag::Csv,
            source_id: "row-1".to_string(),
            sku: "SKU-1".to_string(),
            name: name.to_string(),
            brand: "Acme".to_string(),
            price: Decimal::new(999, 2),
            raw_stock: RawStock::Quantity(1),
            in_stock: true,
            category: category.to_string(),
            image_urls: vec![],
            flavour: None,
            description: None,
            tags: tags.iter().map(ToString::to_string).collect(),
            parent_sku: None,
            source_updated_at: None,
        }
    }

    fn policy() -> MergePolicy {
        MergePolicy {
            excluded_categories: vec!["Samples".to_string()],
            excluded_tags: vec!["wholesale-only".to_string()],
            excluded_name_keywords: vec!["tester".to_string()],
        }
    }

    #[test]
    fn category_match_is_case_insensitive() {
        let product = make_product("Acme Whey", "SAMPLES", &[]);
        assert_eq!(
            policy().exclusion_for(&product),
            Some(ExclusionReason::Category("Samples".to_string()))
        );
    }

    #[test]
    fn tag_match_excludes() {
        let product = make_product("Acme Whey", "Protein", &["Wholesale-Only"]);
        assert!(matches!(
            policy().exclusion_for(&product),
            Some(ExclusionReason::Tag(_))
        ));
    }

    #[test]
    fn name_keyword_matches_substring() {
        let product = make_product("Acme Whey Tester Sachet", "Protein", &[]);
        assert!(matches!(
            policy().exclusion_for(&product),
            Some(ExclusionReason::NameKeyword(_))
        ));
    }

    #[test]
    fn unmatched_product_is_kept() {
        let product = make_product("Acme Whey", "Protein", &["bestseller"]);
        assert!(policy().exclusion_for(&product).is_none());
    }

    #[test]
    fn load_merge_policy_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "excluded_categories:\n  - Samples\nexcluded_name_keywords:\n  - tester"
        )
        .unwrap();

        let policy = load_merge_policy(file.path()).unwrap();
        assert_eq!(policy.excluded_categories, vec!["Samples"]);
        assert!(policy.excluded_tags.is_empty());
        assert_eq!(policy.excluded_name_keywords, vec!["tester"]);
    }

    #[test]
    fn load_merge_policy_rejects_duplicates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "excluded_tags:\n  - promo\n  - PROMO").unwrap();

        let err = load_merge_policy(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate entry"));
    }

    #[test]
    fn load_merge_policy_missing_file_is_io_error() {
        let err = load_merge_policy(Path::new("/nonexistent/policy.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::PolicyFileIo { .. }));
    }

    #[test]
    fn shipped_policy_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/policy.yaml");
        let policy = load_merge_policy(&path).unwrap();
        assert!(policy
            .excluded_categories
            .iter()
            .any(|c| c == "Gift Cards"));
    }
}
