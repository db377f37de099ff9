//! Category seed configuration.
//!
//! An empty ledger is populated with a built-in taxonomy of income and expense
//! categories. The taxonomy can be replaced with a TOML file of the form:
//!
//! ```toml
//! [[expense]]
//! name = "Food"
//! icon = "ic_food"
//! color = "#FF6B6B"
//! sort_order = 1
//! children = ["Breakfast", "Lunch"]
//!
//! [[income]]
//! name = "Salary"
//! icon = "ic_salary"
//! color = "#26DE81"
//! sort_order = 1
//! ```

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_SEED_PATH: &str = "categories.toml";

/// The full seed taxonomy
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct SeedConfig {
    /// Top-level expense categories
    #[serde(default)]
    pub expense: Vec<CategorySeed>,
    /// Top-level income categories
    #[serde(default)]
    pub income: Vec<CategorySeed>,
}

/// One top-level category and the names of its subcategories
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CategorySeed {
    /// Display name
    pub name: String,
    /// Icon token
    pub icon: String,
    /// Display color
    pub color: String,
    /// Position among the top-level categories of its type
    pub sort_order: i32,
    /// Subcategory names; they inherit the parent's icon and color
    #[serde(default)]
    pub children: Vec<String>,
}

impl CategorySeed {
    fn new(name: &str, icon: &str, color: &str, sort_order: i32, children: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            sort_order,
            children: children.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

impl SeedConfig {
    /// The taxonomy shipped with the application
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            expense: vec![
                CategorySeed::new(
                    "Food",
                    "ic_food",
                    "#FF6B6B",
                    1,
                    &["Breakfast", "Lunch", "Dinner", "Snacks", "Drinks", "Fruit"],
                ),
                CategorySeed::new(
                    "Transport",
                    "ic_transport",
                    "#4ECDC4",
                    2,
                    &["Transit", "Taxi", "Fuel", "Parking", "Train", "Flights"],
                ),
                CategorySeed::new(
                    "Shopping",
                    "ic_shopping",
                    "#FFE66D",
                    3,
                    &["Household", "Electronics", "Appliances", "Beauty", "Gifts"],
                ),
                CategorySeed::new(
                    "Entertainment",
                    "ic_entertainment",
                    "#95E1D3",
                    4,
                    &["Movies", "Games", "Travel", "Fitness", "Karaoke"],
                ),
                CategorySeed::new("Medical", "ic_medical", "#F38181", 5, &[]),
                CategorySeed::new("Education", "ic_education", "#AA96DA", 6, &[]),
                CategorySeed::new("Housing", "ic_home_category", "#FCBAD3", 7, &[]),
                CategorySeed::new("Communication", "ic_communication", "#A8D8EA", 8, &[]),
                CategorySeed::new("Clothing", "ic_clothing", "#D4A5A5", 9, &[]),
                CategorySeed::new("Other", "ic_other", "#C9CCD5", 100, &[]),
            ],
            income: vec![
                CategorySeed::new("Salary", "ic_salary", "#26DE81", 1, &[]),
                CategorySeed::new("Bonus", "ic_bonus", "#FD9644", 2, &[]),
                CategorySeed::new("Investment", "ic_investment", "#45AAF2", 3, &[]),
                CategorySeed::new("Part-time", "ic_parttime", "#A55EEA", 4, &[]),
                CategorySeed::new("Gifts", "ic_redpacket", "#FC5C65", 5, &[]),
                CategorySeed::new("Other", "ic_other", "#C9CCD5", 100, &[]),
            ],
        }
    }

    /// Number of rows this taxonomy inserts, parents and children together
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.expense
            .iter()
            .chain(&self.income)
            .map(|seed| 1 + seed.children.len())
            .sum()
    }
}

/// Loads a seed taxonomy from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid TOML for [`SeedConfig`].
pub fn load_seed_config<P: AsRef<Path>>(path: P) -> Result<SeedConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load category seed from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read category seed file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

/// Loads the seed from `CATEGORY_SEED_PATH` (default `./categories.toml`), or the
/// built-in taxonomy when that file does not exist.
pub fn load_default_seed() -> Result<SeedConfig> {
    let path =
        std::env::var("CATEGORY_SEED_PATH").unwrap_or_else(|_| DEFAULT_SEED_PATH.to_string());
    if Path::new(&path).exists() {
        load_seed_config(&path)
    } else {
        info!("No category seed file at {path}, using built-in categories.");
        Ok(SeedConfig::builtin())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_seed_config() {
        let toml_str = r##"
            [[expense]]
            name = "Food"
            icon = "ic_food"
            color = "#FF6B6B"
            sort_order = 1
            children = ["Lunch", "Dinner"]

            [[income]]
            name = "Salary"
            icon = "ic_salary"
            color = "#26DE81"
            sort_order = 1
        "##;

        let config: SeedConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.expense.len(), 1);
        assert_eq!(config.expense[0].children, vec!["Lunch", "Dinner"]);
        assert_eq!(config.income[0].name, "Salary");
        assert!(config.income[0].children.is_empty());
        assert_eq!(config.row_count(), 4);
    }

    #[test]
    fn test_builtin_taxonomy_shape() {
        let builtin = SeedConfig::builtin();
        assert_eq!(builtin.expense.len(), 10);
        assert_eq!(builtin.income.len(), 6);
        assert_eq!(builtin.row_count(), 16 + 6 + 6 + 5 + 5);
    }

    #[test]
    fn test_missing_seed_file_is_config_error() {
        let result = load_seed_config("definitely/not/here.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
