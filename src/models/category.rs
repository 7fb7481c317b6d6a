//! Category catalogue for the guided entry flow.
//!
//! Expense categories carry subcategories; income categories are flat.
//! Import/export of user-defined catalogues lives outside this crate; the
//! conversation engine only validates against whatever catalogue it is
//! handed.

use serde::{Deserialize, Serialize};

/// One expense category with its subcategories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub subcategories: Vec<String>,
}

/// The full catalogue the guided flow offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCatalog {
    pub expense: Vec<Category>,
    pub income: Vec<String>,
}

impl CategoryCatalog {
    /// Expense category names, in display order.
    pub fn expense_names(&self) -> Vec<&str> {
        self.expense.iter().map(|c| c.name.as_str()).collect()
    }

    /// Subcategories of an expense category, if it exists.
    pub fn subcategories_of(&self, category: &str) -> Option<&[String]> {
        self.expense
            .iter()
            .find(|c| c.name == category)
            .map(|c| c.subcategories.as_slice())
    }

    pub fn has_income_category(&self, category: &str) -> bool {
        self.income.iter().any(|c| c == category)
    }

    pub fn has_subcategory(&self, category: &str, subcategory: &str) -> bool {
        self.subcategories_of(category)
            .map(|subs| subs.iter().any(|s| s == subcategory))
            .unwrap_or(false)
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        fn cat(name: &str, subs: &[&str]) -> Category {
            Category {
                name: name.to_string(),
                subcategories: subs.iter().map(|s| s.to_string()).collect(),
            }
        }

        Self {
            expense: vec![
                cat(
                    "HOME",
                    &[
                        "Rent / Mortgage",
                        "Electricity",
                        "Water",
                        "Gas",
                        "Internet",
                        "Maintenance",
                    ],
                ),
                cat("FOOD", &["Groceries", "Restaurants", "Delivery"]),
                cat(
                    "TRANSPORT",
                    &["Fuel", "Public transit", "Taxi / Rideshare", "Parking"],
                ),
                cat("HEALTH", &["Pharmacy", "Doctor", "Insurance"]),
                cat("LEISURE", &["Streaming", "Events", "Travel"]),
                cat("OTHER", &["Other"]),
            ],
            income: vec![
                "Salary / Wages".to_string(),
                "Bonus".to_string(),
                "Interest".to_string(),
                "Gifts".to_string(),
                "Other".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_lookups() {
        let catalog = CategoryCatalog::default();

        assert!(catalog.subcategories_of("HOME").is_some());
        assert!(catalog.has_subcategory("HOME", "Electricity"));
        assert!(!catalog.has_subcategory("HOME", "Groceries"));
        assert!(catalog.subcategories_of("NOPE").is_none());

        assert!(catalog.has_income_category("Salary / Wages"));
        assert!(!catalog.has_income_category("HOME"));
    }
}
