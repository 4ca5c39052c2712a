//! Data models for SpendSense

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spending category from the fixed receipt taxonomy
///
/// The set is closed: anything the model invents lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Produce,
    Dairy,
    #[serde(rename = "Meat & Seafood")]
    MeatSeafood,
    #[serde(rename = "Pantry Staples")]
    PantryStaples,
    Snacks,
    Beverages,
    #[serde(rename = "Frozen Items")]
    FrozenItems,
    Bakery,
    #[serde(rename = "Household Supplies")]
    HouseholdSupplies,
    #[serde(rename = "Personal Care")]
    PersonalCare,
    Other,
}

impl Category {
    /// Full taxonomy, in prompt order
    pub const ALL: [Category; 11] = [
        Category::Produce,
        Category::Dairy,
        Category::MeatSeafood,
        Category::PantryStaples,
        Category::Snacks,
        Category::Beverages,
        Category::FrozenItems,
        Category::Bakery,
        Category::HouseholdSupplies,
        Category::PersonalCare,
        Category::Other,
    ];

    /// Slug used for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Dairy => "dairy",
            Self::MeatSeafood => "meat_seafood",
            Self::PantryStaples => "pantry_staples",
            Self::Snacks => "snacks",
            Self::Beverages => "beverages",
            Self::FrozenItems => "frozen_items",
            Self::Bakery => "bakery",
            Self::HouseholdSupplies => "household_supplies",
            Self::PersonalCare => "personal_care",
            Self::Other => "other",
        }
    }

    /// Human-readable name, as shown to the model and in summaries
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Produce => "Produce",
            Self::Dairy => "Dairy",
            Self::MeatSeafood => "Meat & Seafood",
            Self::PantryStaples => "Pantry Staples",
            Self::Snacks => "Snacks",
            Self::Beverages => "Beverages",
            Self::FrozenItems => "Frozen Items",
            Self::Bakery => "Bakery",
            Self::HouseholdSupplies => "Household Supplies",
            Self::PersonalCare => "Personal Care",
            Self::Other => "Other",
        }
    }

    /// One-line definition included in the classification prompt
    pub fn definition(&self) -> &'static str {
        match self {
            Self::Produce => "Fruits, vegetables, fresh herbs.",
            Self::Dairy => "Milk, cheese, yogurt, butter.",
            Self::MeatSeafood => "Chicken, beef, fish, shrimp.",
            Self::PantryStaples => "Rice, pasta, flour, sugar, spices.",
            Self::Snacks => "Chips, nuts, chocolates.",
            Self::Beverages => "Coffee, tea, juices, soft drinks.",
            Self::FrozenItems => "Ice cream, frozen meals, frozen vegetables.",
            Self::Bakery => "Bread, rolls, pastries.",
            Self::HouseholdSupplies => "Cleaning products, paper towels, detergents.",
            Self::PersonalCare => "Shampoo, soap, toothpaste.",
            Self::Other => "Miscellaneous items (pet food, specialty items).",
        }
    }

    /// Map a free-form label from the model onto the taxonomy
    ///
    /// Matching ignores case, whitespace and punctuation, and treats `&` as
    /// `and`. Unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        let wanted = fold_label(label);
        Self::ALL
            .into_iter()
            .find(|c| fold_label(c.display_name()) == wanted || fold_label(c.as_str()) == wanted)
            .unwrap_or(Self::Other)
    }
}

fn fold_label(s: &str) -> String {
    s.to_lowercase()
        .replace('&', "and")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Strict parse of a stored slug or display name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.display_name() == s)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Category name → total amount
pub type CategorySummary = BTreeMap<Category, Decimal>;

/// One line from a receipt, as extracted from the model reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub description: String,
    pub amount: Decimal,
    pub category: Category,
}

/// Validated categorization of a whole receipt
///
/// `totals[c]` is always the exact sum of `items[c]`; the extractor builds it
/// that way and rejects replies whose own totals disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorizationResult {
    pub items: BTreeMap<Category, Vec<LineItem>>,
    pub totals: CategorySummary,
}

impl CategorizationResult {
    /// All line items, in category order
    pub fn line_items(&self) -> impl Iterator<Item = &LineItem> {
        self.items.values().flatten()
    }

    pub fn item_count(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    /// Sum of every category total
    pub fn grand_total(&self) -> Decimal {
        self.totals.values().copied().sum()
    }
}

/// Expense ready to be appended to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub description: String,
    pub category: Category,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
    /// SHA-256 of the receipt image this expense came from
    pub receipt_hash: String,
}

/// Persisted expense (ledger row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseRecord {
    pub id: i64,
    pub description: String,
    pub category: Category,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub receipt_hash: String,
}
