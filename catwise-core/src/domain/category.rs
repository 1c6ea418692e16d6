//! Category and ranking domain entities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::Error;
use super::transaction::Direction;

/// Kind of money a category holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Expense,
    Income,
    /// Bookkeeping categories (transfers); pass every direction filter
    System,
    #[default]
    Unset,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Expense => "expense",
            CategoryType::Income => "income",
            CategoryType::System => "system",
            CategoryType::Unset => "",
        }
    }

    /// Category type a newly created category gets for a transaction direction
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Income => CategoryType::Income,
            Direction::Expense => CategoryType::Expense,
            Direction::Transfer => CategoryType::System,
            Direction::Unset => CategoryType::Unset,
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryType::Unset => f.write_str("unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for CategoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expense" => Ok(CategoryType::Expense),
            "income" => Ok(CategoryType::Income),
            "system" => Ok(CategoryType::System),
            "" | "unset" => Ok(CategoryType::Unset),
            other => Err(Error::validation(format!("Unknown category type: {}", other))),
        }
    }
}

/// A spending or income category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    /// Unique (case-insensitive) display name
    pub name: String,
    pub description: String,
    pub category_type: CategoryType,
}

impl Category {
    pub fn new(name: impl Into<String>, category_type: CategoryType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            category_type,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }

    /// Whether this category may be offered for a transaction of `direction`
    ///
    /// Untyped categories still count as expenses for older databases that
    /// predate category types.
    pub fn accepts(&self, direction: Direction) -> bool {
        match (self.category_type, direction) {
            (CategoryType::System, _) => true,
            (_, Direction::Unset) => true,
            (CategoryType::Income, Direction::Income) => true,
            (CategoryType::Expense | CategoryType::Unset, Direction::Expense) => true,
            _ => false,
        }
    }
}

/// Categories to offer the ranking oracle for one direction
///
/// If the filter would remove every category, the full list is returned.
pub fn filter_categories_for_direction(categories: &[Category], direction: Direction) -> Vec<Category> {
    let filtered: Vec<Category> = categories
        .iter()
        .filter(|c| c.accepts(direction))
        .cloned()
        .collect();

    if filtered.is_empty() {
        categories.to_vec()
    } else {
        filtered
    }
}

/// One candidate category returned by the ranking oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRanking {
    pub category: String,
    /// Confidence in [0, 1]
    pub score: f64,
    /// The oracle proposes a category that does not exist yet
    pub is_new: bool,
    #[serde(default)]
    pub description: String,
}

impl CategoryRanking {
    pub fn new(category: impl Into<String>, score: f64) -> Self {
        Self {
            category: category.into(),
            score: score.clamp(0.0, 1.0),
            is_new: false,
            description: String::new(),
        }
    }

    pub fn new_category(category: impl Into<String>, score: f64, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            score: score.clamp(0.0, 1.0),
            is_new: true,
            description: description.into(),
        }
    }
}

/// Ranked list of candidates, always sorted by descending score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CategoryRanking>", into = "Vec<CategoryRanking>")]
pub struct CategoryRankings(Vec<CategoryRanking>);

impl CategoryRankings {
    pub fn new(mut rankings: Vec<CategoryRanking>) -> Self {
        for ranking in &mut rankings {
            ranking.score = ranking.score.clamp(0.0, 1.0);
        }
        sort_descending(&mut rankings);
        Self(rankings)
    }

    /// Highest scoring candidate, if any
    pub fn top(&self) -> Option<&CategoryRanking> {
        self.0.first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRanking> {
        self.0.iter()
    }

    /// Add `boost` to the ranking for `category`, clamped to 1.0
    ///
    /// A category missing from the list is inserted with the boost as its
    /// score. Returns the boost actually applied.
    pub fn apply_boost(&mut self, category: &str, boost: f64) -> f64 {
        let boost = boost.max(0.0);
        let applied = match self
            .0
            .iter_mut()
            .find(|r| r.category.trim().eq_ignore_ascii_case(category.trim()))
        {
            Some(ranking) => {
                let before = ranking.score;
                ranking.score = (before + boost).min(1.0);
                ranking.score - before
            }
            None => {
                let ranking = CategoryRanking::new(category, boost.min(1.0));
                let applied = ranking.score;
                self.0.push(ranking);
                applied
            }
        };
        sort_descending(&mut self.0);
        applied
    }
}

impl From<Vec<CategoryRanking>> for CategoryRankings {
    fn from(rankings: Vec<CategoryRanking>) -> Self {
        Self::new(rankings)
    }
}

impl From<CategoryRankings> for Vec<CategoryRanking> {
    fn from(rankings: CategoryRankings) -> Self {
        rankings.0
    }
}

fn sort_descending(rankings: &mut [CategoryRanking]) {
    rankings.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
