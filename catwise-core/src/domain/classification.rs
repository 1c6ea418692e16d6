//! Classification facts and review decisions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::Error;
use super::transaction::Transaction;

/// Legacy notes marker for "create this category": `NEW_CATEGORY|<description>`
pub const NEW_CATEGORY_MARKER: &str = "NEW_CATEGORY";

/// How a classification was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationStatus {
    /// Vendor rule or check pattern
    Rule,
    /// Ranking oracle suggestion, auto-accepted or confirmed unchanged
    Ai,
    /// A person picked a different category than suggested
    UserModified,
}

impl ClassificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationStatus::Rule => "rule",
            ClassificationStatus::Ai => "ai",
            ClassificationStatus::UserModified => "user-modified",
        }
    }
}

impl fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(ClassificationStatus::Rule),
            "ai" => Ok(ClassificationStatus::Ai),
            "user-modified" => Ok(ClassificationStatus::UserModified),
            other => Err(Error::validation(format!("Unknown classification status: {}", other))),
        }
    }
}

/// The category assigned to one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub transaction_id: Uuid,
    pub category: String,
    pub status: ClassificationStatus,
    pub confidence: f64,
    pub classified_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Classification {
    pub fn new(
        transaction_id: Uuid,
        category: impl Into<String>,
        status: ClassificationStatus,
        confidence: f64,
    ) -> Self {
        Self {
            transaction_id,
            category: category.into(),
            status,
            confidence: confidence.clamp(0.0, 1.0),
            classified_at: Utc::now(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }
}

/// A persisted classification joined with its transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedTransaction {
    pub transaction: Transaction,
    pub classification: Classification,
}

/// Which category a reviewer settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryChoice {
    /// A category that is expected to exist already
    Existing(String),
    /// Create the category (if absent) before classifying
    CreateNew {
        name: String,
        /// Generated on demand when `None`
        description: Option<String>,
    },
}

impl CategoryChoice {
    pub fn name(&self) -> &str {
        match self {
            CategoryChoice::Existing(name) => name,
            CategoryChoice::CreateNew { name, .. } => name,
        }
    }

    /// Read the legacy `NEW_CATEGORY|<description>` notes convention
    ///
    /// Returns the choice for `category` and the notes with the marker removed.
    pub fn from_notes(category: &str, notes: Option<&str>) -> (Self, Option<String>) {
        let Some(notes) = notes else {
            return (CategoryChoice::Existing(category.to_string()), None);
        };

        match notes.trim().strip_prefix(NEW_CATEGORY_MARKER) {
            Some(rest) if rest.is_empty() || rest.starts_with('|') => {
                let description = rest.trim_start_matches('|').trim();
                let choice = CategoryChoice::CreateNew {
                    name: category.to_string(),
                    description: (!description.is_empty()).then(|| description.to_string()),
                };
                (choice, None)
            }
            _ => (
                CategoryChoice::Existing(category.to_string()),
                Some(notes.to_string()),
            ),
        }
    }
}

/// Reviewer answer for one pending classification
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    Accept {
        choice: CategoryChoice,
        notes: Option<String>,
    },
    /// Leave the transactions unclassified for now
    Skip,
}

/// Resumable progress of a classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationProgress {
    pub last_processed_id: Option<Uuid>,
    pub last_processed_date: Option<NaiveDate>,
    pub total_processed: u64,
    pub started_at: DateTime<Utc>,
}

impl ClassificationProgress {
    pub fn start() -> Self {
        Self {
            last_processed_id: None,
            last_processed_date: None,
            total_processed: 0,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            ClassificationStatus::Rule,
            ClassificationStatus::Ai,
            ClassificationStatus::UserModified,
        ] {
            assert_eq!(status.as_str().parse::<ClassificationStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_confidence_is_clamped() {
        let c = Classification::new(Uuid::new_v4(), "Rent", ClassificationStatus::Rule, 1.3);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_legacy_marker_with_description() {
        let (choice, notes) =
            CategoryChoice::from_notes("Pet Care", Some("NEW_CATEGORY|Vet bills and food"));
        assert_eq!(
            choice,
            CategoryChoice::CreateNew {
                name: "Pet Care".to_string(),
                description: Some("Vet bills and food".to_string()),
            }
        );
        assert!(notes.is_none());
    }

    #[test]
    fn test_legacy_marker_without_description() {
        let (choice, _) = CategoryChoice::from_notes("Pet Care", Some("NEW_CATEGORY|"));
        assert_eq!(
            choice,
            CategoryChoice::CreateNew {
                name: "Pet Care".to_string(),
                description: None,
            }
        );
    }

    #[test]
    fn test_plain_notes_are_kept() {
        let (choice, notes) = CategoryChoice::from_notes("Coffee", Some("work meeting"));
        assert_eq!(choice, CategoryChoice::Existing("Coffee".to_string()));
        assert_eq!(notes.as_deref(), Some("work meeting"));

        let (choice, _) = CategoryChoice::from_notes("Coffee", Some("NEW_CATEGORYX"));
        assert_eq!(choice, CategoryChoice::Existing("Coffee".to_string()));
    }
}
