//! Profile aggregate types
//!
//! Views assembled from the stored tables on every request. None of these
//! are persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One professional experience line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub role: String,
    pub institution: String,
    pub city: String,
    pub country: String,
    pub category: String,
    pub start_date: Option<NaiveDate>,
    /// `None` means ongoing
    pub end_date: Option<NaiveDate>,
}

/// One research production line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub title: String,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub kind: String,
    pub venue: String,
    pub classification: String,
    pub peer_review: String,
    /// Institutional repository (SAVI) status
    pub savi_status: String,
    pub library_status: String,
    pub evidence_source: String,
    /// Free-text note from the Lattes CV
    pub lattes_info: String,
}

/// Academic degree derived from the subject row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationRecord {
    pub degree: String,
    pub institution: String,
    pub year: Option<i32>,
    pub country: String,
}

/// Allocation fields for the current term
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationFields {
    pub count: usize,
    pub disciplines: Vec<String>,
}

/// Everything known about one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub subject_id: String,
    pub name: String,
    /// Non-empty subject-table cells keyed by column
    pub basic_fields: BTreeMap<String, String>,
    pub education: Vec<EducationRecord>,
    /// Most recent start first
    pub experiences: Vec<ExperienceEntry>,
    pub productions: Vec<ProductionEntry>,
    pub accreditations: BTreeSet<String>,
    pub allocation: AllocationFields,
}

/// Row of the paginated subject listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub id: String,
    pub name: String,
    pub area: String,
    pub unit: String,
    pub allocation_count: usize,
    pub accreditations: Vec<String>,
    pub has_allocation: bool,
}

/// Summary listing request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryQuery {
    pub page: i64,
    pub page_size: i64,
    pub allocated_only: bool,
    /// OR-filter over accreditation tags; empty means no filter
    pub accreditations: Vec<String>,
}

impl Default for SummaryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            allocated_only: false,
            accreditations: Vec::new(),
        }
    }
}

/// One page of summaries plus pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPage {
    pub items: Vec<SubjectSummary>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}
