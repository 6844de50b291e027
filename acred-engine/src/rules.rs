//! Accreditation rule engine
//!
//! Pure evaluation of a `SubjectProfile` against a named `RuleSet`. No
//! store access and no clock access beyond `apply_rules`, which reads
//! `acred_common::time::now()` once and delegates to `apply_rules_at`.

use crate::consolidate::models::{
    AllocationFields, EducationRecord, ExperienceEntry, ProductionEntry, SubjectProfile,
};
use crate::error::{EngineError, Result};
use acred_common::config::RuleSetConfig;
use acred_common::time::now;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Days per year used to turn configured windows into durations
const DAYS_PER_YEAR: i64 = 365;

/// Largest experience or production window a rule set may declare
pub const MAX_WINDOW_YEARS: u32 = 200;

/// Built-in accreditations
pub const DEFAULT_ACCREDITATIONS: [&str; 4] = ["AACSB", "EQUIS", "AMBA", "ABET"];

const DEFAULT_EXPERIENCE_WINDOW_YEARS: u32 = 12;
const DEFAULT_PRODUCTION_WINDOW_YEARS: u32 = 5;
const DEFAULT_MIN_PRODUCTIONS: usize = 3;
const DEFAULT_MAX_PRODUCTIONS: usize = 10;

/// Filtering policy for one accreditation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    pub accreditation_id: String,
    pub experience_window: Duration,
    /// Productions inside this many years are preferred over older ones
    pub production_window_years: Option<u32>,
    pub min_production_count: usize,
    pub max_production_count: usize,
    pub version_tag: String,
}

impl RuleSet {
    /// Validate and build a rule set
    ///
    /// The id is stored uppercased. `max_production_count` below
    /// `min_production_count` is rejected here, never at evaluation time.
    pub fn new(
        accreditation_id: &str,
        experience_window_years: u32,
        production_window_years: Option<u32>,
        min_production_count: usize,
        max_production_count: usize,
        version_tag: &str,
    ) -> Result<Self> {
        let id = accreditation_id.trim().to_uppercase();
        if id.is_empty() {
            return Err(EngineError::InvalidRuleSet {
                id: accreditation_id.to_string(),
                reason: "accreditation id is empty".to_string(),
            });
        }
        if max_production_count < min_production_count {
            return Err(EngineError::InvalidRuleSet {
                id,
                reason: format!(
                    "max_production_count ({}) is smaller than min_production_count ({})",
                    max_production_count, min_production_count
                ),
            });
        }

        for (name, years) in [
            ("experience_window_years", Some(experience_window_years)),
            ("production_window_years", production_window_years),
        ] {
            if let Some(years) = years.filter(|y| *y > MAX_WINDOW_YEARS) {
                return Err(EngineError::InvalidRuleSet {
                    id: id.clone(),
                    reason: format!("{} ({}) exceeds {}", name, years, MAX_WINDOW_YEARS),
                });
            }
        }
        let experience_window =
            Duration::try_days(i64::from(experience_window_years) * DAYS_PER_YEAR).ok_or_else(
                || EngineError::InvalidRuleSet {
                    id: id.clone(),
                    reason: "experience window out of range".to_string(),
                },
            )?;

        Ok(Self {
            accreditation_id: id,
            experience_window,
            production_window_years,
            min_production_count,
            max_production_count,
            version_tag: version_tag.to_string(),
        })
    }

    pub fn from_config(config: &RuleSetConfig) -> Result<Self> {
        Self::new(
            &config.accreditation_id,
            config.experience_window_years,
            config.production_window_years,
            config.min_production_count,
            config.max_production_count,
            &config.version_tag,
        )
    }

    /// Built-in policy shared by the default accreditations
    pub fn default_for(accreditation_id: &str) -> Result<Self> {
        Self::new(
            accreditation_id,
            DEFAULT_EXPERIENCE_WINDOW_YEARS,
            Some(DEFAULT_PRODUCTION_WINDOW_YEARS),
            DEFAULT_MIN_PRODUCTIONS,
            DEFAULT_MAX_PRODUCTIONS,
            "default",
        )
    }
}

/// Registered rule sets keyed by uppercased accreditation id
#[derive(Debug, Clone)]
pub struct RuleBook {
    sets: HashMap<String, Arc<RuleSet>>,
}

impl RuleBook {
    /// Build from explicit rule sets; later entries replace earlier ones
    pub fn new(sets: Vec<RuleSet>) -> Self {
        let sets = sets
            .into_iter()
            .map(|set| (set.accreditation_id.clone(), Arc::new(set)))
            .collect();
        Self { sets }
    }

    /// Default rule sets overlaid with configured overrides
    pub fn from_config(overrides: &[RuleSetConfig]) -> Result<Self> {
        let mut sets = DEFAULT_ACCREDITATIONS
            .iter()
            .map(|id| RuleSet::default_for(id))
            .collect::<Result<Vec<_>>>()?;
        for config in overrides {
            sets.push(RuleSet::from_config(config)?);
        }
        Ok(Self::new(sets))
    }

    pub fn builtin() -> Result<Self> {
        Self::from_config(&[])
    }

    /// Look up a rule set, case-insensitively
    pub fn get(&self, accreditation_id: &str) -> Result<Arc<RuleSet>> {
        self.sets
            .get(&accreditation_id.trim().to_uppercase())
            .cloned()
            .ok_or_else(|| EngineError::UnknownRuleSet(accreditation_id.to_string()))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn apply(&self, profile: &SubjectProfile, accreditation_id: &str) -> Result<FilteredProfile> {
        let rule_set = self.get(accreditation_id)?;
        Ok(apply_rules(profile, &rule_set))
    }
}

/// Rule-filtered profile handed to artifact renderers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredProfile {
    pub subject_id: String,
    pub name: String,
    pub accreditation_id: String,
    pub rule_version: String,
    pub evaluated_at: DateTime<Utc>,
    pub basic_fields: BTreeMap<String, String>,
    pub education: Vec<EducationRecord>,
    pub accreditations: BTreeSet<String>,
    pub allocation: AllocationFields,
    pub experiences: Vec<ExperienceEntry>,
    pub productions: Vec<ProductionEntry>,
    /// Productions missing to reach the rule set's minimum, if any
    pub production_shortfall: Option<usize>,
}

/// Apply a rule set as of now
pub fn apply_rules(profile: &SubjectProfile, rule_set: &RuleSet) -> FilteredProfile {
    apply_rules_at(profile, rule_set, now())
}

/// Apply a rule set as of `now`
pub fn apply_rules_at(
    profile: &SubjectProfile,
    rule_set: &RuleSet,
    now: DateTime<Utc>,
) -> FilteredProfile {
    let experiences = filter_experiences(&profile.experiences, rule_set, now);
    let (productions, production_shortfall) =
        select_productions(&profile.productions, rule_set, now);

    debug!(
        subject = %profile.subject_id,
        accreditation = %rule_set.accreditation_id,
        experiences = experiences.len(),
        productions = productions.len(),
        "Applied rule set"
    );

    FilteredProfile {
        subject_id: profile.subject_id.clone(),
        name: profile.name.clone(),
        accreditation_id: rule_set.accreditation_id.clone(),
        rule_version: rule_set.version_tag.clone(),
        evaluated_at: now,
        basic_fields: profile.basic_fields.clone(),
        education: profile.education.clone(),
        accreditations: profile.accreditations.clone(),
        allocation: profile.allocation.clone(),
        experiences,
        productions,
        production_shortfall,
    }
}

/// Keep entries overlapping `[now - window, now]`; ongoing entries always stay
fn filter_experiences(
    entries: &[ExperienceEntry],
    rule_set: &RuleSet,
    now: DateTime<Utc>,
) -> Vec<ExperienceEntry> {
    let today = now.date_naive();
    // A window reaching past the calendar keeps every dated entry
    let cutoff = now
        .checked_sub_signed(rule_set.experience_window)
        .map_or(NaiveDate::MIN, |start| start.date_naive());

    entries
        .iter()
        .filter(|entry| match entry.end_date {
            None => true,
            Some(end) => end >= cutoff && entry.start_date.map_or(true, |start| start <= today),
        })
        .cloned()
        .collect()
}

/// Most recent first, window-preferred, clamped to `[min, max]` when possible
fn select_productions(
    entries: &[ProductionEntry],
    rule_set: &RuleSet,
    now: DateTime<Utc>,
) -> (Vec<ProductionEntry>, Option<usize>) {
    let mut valid: Vec<&ProductionEntry> = entries
        .iter()
        .filter(|entry| !entry.title.trim().is_empty())
        .collect();
    // Stable: equal years keep source order, unknown years go last
    valid.sort_by(|a, b| match (a.year, b.year) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let (preferred, older): (Vec<&ProductionEntry>, Vec<&ProductionEntry>) =
        match rule_set.production_window_years {
            Some(years) => {
                let first_year = i32::try_from(years)
                    .ok()
                    .and_then(|y| now.year().checked_sub(y))
                    .map_or(i32::MIN, |y| y + 1);
                valid
                    .into_iter()
                    .partition(|entry| entry.year.is_some_and(|y| y >= first_year))
            }
            None => (valid, Vec::new()),
        };

    let mut selected: Vec<ProductionEntry> = preferred
        .into_iter()
        .take(rule_set.max_production_count)
        .cloned()
        .collect();

    if selected.len() < rule_set.min_production_count {
        let missing = rule_set.min_production_count - selected.len();
        selected.extend(older.into_iter().take(missing).cloned());
    }

    let shortfall = rule_set
        .min_production_count
        .checked_sub(selected.len())
        .filter(|n| *n > 0);
    (selected, shortfall)
}
