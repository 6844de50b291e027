//! Artifact metadata and accreditation batch runs
//!
//! Renderers turn a `FilteredProfile` into a document; this module records
//! what was generated (in `artifact_records`, separate from subject data)
//! and provides the JSON batch run used by the CLI.

use crate::consolidate::build_profile;
use crate::error::{EngineError, Result};
use crate::registry::SUBJECT_TABLE;
use crate::rules::{apply_rules, FilteredProfile};
use crate::EngineState;
use acred_common::db::table_exists;
use acred_common::text::fold_diacritics;
use acred_common::time::{from_storage_string, to_storage_string};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// One generated artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub guid: String,
    pub subject_id: String,
    pub accreditation_id: String,
    pub path: String,
    pub generated_at: DateTime<Utc>,
}

/// Artifact count for one accreditation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccreditationStatus {
    pub accreditation_id: String,
    pub artifacts: i64,
    pub last_generated_at: Option<DateTime<Utc>>,
}

/// Record that an artifact was generated
///
/// `generated_at` is kept at second precision, as stored.
pub async fn record_artifact_metadata(
    state: &EngineState,
    subject_id: &str,
    accreditation_id: &str,
    path: &Path,
    generated_at: DateTime<Utc>,
) -> Result<ArtifactRecord> {
    let record = ArtifactRecord {
        guid: Uuid::new_v4().to_string(),
        subject_id: subject_id.trim().to_string(),
        accreditation_id: accreditation_id.trim().to_uppercase(),
        path: path.to_string_lossy().into_owned(),
        generated_at: generated_at.trunc_subsecs(0),
    };

    sqlx::query(
        r#"
        INSERT INTO artifact_records (guid, subject_id, accreditation_id, path, generated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.guid)
    .bind(&record.subject_id)
    .bind(&record.accreditation_id)
    .bind(&record.path)
    .bind(to_storage_string(&record.generated_at))
    .execute(&state.db)
    .await?;

    Ok(record)
}

/// Recorded artifacts, newest first, optionally for one accreditation
pub async fn list_artifacts(
    state: &EngineState,
    accreditation_id: Option<&str>,
) -> Result<Vec<ArtifactRecord>> {
    let rows: Vec<(String, String, String, String, String)> = match accreditation_id {
        Some(id) => {
            sqlx::query_as(
                r#"
                SELECT guid, subject_id, accreditation_id, path, generated_at
                FROM artifact_records
                WHERE accreditation_id = ?
                ORDER BY generated_at DESC, rowid DESC
                "#,
            )
            .bind(id.trim().to_uppercase())
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT guid, subject_id, accreditation_id, path, generated_at
                FROM artifact_records
                ORDER BY generated_at DESC, rowid DESC
                "#,
            )
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(rows
        .into_iter()
        .filter_map(|(guid, subject_id, accreditation_id, path, generated_at)| {
            let Some(generated_at) = from_storage_string(&generated_at) else {
                warn!(guid = %guid, value = %generated_at, "Skipping artifact with unreadable timestamp");
                return None;
            };
            Some(ArtifactRecord {
                guid,
                subject_id,
                accreditation_id,
                path,
                generated_at,
            })
        })
        .collect())
}

/// Distinct accreditations with artifact counts
pub async fn artifact_status(state: &EngineState) -> Result<Vec<AccreditationStatus>> {
    let rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT accreditation_id, COUNT(*), MAX(generated_at)
        FROM artifact_records
        GROUP BY accreditation_id
        ORDER BY accreditation_id
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(accreditation_id, artifacts, last)| AccreditationStatus {
            accreditation_id,
            artifacts,
            last_generated_at: last.as_deref().and_then(from_storage_string),
        })
        .collect())
}

/// Build, filter and write one JSON artifact per subject
///
/// With no `subject_ids`, every subject in the subject table is processed.
/// Subjects that cannot be consolidated are skipped with a warning.
pub async fn run_accreditation(
    state: &EngineState,
    accreditation_id: &str,
    subject_ids: &[String],
    output_dir: &Path,
) -> Result<Vec<ArtifactRecord>> {
    let rule_set = state.rules.get(accreditation_id)?;

    let subject_ids = if subject_ids.is_empty() {
        all_subject_ids(state).await?
    } else {
        subject_ids.to_vec()
    };

    let target_dir = output_dir.join(rule_set.accreditation_id.to_lowercase());
    tokio::fs::create_dir_all(&target_dir).await?;

    let mut records = Vec::new();
    for subject_id in &subject_ids {
        let profile = match build_profile(state, subject_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(subject = %subject_id, error = %e, "Skipping subject");
                continue;
            }
        };

        let filtered = apply_rules(&profile, &rule_set);
        let path = artifact_path(&target_dir, &filtered);
        write_json(&path, &filtered).await?;

        let record = record_artifact_metadata(
            state,
            &filtered.subject_id,
            &filtered.accreditation_id,
            &path,
            filtered.evaluated_at,
        )
        .await?;
        records.push(record);
    }

    info!(
        accreditation = %rule_set.accreditation_id,
        generated = records.len(),
        requested = subject_ids.len(),
        "Accreditation run complete"
    );
    Ok(records)
}

async fn all_subject_ids(state: &EngineState) -> Result<Vec<String>> {
    let mut conn = state.db.acquire().await?;
    if !table_exists(&mut *conn, SUBJECT_TABLE).await? {
        return Err(EngineError::TableNotLoaded(SUBJECT_TABLE.to_string()));
    }
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT TRIM(id) FROM base_de_dados_docente
        WHERE TRIM(COALESCE(id, '')) <> ''
        GROUP BY TRIM(id)
        ORDER BY MIN(rowid)
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

fn artifact_path(dir: &Path, profile: &FilteredProfile) -> PathBuf {
    dir.join(format!(
        "{}_{}.json",
        slugify(&profile.subject_id),
        slugify(&profile.name)
    ))
}

async fn write_json(path: &Path, profile: &FilteredProfile) -> Result<()> {
    let json = serde_json::to_vec_pretty(profile)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// File-name-safe slug: lowercase alphanumerics joined by single dashes
pub fn slugify(text: &str) -> String {
    let folded = fold_diacritics(text).to_lowercase();
    let slug = folded
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "subject".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("José da Silva"), "jose-da-silva");
        assert_eq!(slugify("  --Ana  Lúcia-- "), "ana-lucia");
        assert_eq!(slugify("***"), "subject");
    }
}
