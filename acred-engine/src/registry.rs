//! Schema registry
//!
//! Static declarations of every ingestible dataset. Lookups by name or
//! alias go through the same normalization as column headers, so
//! `"Alocacao_2026 1"` and `"alocacao-2026-1"` find the same spec.

use crate::error::{EngineError, Result};
use crate::sanitize::normalize_token;
use acred_common::db::ARTIFACT_TABLE;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Subject table
pub const SUBJECT_TABLE: &str = "base_de_dados_docente";
/// Professional experience table
pub const EXPERIENCE_TABLE: &str = "docentes_experiencia_profissional";
/// Research production table
pub const PRODUCTION_TABLE: &str = "docentes_producao";
/// Per-discipline allocation detail
pub const ALLOCATION_DETAIL_TABLE: &str = "alocacao_2026_1_reldetalhe";
/// Discipline accreditation matrix
pub const ALLOCATION_MATRIX_TABLE: &str = "alocacao_26_1";

/// Schema declaration for one ingestible table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    /// Canonical table name (already a sanitized identifier)
    pub canonical_name: String,
    /// Extra names accepted by `resolve`, stored normalized
    pub aliases: BTreeSet<String>,
    /// Expected column set, in storage order
    pub expected_columns: Vec<String>,
    /// Columns identifying a row for merge dedup; empty means full-row
    pub key_columns: Vec<String>,
    /// Non-data lines preceding the header row in the source file
    pub preamble_rows: usize,
    /// File name used by bootstrap loads
    pub source_file: String,
}

impl DatasetSpec {
    pub fn new(canonical_name: &str, source_file: &str, expected_columns: &[&str]) -> Self {
        Self {
            canonical_name: canonical_name.to_string(),
            aliases: BTreeSet::new(),
            expected_columns: expected_columns.iter().map(|c| c.to_string()).collect(),
            key_columns: Vec::new(),
            preamble_rows: 0,
            source_file: source_file.to_string(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases
            .extend(aliases.iter().map(|a| normalize_token(a)).filter(|a| !a.is_empty()));
        self
    }

    pub fn with_key(mut self, key_columns: &[&str]) -> Self {
        self.key_columns = key_columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_preamble(mut self, rows: usize) -> Self {
        self.preamble_rows = rows;
        self
    }

    /// Every normalized name this spec answers to
    ///
    /// Includes the canonical name and the source file stem.
    pub fn lookup_names(&self) -> BTreeSet<String> {
        let mut names = self.aliases.clone();
        names.insert(normalize_token(&self.canonical_name));
        if let Some(stem) = Path::new(&self.source_file).file_stem() {
            let stem = normalize_token(&stem.to_string_lossy());
            if !stem.is_empty() {
                names.insert(stem);
            }
        }
        names
    }

    /// Exact set comparison between received and expected columns
    ///
    /// Order is not significant. Both difference lists are sorted so the
    /// error reads the same for every run.
    pub fn validate_columns(&self, received: &[String]) -> Result<()> {
        let expected: HashSet<&str> = self.expected_columns.iter().map(String::as_str).collect();
        let actual: HashSet<&str> = received.iter().map(String::as_str).collect();

        let mut missing: Vec<String> = expected
            .difference(&actual)
            .map(|c| c.to_string())
            .collect();
        let mut unexpected: Vec<String> = actual
            .difference(&expected)
            .map(|c| c.to_string())
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }

        missing.sort();
        unexpected.sort();
        Err(EngineError::ColumnMismatch {
            table: self.canonical_name.clone(),
            missing,
            unexpected,
        })
    }
}

/// Immutable name/alias → spec map built once at startup
#[derive(Debug)]
pub struct SchemaRegistry {
    specs: Vec<Arc<DatasetSpec>>,
    by_name: HashMap<String, Arc<DatasetSpec>>,
}

impl SchemaRegistry {
    /// Build a registry, rejecting alias collisions across specs
    pub fn new(specs: Vec<DatasetSpec>) -> Result<Self> {
        let specs: Vec<Arc<DatasetSpec>> = specs.into_iter().map(Arc::new).collect();
        let mut by_name: HashMap<String, Arc<DatasetSpec>> = HashMap::new();

        for spec in &specs {
            if spec.canonical_name == ARTIFACT_TABLE {
                return Err(EngineError::DuplicateAlias {
                    alias: spec.canonical_name.clone(),
                    first: ARTIFACT_TABLE.to_string(),
                    second: spec.canonical_name.clone(),
                });
            }

            for name in spec.lookup_names() {
                match by_name.get(&name) {
                    Some(existing) if existing.canonical_name != spec.canonical_name => {
                        return Err(EngineError::DuplicateAlias {
                            alias: name,
                            first: existing.canonical_name.clone(),
                            second: spec.canonical_name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        by_name.insert(name, Arc::clone(spec));
                    }
                }
            }
        }

        Ok(Self { specs, by_name })
    }

    /// Registry with the built-in dataset catalogue
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_specs())
    }

    /// Resolve a table key or alias
    pub fn resolve(&self, name_or_alias: &str) -> Result<Arc<DatasetSpec>> {
        let key = normalize_token(name_or_alias);
        self.by_name
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::SchemaNotFound {
                key: name_or_alias.to_string(),
                valid: self.canonical_names(),
            })
    }

    /// Registered specs in declaration order
    pub fn specs(&self) -> &[Arc<DatasetSpec>] {
        &self.specs
    }

    pub fn canonical_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.canonical_name.clone()).collect()
    }
}

/// Built-in dataset catalogue
pub fn builtin_specs() -> Vec<DatasetSpec> {
    vec![
        DatasetSpec::new(
            SUBJECT_TABLE,
            "base-de-dados-docente.csv",
            &[
                "id",
                "nome_padrao",
                "email",
                "nacionalidade",
                "area",
                "nova_area",
                "unid_acad",
                "carreira",
                "carreira_en",
                "core_non_core",
                "vertente",
                "regime",
                "vinculo",
                "qualif_descricao_2026_2027",
                "engajamento_descricao",
                "admissao",
                "tit_maxima",
                "time_mission",
                "fte",
                "ch_total_ano_vigente",
                "titulo_valido_brasil",
                "exp_prof",
                "exp_int",
                "ch_ed_ex_ano_vigente",
                "aacsb_2025",
                "alocacao_2025",
                "t_dout_en",
                "t_dout_ies",
                "t_dout_ano",
                "t_dout_pais_en",
                "t_mestrado_en",
                "t_mestrado_ies",
                "t_mestrado_ano",
                "t_mestrado_pais_en",
                "scholar",
                "scopus",
                "orcid",
                "lattes",
                "linkedin",
                "site_pessoal",
            ],
        )
        .with_key(&["id"]),
        DatasetSpec::new(
            EXPERIENCE_TABLE,
            "docentes-experiencia-profissional.csv",
            &[
                "id",
                "cargo_role",
                "empresa_company",
                "cidade_city",
                "pais_country",
                "categoria_prof_res_tch",
                "inicio",
                "fim",
                "idioma",
            ],
        ),
        DatasetSpec::new(
            PRODUCTION_TABLE,
            "producao_docentes_detalhado.csv",
            &[
                "professor",
                "ano",
                "titulo",
                "tipo",
                "veiculo_ou_natureza",
                "classificacao",
                "revisao",
                "status_savi",
                "status_biblioteca",
                "fonte_da_evidencia",
                "informacao_cv_lattes",
            ],
        )
        .with_preamble(1),
        DatasetSpec::new(
            ALLOCATION_DETAIL_TABLE,
            "alocacao_2026_1_reldetalhe.csv",
            &["nome_completo", "disciplina"],
        )
        .with_preamble(1)
        .with_aliases(&[
            "alocacao_2026_1",
            "alocacao_detalhe",
            "alocacao_relatorio",
            "alocacao_reldetalhe",
        ]),
        DatasetSpec::new(
            ALLOCATION_MATRIX_TABLE,
            "alocacao_26_1.csv",
            &["disciplina", "aacsb", "equis", "amba", "abet"],
        )
        .with_key(&["disciplina"])
        .with_aliases(&["alocacao", "alocacao_matriz", "alocacao_selos"]),
    ]
}
