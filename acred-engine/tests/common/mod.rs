//! Shared fixtures for acred-engine integration tests

#![allow(dead_code)]

use acred_common::db::init_database;
use acred_engine::cache::ResultCache;
use acred_engine::ingest::load_full;
use acred_engine::registry::{
    DatasetSpec, SchemaRegistry, ALLOCATION_DETAIL_TABLE, ALLOCATION_MATRIX_TABLE,
    EXPERIENCE_TABLE, PRODUCTION_TABLE, SUBJECT_TABLE,
};
use acred_engine::rules::RuleBook;
use acred_engine::EngineState;
use std::time::Duration;
use tempfile::TempDir;

/// Fresh engine over a throwaway database with the built-in registry
pub async fn setup(cache_ttl: Duration) -> (TempDir, EngineState) {
    setup_with_registry(SchemaRegistry::builtin().unwrap(), cache_ttl).await
}

pub async fn setup_with_registry(
    registry: SchemaRegistry,
    cache_ttl: Duration,
) -> (TempDir, EngineState) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("acred.db")).await.unwrap();
    let state = EngineState::new(
        pool,
        registry,
        RuleBook::builtin().unwrap(),
        ResultCache::new(cache_ttl),
        50,
    );
    (dir, state)
}

/// Semicolon-separated file for `columns`; unspecified cells stay empty
pub fn csv_from(columns: &[String], rows: &[Vec<(&str, &str)>]) -> Vec<u8> {
    let mut out = columns.join(";");
    out.push('\n');
    for row in rows {
        let cells: Vec<&str> = columns
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, value)| *value)
                    .unwrap_or("")
            })
            .collect();
        out.push_str(&cells.join(";"));
        out.push('\n');
    }
    out.into_bytes()
}

pub fn spec(state: &EngineState, table: &str) -> std::sync::Arc<DatasetSpec> {
    state.registry.resolve(table).unwrap()
}

pub fn subject_file(state: &EngineState) -> Vec<u8> {
    csv_from(
        &spec(state, SUBJECT_TABLE).expected_columns,
        &[
            vec![
                ("id", "1"),
                ("nome_padrao", "José da Silva"),
                ("area", "FIN"),
                ("unid_acad", "EBAPE"),
                ("t_dout_en", "PhD in Finance"),
                ("t_dout_ies", "FGV"),
                ("t_dout_ano", "2010"),
                ("t_dout_pais_en", "Brazil"),
            ],
            vec![
                ("id", "2"),
                ("nome_padrao", "Ana Souza"),
                ("nova_area", "Strategy"),
                ("tit_maxima", "Master"),
            ],
            vec![
                ("id", "3"),
                ("nome_padrao", "Carlos Lima"),
                ("area", "MKT"),
            ],
        ],
    )
}

pub fn experience_file(state: &EngineState) -> Vec<u8> {
    csv_from(
        &spec(state, EXPERIENCE_TABLE).expected_columns,
        &[
            vec![
                ("id", "1"),
                ("cargo_role", "Analyst"),
                ("empresa_company", "Bank A"),
                ("inicio", "01/03/2015"),
                ("fim", "31/12/2018"),
                ("idioma", "EN"),
            ],
            vec![
                ("id", "1"),
                ("cargo_role", "Director"),
                ("empresa_company", "Bank B"),
                ("inicio", "01/01/2019"),
            ],
            vec![
                ("id", "1"),
                ("cargo_role", "Gerente"),
                ("empresa_company", "Banco C"),
                ("inicio", "01/01/2010"),
                ("fim", "01/01/2012"),
                ("idioma", "PT"),
            ],
            vec![
                ("id", "2"),
                ("cargo_role", "Consultant"),
                ("inicio", "SEM INFORMAÇÃO"),
                ("fim", "NSA"),
                ("idioma", "EN"),
            ],
        ],
    )
}

pub fn production_file(state: &EngineState) -> Vec<u8> {
    let mut bytes = b"Relatorio gerado em 2025\n".to_vec();
    bytes.extend(csv_from(
        &spec(state, PRODUCTION_TABLE).expected_columns,
        &[
            vec![
                ("professor", "JOSE DA SILVA"),
                ("ano", "2023"),
                ("titulo", "Paper A"),
                ("tipo", "Article"),
                ("status_savi", "Validado"),
                ("status_biblioteca", "Catalogado"),
                ("fonte_da_evidencia", "Scopus"),
                ("informacao_cv_lattes", "Qualis A1"),
            ],
            vec![("professor", "josé da silva"), ("ano", "2021"), ("titulo", "Paper B"), ("tipo", "Book")],
            vec![("professor", "Jose da Silva"), ("ano", "2020"), ("tipo", "Article")],
            vec![("professor", "Ana Souza"), ("ano", "2022"), ("titulo", "Paper C")],
        ],
    ));
    bytes
}

pub fn allocation_detail_file(state: &EngineState) -> Vec<u8> {
    let mut bytes = b"Relatorio de alocacao 2026.1\n".to_vec();
    bytes.extend(csv_from(
        &spec(state, ALLOCATION_DETAIL_TABLE).expected_columns,
        &[
            vec![("nome_completo", "José da Silva"), ("disciplina", "Corporate Finance")],
            vec![("nome_completo", "JOSE DA SILVA"), ("disciplina", "Valuation")],
            vec![("nome_completo", "Ana Souza"), ("disciplina", "Marketing I")],
        ],
    ));
    bytes
}

pub fn allocation_matrix_file(state: &EngineState) -> Vec<u8> {
    csv_from(
        &spec(state, ALLOCATION_MATRIX_TABLE).expected_columns,
        &[
            vec![("disciplina", "Corporate Finance"), ("aacsb", "SIM"), ("equis", "NAO")],
            vec![("disciplina", "Valuation"), ("equis", "yes")],
            vec![("disciplina", "Marketing I"), ("abet", "1")],
        ],
    )
}

/// Load every built-in dataset with the fixtures above
pub async fn load_all(state: &EngineState) {
    let files = [
        (SUBJECT_TABLE, subject_file(state)),
        (EXPERIENCE_TABLE, experience_file(state)),
        (PRODUCTION_TABLE, production_file(state)),
        (ALLOCATION_DETAIL_TABLE, allocation_detail_file(state)),
        (ALLOCATION_MATRIX_TABLE, allocation_matrix_file(state)),
    ];
    for (table, bytes) in files {
        let spec = spec(state, table);
        load_full(state, &spec, &format!("{}.csv", table), &bytes)
            .await
            .unwrap();
    }
}
