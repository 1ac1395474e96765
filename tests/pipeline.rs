use std::path::Path;

use catalabel::artifact::{LayoutKind, ModelArtifact};
use catalabel::config::ConfigError;
use catalabel::features::FeatureConfig;
use catalabel::inference::{BatchInferenceRunner, InferenceOptions};
use catalabel::labeling::{KeywordLists, Polarity};
use catalabel::profile::{DomainProfile, LabelStage};
use catalabel::store::SqliteStore;
use catalabel::training::{HoldoutOutcome, TrainError, TrainOptions, train_stage};
use rusqlite::{Connection, params};
use tempfile::tempdir;

fn catalog_profile() -> DomainProfile {
    DomainProfile {
        name: "mart".to_string(),
        table: "CATALOG".to_string(),
        id_column: "PRODUCT_ID".to_string(),
        name_column: "PRODUCT_NAME".to_string(),
        stages: vec![
            LabelStage {
                name: "food".to_string(),
                label_column: "CLS_FOOD".to_string(),
                prerequisite: None,
                keywords: KeywordLists::new(["청소기", "세제"], ["쌀", "라면", "콩"]),
                polarity: Polarity::DOMINANT_NEGATIVE,
                features: FeatureConfig::food(),
            },
            LabelStage {
                name: "ingredient".to_string(),
                label_column: "CLS_ING".to_string(),
                prerequisite: Some("CLS_FOOD".to_string()),
                keywords: KeywordLists::new(["라면", "세트"], ["쌀", "콩", "두부"]),
                polarity: Polarity::DOMINANT_NEGATIVE,
                features: FeatureConfig::ingredient(),
            },
        ],
    }
}

fn open_catalog(path: &Path, rows: &[(i64, &str, Option<i64>)]) -> SqliteStore {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE CATALOG (
            PRODUCT_ID INTEGER PRIMARY KEY,
            PRODUCT_NAME TEXT,
            CLS_FOOD INTEGER,
            CLS_ING INTEGER
        );",
    )
    .unwrap();
    for (id, name, food) in rows {
        conn.execute(
            "INSERT INTO CATALOG (PRODUCT_ID, PRODUCT_NAME, CLS_FOOD) VALUES (?1, ?2, ?3)",
            params![id, name, food],
        )
        .unwrap();
    }
    drop(conn);
    SqliteStore::open(path).unwrap()
}

fn count(store: &SqliteStore, sql: &str) -> i64 {
    store.connection().query_row(sql, [], |row| row.get(0)).unwrap()
}

const CATALOG_ROWS: &[(i64, &str, Option<i64>)] = &[
    (1, "흰쌀 10kg", Some(1)),
    (2, "컵라면 세트", Some(1)),
    (3, "국산콩 1kg", Some(1)),
    (4, "라면 세트", Some(1)),
    (5, "무선 청소기", Some(0)),
    (6, "주방 세제", None),
    (7, "쌀 과자", None),
    (8, "햅쌀 20kg", None),
    (9, "세탁 세제 리필", None),
    (10, "블루투스 스피커", None),
    (11, "두부 300g", None),
];

#[test]
fn two_stage_run_respects_gate_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(&dir.path().join("catalog.db"), CATALOG_ROWS);
    let profile = catalog_profile();

    let food = train_stage(&mut store, &profile, &profile.stages[0], TrainOptions::default()).unwrap();
    assert_eq!(food.report.seed_sources.manual, 5);
    assert_eq!(food.report.seed_sources.rule, 4);
    let ingredient =
        train_stage(&mut store, &profile, &profile.stages[1], TrainOptions::default()).unwrap();
    assert_eq!(ingredient.report.rows_total, 4);

    let food_dir = dir.path().join("food");
    let ingredient_dir = dir.path().join("ingredient");
    std::fs::create_dir_all(&food_dir).unwrap();
    food.artifact.save(&food_dir, LayoutKind::Bundle).unwrap();
    ingredient.artifact.save(&ingredient_dir, LayoutKind::Split).unwrap();

    let options = InferenceOptions {
        batch_size: 4,
        dry_run: false,
    };
    let runner =
        BatchInferenceRunner::load(profile.clone(), &[food_dir, ingredient_dir], options).unwrap();
    let first = runner.run(&mut store).unwrap();
    assert_eq!(first[0].rows_predicted, 6);
    assert_eq!(first[0].rows_updated, 6);
    assert_eq!(first[0].batches, 2);
    assert!(first[1].rows_updated >= 4);

    assert_eq!(count(&store, "SELECT COUNT(*) FROM CATALOG WHERE CLS_FOOD IS NULL"), 0);
    assert_eq!(
        count(
            &store,
            "SELECT COUNT(*) FROM CATALOG WHERE CLS_ING IS NOT NULL AND CLS_FOOD IS NOT 1"
        ),
        0
    );
    assert_eq!(
        count(&store, "SELECT CLS_FOOD FROM CATALOG WHERE PRODUCT_ID = 5"),
        0
    );

    let second = runner.run(&mut store).unwrap();
    assert!(second.iter().all(|summary| summary.rows_updated == 0));
    assert!(second.iter().all(|summary| summary.batches == 0));
}

#[test]
fn dry_run_leaves_labels_null() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(&dir.path().join("catalog.db"), CATALOG_ROWS);
    let mut profile = catalog_profile();
    profile.stages.truncate(1);
    let food = train_stage(&mut store, &profile, &profile.stages[0], TrainOptions::default()).unwrap();
    let runner = BatchInferenceRunner::new(
        profile,
        vec![food.artifact],
        InferenceOptions {
            batch_size: 2,
            dry_run: true,
        },
    )
    .unwrap();
    let summary = runner.run(&mut store).unwrap().remove(0);
    assert_eq!(summary.rows_predicted, 6);
    assert_eq!(summary.rows_updated, 0);
    assert_eq!(summary.batches, 3);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM CATALOG WHERE CLS_FOOD IS NULL"), 6);
}

#[test]
fn two_seed_rows_and_strict_threshold_train_on_seeds_only() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(
        &dir.path().join("catalog.db"),
        &[
            (1, "흰쌀20kg", None),
            (2, "컵라면24개세트", None),
            (3, "국산콩", None),
            (4, "즉석국 떡국세트", None),
        ],
    );
    let mut profile = catalog_profile();
    profile.stages.remove(0);
    profile.stages[0].prerequisite = None;
    profile.stages[0].keywords = KeywordLists::new(["컵라면"], ["흰쌀"]);

    let options = TrainOptions {
        conf_threshold: 0.99,
        ..TrainOptions::default()
    };
    let outcome = train_stage(&mut store, &profile, &profile.stages[0], options).unwrap();
    assert_eq!(outcome.report.final_corpus_size, 2);
    assert_eq!(outcome.report.pseudo_candidates, 2);
    assert_eq!(outcome.report.pseudo_accepted, 0);
    assert!(matches!(outcome.report.holdout, HoldoutOutcome::Skipped { .. }));
    assert_eq!(outcome.artifact.metadata().corpus_size, 2);

    let labeled = outcome.labeled_rows();
    assert_eq!(labeled.len(), 4);
    assert!(labeled.iter().all(|row| (0.0..=1.0).contains(&row.confidence)));
}

#[test]
fn pseudo_label_at_exactly_the_threshold_is_accepted() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(&dir.path().join("catalog.db"), CATALOG_ROWS);
    let mut profile = catalog_profile();
    profile.stages.truncate(1);
    let stage = &profile.stages[0];

    let strict = TrainOptions {
        conf_threshold: 1.0,
        ..TrainOptions::default()
    };
    let probe = train_stage(&mut store, &profile, stage, strict).unwrap();
    let best = probe
        .pseudo_labels
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .unwrap()
        .clone();

    let at_boundary = TrainOptions {
        conf_threshold: best.confidence,
        ..TrainOptions::default()
    };
    let outcome = train_stage(&mut store, &profile, stage, at_boundary).unwrap();
    let same = outcome
        .pseudo_labels
        .iter()
        .find(|pseudo| pseudo.id == best.id)
        .unwrap();
    assert_eq!(same.confidence, best.confidence);
    assert!(same.accepted);
    assert_eq!(
        outcome.report.final_corpus_size,
        probe.report.final_corpus_size - probe.report.pseudo_accepted
            + outcome.report.pseudo_accepted
    );
}

#[test]
fn single_class_seed_aborts_without_artifact() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(
        &dir.path().join("catalog.db"),
        &[(1, "무선 청소기", None), (2, "주방 세제", None), (3, "블루투스 스피커", None)],
    );
    let profile = catalog_profile();
    let out = dir.path().join("model.json");
    let result = train_stage(&mut store, &profile, &profile.stages[0], TrainOptions::default())
        .and_then(|outcome| {
            outcome
                .artifact
                .save(&out, LayoutKind::Bundle)
                .map_err(catalabel::Error::from)
        });
    assert!(matches!(
        result,
        Err(catalabel::Error::Data(TrainError::DegenerateLabels {
            distinct: 1,
            seed_rows: 2
        }))
    ));
    assert!(!out.exists());
}

#[test]
fn invalid_identifier_is_a_config_error() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(&dir.path().join("catalog.db"), CATALOG_ROWS);
    let mut profile = catalog_profile();
    profile.stages[0].label_column = "CLS_FOOD; DROP TABLE CATALOG".to_string();
    let err = train_stage(&mut store, &profile, &profile.stages[0], TrainOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        catalabel::Error::Config(ConfigError::InvalidIdentifier(_))
    ));
}

#[test]
fn saved_artifact_predicts_like_the_trained_one() {
    let dir = tempdir().unwrap();
    let mut store = open_catalog(&dir.path().join("catalog.db"), CATALOG_ROWS);
    let profile = catalog_profile();
    let outcome =
        train_stage(&mut store, &profile, &profile.stages[1], TrainOptions::default()).unwrap();
    let path = dir.path().join("ingredient.json");
    outcome.artifact.save(&path, LayoutKind::Bundle).unwrap();
    let loaded = ModelArtifact::load(&path).unwrap();
    let names = ["유기농 현미", "짜장 라면 세트", "국산 두부"];
    assert_eq!(
        loaded.predict_with_confidence(&names),
        outcome.artifact.predict_with_confidence(&names)
    );
    assert_eq!(loaded.metadata(), outcome.artifact.metadata());
}
