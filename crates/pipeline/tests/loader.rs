use assert_matches::assert_matches;
use assetflow_db::models::pipeline_mod::CreatePipelineMod;
use assetflow_db::repositories::PipelineModRepo;
use assetflow_pipeline::loader::load_catalog;
use assetflow_pipeline::{resolve, PipelineError, Seed};
use serde_json::json;
use sqlx::PgPool;

async fn store(pool: &PgPool, name: &str, ops: serde_json::Value) {
    let input = CreatePipelineMod {
        name: name.to_string(),
        description: String::new(),
        provider: "assetflow".into(),
        category: "test".into(),
        mod_type: name.to_string(),
        supported_media: Vec::new(),
        ops,
        standard: false,
    };
    PipelineModRepo::create(pool, 1, &input).await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_catalog_includes_transitive_depends(pool: PgPool) {
    store(&pool, "root", json!([{"type": "DEPEND", "apply": ["mid"]}])).await;
    store(&pool, "mid", json!([{"type": "DEPEND", "apply": ["leaf"]}])).await;
    store(
        &pool,
        "leaf",
        json!([{"type": "APPEND", "apply": [{"class_name": "Leaf", "image": "core"}]}]),
    )
    .await;

    let catalog = load_catalog(&pool, 1, &["root".to_string()]).await.unwrap();
    assert_eq!(catalog.len(), 3);

    let resolved = resolve(&catalog, Seed::Empty, &["root".to_string()]).unwrap();
    assert_eq!(resolved.execute.len(), 1);
    assert_eq!(resolved.execute[0].class_name, "Leaf");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_missing_dependency_fails_load(pool: PgPool) {
    store(&pool, "root", json!([{"type": "DEPEND", "apply": ["ghost"]}])).await;

    let err = load_catalog(&pool, 1, &["root".to_string()]).await.unwrap_err();
    assert_matches!(err, PipelineError::UnknownModule(name) if name == "ghost");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_cyclic_modules_load_but_fail_resolution(pool: PgPool) {
    store(&pool, "a", json!([{"type": "DEPEND", "apply": ["b"]}])).await;
    store(&pool, "b", json!([{"type": "DEPEND", "apply": ["a"]}])).await;

    let catalog = load_catalog(&pool, 1, &["a".to_string()]).await.unwrap();
    let err = resolve(&catalog, Seed::Empty, &["a".to_string()]).unwrap_err();
    assert_matches!(err, PipelineError::DependencyCycle(_));
}
