use assetflow_db::models::pipeline_mod::{CreatePipelineMod, UpdatePipelineMod};
use assetflow_db::repositories::PipelineModRepo;
use serde_json::json;
use sqlx::PgPool;

fn new_mod(name: &str, standard: bool, ops: serde_json::Value) -> CreatePipelineMod {
    CreatePipelineMod {
        name: name.to_string(),
        description: String::new(),
        provider: "assetflow".into(),
        category: "vision".into(),
        mod_type: "labels".into(),
        supported_media: vec!["image".into()],
        ops,
        standard,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_project_module_shadows_standard(pool: PgPool) {
    let standard = PipelineModRepo::create(&pool, 7, &new_mod("labels", true, json!([])))
        .await
        .unwrap();
    assert_eq!(standard.project_id, None);

    let own_ops = json!([{"type": "APPEND"}]);
    let own = PipelineModRepo::create(&pool, 7, &new_mod("labels", false, own_ops))
        .await
        .unwrap();
    assert_eq!(own.project_id, Some(7));

    let found = PipelineModRepo::find_by_names(&pool, 7, &["labels".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, own.id);

    // Another project only sees the standard module.
    let found = PipelineModRepo::find_by_names(&pool, 8, &["labels".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, standard.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_name_in_project_is_rejected(pool: PgPool) {
    PipelineModRepo::create(&pool, 1, &new_mod("faces", false, json!([])))
        .await
        .unwrap();
    let err = PipelineModRepo::create(&pool, 1, &new_mod("faces", false, json!([])))
        .await
        .unwrap_err();
    let db_err = err.as_database_error().expect("database error");
    assert_eq!(db_err.code().as_deref(), Some("23505"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_missing_names_are_absent(pool: PgPool) {
    PipelineModRepo::create(&pool, 1, &new_mod("ocr", true, json!([])))
        .await
        .unwrap();
    let found = PipelineModRepo::find_by_names(&pool, 1, &["ocr".into(), "nope".into()])
        .await
        .unwrap();
    let names: Vec<&str> = found.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["ocr"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_and_delete_are_project_scoped(pool: PgPool) {
    let own = PipelineModRepo::create(&pool, 1, &new_mod("color", false, json!([])))
        .await
        .unwrap();

    let update = UpdatePipelineMod {
        description: Some("dominant colours".into()),
        ..Default::default()
    };
    assert!(PipelineModRepo::update(&pool, 2, own.id, &update).await.unwrap().is_none());
    let updated = PipelineModRepo::update(&pool, 1, own.id, &update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.description, "dominant colours");
    assert_eq!(updated.mod_type, "labels");

    assert!(!PipelineModRepo::delete(&pool, 2, own.id).await.unwrap());
    assert!(PipelineModRepo::delete(&pool, 1, own.id).await.unwrap());
    assert!(PipelineModRepo::list(&pool, 1).await.unwrap().is_empty());
}
