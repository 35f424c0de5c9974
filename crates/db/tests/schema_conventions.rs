//! Schema-wide conventions checked against `information_schema`.

use sqlx::PgPool;

async fn base_tables(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT table_name::TEXT
         FROM information_schema.tables
         WHERE table_schema = 'public'
           AND table_type = 'BASE TABLE'
           AND table_name != '_sqlx_migrations'
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Entity ids are BIGINT, lookup-table ids SMALLINT.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_id_columns_are_bigint_or_smallint(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name::TEXT, data_type::TEXT
         FROM information_schema.columns
         WHERE column_name = 'id'
           AND table_schema = 'public'
           AND table_name != '_sqlx_migrations'
         ORDER BY table_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for (table, data_type) in &rows {
        let expected = if table.ends_with("_states") || table.ends_with("_types") {
            "smallint"
        } else {
            "bigint"
        };
        assert_eq!(data_type, expected, "{table}.id has type {data_type}");
    }
}

/// Every `*state_id` / `*type_id` column references a SMALLINT lookup id.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_status_columns_are_smallint(pool: PgPool) {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT table_name::TEXT, column_name::TEXT, data_type::TEXT
         FROM information_schema.columns
         WHERE table_schema = 'public'
           AND (column_name LIKE '%state_id' OR column_name LIKE '%type_id' OR column_name = 'lock_id')
         ORDER BY table_name, column_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!rows.is_empty());
    for (table, column, data_type) in &rows {
        assert_eq!(data_type, "smallint", "{table}.{column} should be smallint");
    }
}

/// Every table carries `created_at`/`updated_at` as timestamptz and keeps
/// `updated_at` current through a trigger.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_tables_have_maintained_timestamps(pool: PgPool) {
    for table in base_tables(&pool).await {
        for col in ["created_at", "updated_at"] {
            let data_type: Option<String> = sqlx::query_scalar(
                "SELECT data_type::TEXT
                 FROM information_schema.columns
                 WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2",
            )
            .bind(&table)
            .bind(col)
            .fetch_optional(&pool)
            .await
            .unwrap();

            let data_type = data_type.unwrap_or_else(|| panic!("{table} is missing {col}"));
            assert_eq!(data_type, "timestamp with time zone", "{table}.{col}");
        }

        let has_trigger: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.triggers
                WHERE event_object_table = $1
                  AND action_statement LIKE '%set_updated_at%'
            )",
        )
        .bind(&table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(has_trigger, "{table} has no set_updated_at trigger");
    }
}

/// Free text is stored as TEXT, never VARCHAR.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_no_varchar_columns(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name::TEXT, column_name::TEXT
         FROM information_schema.columns
         WHERE table_schema = 'public'
           AND data_type = 'character varying'
           AND table_name != '_sqlx_migrations'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(rows.is_empty(), "VARCHAR columns found: {rows:?}");
}

/// Every foreign key column is the leading column of some index and has an
/// explicit delete rule.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_foreign_keys_are_indexed_with_explicit_rules(pool: PgPool) {
    let fks: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT DISTINCT tc.table_name::TEXT, kcu.column_name::TEXT, rc.delete_rule::TEXT
         FROM information_schema.table_constraints tc
         JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
         JOIN information_schema.referential_constraints rc
             ON rc.constraint_name = tc.constraint_name
             AND rc.constraint_schema = tc.table_schema
         WHERE tc.constraint_type = 'FOREIGN KEY'
           AND tc.table_schema = 'public'
         ORDER BY 1, 2",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!fks.is_empty());
    for (table, column, delete_rule) in &fks {
        let indexed: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM pg_indexes
                WHERE schemaname = 'public'
                  AND tablename = $1
                  AND indexdef LIKE '%(' || $2::TEXT || '%'
            )",
        )
        .bind(table)
        .bind(column)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(indexed, "FK column {table}.{column} has no index");
        assert_ne!(delete_rule, "NO ACTION", "FK {table}.{column} has no ON DELETE rule");
    }
}

/// Unique constraints follow the `uq_` prefix so API error mapping can
/// recognise them.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unique_constraints_use_uq_prefix(pool: PgPool) {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT indexname::TEXT FROM pg_indexes
         WHERE schemaname = 'public'
           AND indexdef LIKE 'CREATE UNIQUE%'
           AND indexname NOT LIKE '%_pkey'
           AND tablename != '_sqlx_migrations'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!names.is_empty());
    for name in &names {
        assert!(name.starts_with("uq_"), "unique index {name} lacks the uq_ prefix");
    }
}
