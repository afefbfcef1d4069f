// src/database.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::store::postgres::CHANGE_CHANNEL;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Creates the document table and the change-notification trigger if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let notify_fn = format!(
        r#"CREATE OR REPLACE FUNCTION notify_documents_changed() RETURNS trigger AS $$
        BEGIN
            IF TG_OP = 'DELETE' THEN
                PERFORM pg_notify('{CHANGE_CHANNEL}', OLD.collection);
            ELSE
                PERFORM pg_notify('{CHANGE_CHANNEL}', NEW.collection);
            END IF;
            RETURN NULL;
        END;
        $$ LANGUAGE plpgsql"#
    );

    let statements = [
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data JSONB NOT NULL DEFAULT '{}'::jsonb,
            PRIMARY KEY (collection, id)
        )",
        notify_fn.as_str(),
        "DROP TRIGGER IF EXISTS documents_changed ON documents",
        "CREATE TRIGGER documents_changed
            AFTER INSERT OR UPDATE OR DELETE ON documents
            FOR EACH ROW EXECUTE FUNCTION notify_documents_changed()",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("document schema ready");
    Ok(())
}
