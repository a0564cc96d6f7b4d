/// ディレクトリ単位のSQLバッチ実行
use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::infrastructure::{Database, DatabaseError, SqlLoaderError, collect_sql_queries};

#[derive(Debug, Error)]
pub enum SqlBatchError {
    #[error(transparent)]
    Loader(#[from] SqlLoaderError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// `dir`内の全`.sql`ファイルを1トランザクションで実行
///
/// クエリ名 → `"<N> rows affected."` を返す。
pub async fn run_sql_directory(
    database: &Database,
    dir: &Path,
) -> Result<BTreeMap<String, String>, SqlBatchError> {
    let queries = collect_sql_queries(dir).await?;
    let results = database.execute_queries(&queries).await?;
    info!(dir = %dir.display(), "Ran {} queries", results.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_sql_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db").to_string_lossy())
            .await
            .unwrap();
        db.execute_query("CREATE TABLE tags (slug TEXT, meta_title TEXT)")
            .await
            .unwrap();
        db.execute_query("INSERT INTO tags (slug) VALUES ('rust'), ('go')")
            .await
            .unwrap();

        let sql_dir = dir.path().join("tags");
        std::fs::create_dir(&sql_dir).unwrap();
        std::fs::write(
            sql_dir.join("meta_title.sql"),
            "UPDATE tags SET meta_title = slug WHERE meta_title IS NULL;",
        )
        .unwrap();

        let results = run_sql_directory(&db, &sql_dir).await.unwrap();

        assert_eq!(results["meta_title"], "2 rows affected.");
    }

    #[tokio::test]
    async fn test_missing_directory_is_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db").to_string_lossy())
            .await
            .unwrap();

        let result = run_sql_directory(&db, &dir.path().join("missing")).await;

        assert!(matches!(result, Err(SqlBatchError::Loader(_))));
    }
}
