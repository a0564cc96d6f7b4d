//! SQLファイルローダー
//!
//! ディレクトリ内の`.sql`ファイルを読み込み、ファイル名（拡張子なし）から
//! クエリ本文へのマッピングを返す。キャッシュはせず、呼び出しごとに読み直す。

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

/// SQLファイル読み込みエラー
#[derive(Debug, Error)]
pub enum SqlLoaderError {
    /// ディレクトリまたはファイルの読み込み失敗
    #[error("SQLファイルの読み込みに失敗しました ({path}): {message}")]
    Io {
        /// 対象パス
        path: String,
        /// 詳細
        message: String,
    },
}

impl SqlLoaderError {
    fn io(path: &Path, err: std::io::Error) -> Self {
        SqlLoaderError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// ディレクトリ直下の`.sql`ファイルをすべて読み込む
///
/// サブディレクトリは辿らない。キーはファイル名の拡張子を除いた部分で、
/// 名前順に並ぶ。
///
/// # Returns
/// * `Ok(BTreeMap<String, String>)` - クエリ名 → SQL本文
/// * `Err(SqlLoaderError)` - ディレクトリが存在しない等
pub async fn collect_sql_queries(dir: &Path) -> Result<BTreeMap<String, String>, SqlLoaderError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SqlLoaderError::io(dir, e))?;

    let mut queries = BTreeMap::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SqlLoaderError::io(dir, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| SqlLoaderError::io(&path, e))?
            .is_file();
        let is_sql = path.extension().is_some_and(|ext| ext == "sql");
        if !is_file || !is_sql {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let query = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SqlLoaderError::io(&path, e))?;
        debug!(query_name = name, "SQLファイルを読み込み");
        queries.insert(name.to_string(), query);
    }

    info!(
        dir = %dir.display(),
        count = queries.len(),
        "Found {} queries", queries.len()
    );
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_only_sql_files_keyed_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("update_meta.sql"), "UPDATE tags SET x = 1;").unwrap();
        std::fs::write(dir.path().join("count.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.path().join("README.md"), "# notes").unwrap();
        std::fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let queries = collect_sql_queries(dir.path()).await.unwrap();

        let names: Vec<&str> = queries.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["count", "update_meta"]);
        assert_eq!(queries["update_meta"], "UPDATE tags SET x = 1;");
    }

    #[tokio::test]
    async fn test_empty_directory_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();

        let queries = collect_sql_queries(dir.path()).await.unwrap();

        assert!(queries.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        let result = collect_sql_queries(&missing).await;

        assert!(matches!(result, Err(SqlLoaderError::Io { .. })));
    }
}
