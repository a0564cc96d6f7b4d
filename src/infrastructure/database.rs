//! 分析用SQLiteデータベースクライアント
//!
//! 単発クエリ、名前付きクエリのバッチ実行、レコードの一括挿入、表形式データの挿入、
//! 行の取得を提供する。
//! - 書き込み: 専用の単一接続（Arc<Mutex<Connection>>）
//! - 読み取り: deadpool-sqliteによるasync接続プール

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, Transaction};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

/// 1行分のレコード（カラム名 → 値）
pub type Record = Map<String, Value>;

/// データベースエラー
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// クエリ実行エラー（対象はクエリ本文・ファイルパス・クエリ名一覧のいずれか）
    #[error("Failed to execute SQL `{target}`: {message}")]
    Query {
        /// 実行対象
        target: String,
        /// ドライバーのエラーメッセージ
        message: String,
    },

    /// 制約違反による挿入エラー
    #[error("IntegrityError while inserting records into table `{table}`: {message}")]
    Integrity {
        /// 対象テーブル
        table: String,
        /// ドライバーのエラーメッセージ
        message: String,
    },

    /// 制約違反以外の挿入エラー
    #[error("Failed to insert records into table `{table}`: {message}")]
    Insert {
        /// 対象テーブル
        table: String,
        /// ドライバーのエラーメッセージ
        message: String,
    },

    /// `fail`指定時にテーブルが既に存在した
    #[error("Table `{0}` already exists")]
    TableExists(String),

    /// 入力データが不正
    #[error("不正な入力データ: {0}")]
    InvalidInput(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// プール取得エラー
    #[error("プールエラー: {0}")]
    Pool(String),

    /// 接続構築エラー
    #[error("接続構築エラー: {0}")]
    Build(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::Database(err.to_string())
    }
}

impl From<deadpool_sqlite::BuildError> for DatabaseError {
    fn from(err: deadpool_sqlite::BuildError) -> Self {
        DatabaseError::Build(err.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for DatabaseError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        DatabaseError::Pool(err.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for DatabaseError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        DatabaseError::Database(err.to_string())
    }
}

/// 挿入エラーを制約違反とそれ以外に分類する
fn classify_insert_error(table: &str, err: rusqlite::Error) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            DatabaseError::Integrity {
                table: table.to_string(),
                message: err.to_string(),
            }
        }
        _ => DatabaseError::Insert {
            table: table.to_string(),
            message: err.to_string(),
        },
    }
}

/// 接続時に適用するPRAGMA
const CONNECTION_PRAGMAS: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
"#;

/// 識別子をダブルクォートで囲む
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// 末尾のセミコロンと空白を取り除いた単一ステートメント
fn single_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// JSON値をSQLite値に変換
fn json_to_sql(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

/// SQLite値をJSON値に変換
fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
    }
}

/// 一括挿入の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    /// 対象テーブル
    pub table: String,
    /// 挿入した行数
    pub rows: usize,
    /// 挿入したカラム
    pub columns: Vec<String>,
}

impl fmt::Display for InsertSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inserted {} rows into `{}` with {} columns: {}",
            self.rows,
            self.table,
            self.columns.len(),
            self.columns.join(", ")
        )
    }
}

/// 表形式データ挿入時に既存テーブルをどう扱うか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfExists {
    /// 既存テーブルに追記
    #[default]
    Append,
    /// 既存テーブルを削除して作り直す
    Replace,
    /// 既存テーブルがあればエラー
    Fail,
}

impl IfExists {
    pub fn as_str(&self) -> &'static str {
        match self {
            IfExists::Append => "append",
            IfExists::Replace => "replace",
            IfExists::Fail => "fail",
        }
    }
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IfExists {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(IfExists::Append),
            "replace" => Ok(IfExists::Replace),
            "fail" => Ok(IfExists::Fail),
            other => Err(format!(
                "unknown action `{other}` (expected append, replace or fail)"
            )),
        }
    }
}

/// カラム名付きの表形式データ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// レコード列からフレームを作成
    ///
    /// カラムは全レコードのキーの和集合（初出順）。欠けている値はnullになる。
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// カラムのSQLite型親和性を最初の非null値から推定
    fn column_affinity(&self, index: usize) -> &'static str {
        let first = self
            .rows
            .iter()
            .map(|row| &row[index])
            .find(|v| !v.is_null());
        match first {
            Some(Value::Bool(_)) => "INTEGER",
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "INTEGER",
            Some(Value::Number(_)) => "REAL",
            _ => "TEXT",
        }
    }

    /// CREATE TABLE文を構築
    fn create_table_sql(&self, table: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} {}", quote_identifier(c), self.column_affinity(i)))
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(table),
            columns.join(", ")
        )
    }
}

/// INSERT文を構築
fn insert_sql(table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// テーブルが存在するか確認
fn table_exists(tx: &Transaction<'_>, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// 分析用データベースクライアント
///
/// - 書き込み: 専用の単一接続（Arc<Mutex<Connection>>）
/// - 読み取り: deadpool-sqliteによるasync接続プール
pub struct Database {
    /// 書き込み専用接続
    write_conn: Arc<Mutex<Connection>>,
    /// 読み取り用async接続プール
    read_pool: Pool,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// 新しいDatabaseを作成
    ///
    /// データベースファイル（と親ディレクトリ）がなければ作成し、WALモードを有効にする。
    ///
    /// # Arguments
    /// * `db_path` - データベースファイルのパス
    pub async fn new(db_path: &str) -> Result<Self, DatabaseError> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Build(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let write_conn = Connection::open(db_path)?;
        write_conn.execute_batch(CONNECTION_PRAGMAS)?;

        // 読み取り用プール（最大4接続）
        let read_pool = Config::new(db_path)
            .builder(Runtime::Tokio1)
            .map_err(|e| DatabaseError::Build(e.to_string()))?
            .max_size(4)
            .build()?;

        Ok(Self {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
        })
    }

    /// 書き込み接続上でブロッキング処理を実行（内部用）
    async fn with_write<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.write_conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| {
                DatabaseError::Database("書き込み接続のロック取得に失敗（Mutex poisoned）".to_string())
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::Database(format!("タスク実行エラー: {}", e)))?
    }

    /// 単一ステートメントを1トランザクションで実行（内部用、ログなし）
    async fn run_statement(&self, sql: String, target: String) -> Result<usize, DatabaseError> {
        self.with_write(move |conn| {
            let run = |conn: &mut Connection| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let rows = tx.execute(single_statement(&sql), [])?;
                tx.commit()?;
                Ok(rows)
            };
            run(conn).map_err(|e| DatabaseError::Query {
                target,
                message: e.to_string(),
            })
        })
        .await
    }

    /// SQLステートメントを1件実行
    ///
    /// 成功時はコミットし、影響行数を返す。失敗時はエラーをログに記録して返す。
    pub async fn execute_query(&self, query: &str) -> Result<usize, DatabaseError> {
        let result = self
            .run_statement(query.to_string(), query.trim().to_string())
            .await;
        if let Err(e) = &result {
            error!(error = %e, "Failed to execute SQL query");
        }
        result
    }

    /// SQLファイルの内容を1件のステートメントとして実行
    pub async fn execute_query_from_file(&self, sql_file: &Path) -> Result<usize, DatabaseError> {
        let target = sql_file.display().to_string();
        let result = match tokio::fs::read_to_string(sql_file).await {
            Ok(sql) => self.run_statement(sql, target).await,
            Err(e) => Err(DatabaseError::Query {
                target,
                message: e.to_string(),
            }),
        };
        if let Err(e) = &result {
            error!(sql_file = %sql_file.display(), error = %e, "Error while executing SQL file");
        }
        result
    }

    /// 名前付きクエリ群を1つのトランザクションで実行
    ///
    /// いずれかが失敗した場合は全体をロールバックし、部分的な結果は返さない。
    ///
    /// # Returns
    /// * `Ok(BTreeMap)` - クエリ名 → `"<N> rows affected."`
    /// * `Err(DatabaseError)` - いずれかのクエリが失敗
    pub async fn execute_queries(
        &self,
        queries: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, DatabaseError> {
        let names = queries.keys().cloned().collect::<Vec<_>>().join(",");
        let queries = queries.clone();

        let result = self
            .with_write(move |conn| {
                let tx = conn.transaction()?;
                let mut results = BTreeMap::new();
                for (name, sql) in &queries {
                    let rows = tx.execute(single_statement(sql), [])?;
                    results.insert(name.clone(), format!("{rows} rows affected."));
                }
                tx.commit()?;
                Ok(results)
            })
            .await;

        match result {
            Ok(results) => {
                info!(queries = %names, "Executed {} queries", results.len());
                Ok(results)
            }
            Err(e) => {
                error!(queries = %names, error = %e, "Error while executing queries");
                Err(DatabaseError::Query {
                    target: names,
                    message: e.to_string(),
                })
            }
        }
    }

    /// レコードをテーブルに一括挿入
    ///
    /// カラムは先頭レコードのキーから決定する。`replace`指定時は挿入前にテーブルを空にする。
    /// 制約違反とそれ以外のエラーはログとエラー種別で区別する。
    pub async fn insert_records(
        &self,
        rows: &[Record],
        table_name: &str,
        replace: bool,
    ) -> Result<InsertSummary, DatabaseError> {
        let rows = rows.to_vec();
        let table = table_name.to_string();

        let result = self
            .with_write(move |conn| {
                let columns: Vec<String> = rows
                    .first()
                    .map(|r| r.keys().cloned().collect())
                    .unwrap_or_default();

                let run = |conn: &mut Connection| -> Result<usize, rusqlite::Error> {
                    let tx = conn.transaction()?;
                    if replace {
                        tx.execute(&format!("DELETE FROM {}", quote_identifier(&table)), [])?;
                    }
                    if !columns.is_empty() {
                        let mut stmt = tx.prepare(&insert_sql(&table, &columns))?;
                        for row in &rows {
                            let values = columns.iter().map(|c| json_to_sql(row.get(c)));
                            stmt.execute(rusqlite::params_from_iter(values))?;
                        }
                    }
                    tx.commit()?;
                    Ok(rows.len())
                };

                let inserted = run(conn).map_err(|e| classify_insert_error(&table, e))?;
                Ok(InsertSummary {
                    table,
                    rows: inserted,
                    columns,
                })
            })
            .await;

        match &result {
            Ok(summary) => info!(table = table_name, rows = summary.rows, "{}", summary),
            Err(e @ DatabaseError::Integrity { .. }) => {
                error!(table = table_name, error = %e, "IntegrityError while inserting records")
            }
            Err(e) => error!(table = table_name, error = %e, "Error while inserting records"),
        }
        result
    }

    /// 表形式データをテーブルに挿入
    ///
    /// テーブルがなければデータから型を推定して作成する。
    /// `Replace`は既存テーブルを削除して作り直し、`Fail`は既存テーブルがあればエラーにする。
    pub async fn insert_dataframe(
        &self,
        frame: &Frame,
        table_name: &str,
        action: IfExists,
    ) -> Result<usize, DatabaseError> {
        if frame.columns().is_empty() {
            return Err(DatabaseError::InvalidInput(
                "カラムのないデータは挿入できません".to_string(),
            ));
        }
        let frame = frame.clone();
        let table = table_name.to_string();

        let result = self
            .with_write(move |conn| {
                let tx = conn.transaction()?;
                let exists = table_exists(&tx, &table)?;
                match (exists, action) {
                    (true, IfExists::Fail) => return Err(DatabaseError::TableExists(table)),
                    (true, IfExists::Replace) => {
                        tx.execute(&format!("DROP TABLE {}", quote_identifier(&table)), [])?;
                        tx.execute(&frame.create_table_sql(&table), [])?;
                    }
                    (true, IfExists::Append) => {}
                    (false, _) => {
                        tx.execute(&frame.create_table_sql(&table), [])?;
                    }
                }

                {
                    let mut stmt = tx
                        .prepare(&insert_sql(&table, frame.columns()))
                        .map_err(|e| classify_insert_error(&table, e))?;
                    for row in &frame.rows {
                        let values = row.iter().map(|v| json_to_sql(Some(v)));
                        stmt.execute(rusqlite::params_from_iter(values))
                            .map_err(|e| classify_insert_error(&table, e))?;
                    }
                }
                tx.commit()?;
                Ok(frame.len())
            })
            .await;

        match &result {
            Ok(rows) => info!("Updated {} rows via {} into `{}`.", rows, action, table_name),
            Err(e) => error!(table = table_name, action = %action, error = %e, "Error while inserting dataframe"),
        }
        result
    }

    /// 読み取りクエリを実行し、行をJSONオブジェクトとして返す
    ///
    /// 読み取りプールから接続を取得するため、書き込みと並行実行できる。
    pub async fn fetch_rows(&self, query: &str) -> Result<Vec<Record>, DatabaseError> {
        let query = query.to_string();
        let conn = self.read_pool.get().await?;

        conn.interact(move |conn| -> Result<Vec<Record>, DatabaseError> {
            let mut stmt = conn.prepare(single_statement(&query))?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let rows = stmt
                .query_map([], |row| {
                    let mut record = Record::new();
                    for (i, name) in columns.iter().enumerate() {
                        let value: SqlValue = row.get(i)?;
                        record.insert(name.clone(), sql_to_json(value));
                    }
                    Ok(record)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }
}
