//! アプリケーション設定
//!
//! 起動時に環境変数から一度だけ読み込み、各クライアントの構築時に明示的に渡す。
//! プロセス全体で共有するグローバル設定は持たない。

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, Utc};
use thiserror::Error;
use url::Url;

use crate::domain::webhook::DEFAULT_IGNORED_ACTORS;

/// デフォルトの画像ルートディレクトリ（CMSのアップロード先）
const DEFAULT_IMAGES_ROOT: &str = "content/images";

/// デフォルトのLynx画像プレフィックス
const DEFAULT_LYNX_PREFIX: &str = "roundup";

/// デフォルトのデータベースパス
const DEFAULT_DB_PATH: &str = "data/analytics.db";

/// デフォルトのSQLファイルディレクトリ
const DEFAULT_SQL_DIR: &str = "sql";

/// デフォルトのPlausible breakdownエンドポイント
const DEFAULT_PLAUSIBLE_ENDPOINT: &str = "https://plausible.io/api/v1/stats/breakdown";

/// デフォルトのリッスンアドレス（リバースプロキシ配下での運用を想定）
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// 設定読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必須の環境変数が設定されていない
    #[error("必須の環境変数が設定されていません: {0}")]
    MissingEnvVar(String),

    /// 環境変数の値が不正
    #[error("環境変数 {name} の値が不正です: {message}")]
    InvalidValue {
        /// 環境変数名
        name: String,
        /// 詳細
        message: String,
    },
}

/// 必須の環境変数を読み込む（空文字列は未設定扱い）
fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// 任意の環境変数を読み込む（空文字列は未設定扱い）
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// カンマ区切りの環境変数をリストとして読み込む
fn comma_list(name: &str) -> Vec<String> {
    optional(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// 画像CDNバケットの設定
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// バケット名
    bucket_name: String,
    /// 公開URL（末尾スラッシュ付きで保持）
    bucket_url: String,
    /// 一括変換のデフォルトディレクトリ（未設定なら当月ディレクトリ）
    bucket_folder: Option<String>,
    /// 画像ルートディレクトリ
    images_root: String,
    /// Lynx画像のプレフィックス
    lynx_prefix: String,
    /// S3互換エンドポイント（未設定ならSDKデフォルト）
    endpoint: Option<String>,
}

impl StorageConfig {
    /// 新しい設定を作成
    ///
    /// `bucket_url`は絶対URLである必要がある。
    pub fn new(bucket_name: impl Into<String>, bucket_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(bucket_url).map_err(|e| ConfigError::InvalidValue {
            name: "BUCKET_URL".to_string(),
            message: e.to_string(),
        })?;
        let mut bucket_url = parsed.to_string();
        if !bucket_url.ends_with('/') {
            bucket_url.push('/');
        }

        Ok(Self {
            bucket_name: bucket_name.into(),
            bucket_url,
            bucket_folder: None,
            images_root: DEFAULT_IMAGES_ROOT.to_string(),
            lynx_prefix: DEFAULT_LYNX_PREFIX.to_string(),
            endpoint: None,
        })
    }

    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `BUCKET_NAME`: バケット名（必須）
    /// - `BUCKET_URL`: バケットの公開URL（必須）
    /// - `BUCKET_FOLDER`: 一括変換のデフォルトディレクトリ
    /// - `BUCKET_IMAGES_ROOT`: 画像ルートディレクトリ（デフォルト: content/images）
    /// - `BUCKET_LYNX_PREFIX`: Lynx画像のプレフィックス（デフォルト: roundup）
    /// - `STORAGE_ENDPOINT`: S3互換エンドポイントURL
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket_name = required("BUCKET_NAME")?;
        let bucket_url = required("BUCKET_URL")?;

        let mut config = Self::new(bucket_name, &bucket_url)?;
        config.bucket_folder = optional("BUCKET_FOLDER");
        if let Some(root) = optional("BUCKET_IMAGES_ROOT") {
            config.images_root = root.trim_matches('/').to_string();
        }
        if let Some(prefix) = optional("BUCKET_LYNX_PREFIX") {
            config.lynx_prefix = prefix;
        }
        config.endpoint = optional("STORAGE_ENDPOINT");
        Ok(config)
    }

    /// デフォルトディレクトリを上書き
    pub fn with_bucket_folder(mut self, folder: impl Into<String>) -> Self {
        self.bucket_folder = Some(folder.into());
        self
    }

    /// バケット名を取得
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// 公開URLを取得（末尾スラッシュ付き）
    pub fn bucket_url(&self) -> &str {
        &self.bucket_url
    }

    /// Lynx画像のプレフィックスを取得
    pub fn lynx_prefix(&self) -> &str {
        &self.lynx_prefix
    }

    /// S3互換エンドポイントを取得
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// 指定日時点のデフォルトディレクトリ
    ///
    /// `BUCKET_FOLDER`が設定されていればそれを、なければ`<images_root>/<YYYY>/<MM>`を返す。
    pub fn folder_for(&self, date: NaiveDate) -> String {
        match &self.bucket_folder {
            Some(folder) => folder.clone(),
            None => format!("{}/{:04}/{:02}", self.images_root, date.year(), date.month()),
        }
    }

    /// 現在のデフォルトディレクトリ
    pub fn default_folder(&self) -> String {
        self.folder_for(Utc::now().date_naive())
    }

    /// オブジェクト名から公開URLを構築
    pub fn object_url(&self, name: &str) -> String {
        format!("{}{}", self.bucket_url, name.trim_start_matches('/'))
    }

    /// 公開URLからオブジェクト名を取り出す
    ///
    /// バケットURL配下でないURLはパス部分をオブジェクト名として扱う。
    pub fn object_name(&self, image_url: &str) -> String {
        if let Some(name) = image_url.strip_prefix(&self.bucket_url) {
            return name.to_string();
        }
        match Url::parse(image_url) {
            Ok(url) => url.path().trim_start_matches('/').to_string(),
            Err(_) => image_url.trim_start_matches('/').to_string(),
        }
    }
}

/// データベースの設定
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    db_path: String,
    sql_dir: PathBuf,
}

impl DatabaseConfig {
    pub fn new(db_path: impl Into<String>, sql_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            sql_dir: sql_dir.into(),
        }
    }

    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `DB_PATH`: データベースファイルのパス（デフォルト: data/analytics.db）
    /// - `SQL_DIR`: SQLファイルのルートディレクトリ（デフォルト: sql）
    pub fn from_env() -> Self {
        Self::new(
            optional("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            optional("SQL_DIR").unwrap_or_else(|| DEFAULT_SQL_DIR.to_string()),
        )
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 指定グループ（サブディレクトリ）のSQLファイルディレクトリ
    pub fn sql_group_dir(&self, group: &str) -> PathBuf {
        self.sql_dir.join(group)
    }
}

/// SMS通知の設定
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// 通知先電話番号（E.164形式）
    recipient: String,
}

impl SmsConfig {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }

    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `SMS_RECIPIENT`: 通知先電話番号（必須）
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(required("SMS_RECIPIENT")?))
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }
}

/// GitHub Webhookの設定
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// 通知しないアカウント
    ignored_actors: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            ignored_actors: DEFAULT_IGNORED_ACTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl GithubConfig {
    /// 環境変数から設定を読み込み
    ///
    /// 既定値はbotアカウントのみ。メンテナー本人の操作も通知しない場合は
    /// そのログインをここに追加する。
    ///
    /// # 環境変数
    /// - `GITHUB_IGNORED_ACTORS`: 追加で無視するアカウント（カンマ区切り）
    pub fn from_env() -> Self {
        Self::default().with_ignored_actors(comma_list("GITHUB_IGNORED_ACTORS"))
    }

    /// 無視するアカウントを既定値に追加（重複は無視）
    pub fn with_ignored_actors<I, S>(mut self, actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for actor in actors {
            let actor = actor.into();
            if !self.ignored_actors.contains(&actor) {
                self.ignored_actors.push(actor);
            }
        }
        self
    }

    pub fn ignored_actors(&self) -> &[String] {
        &self.ignored_actors
    }
}

/// Plausible APIの設定
#[derive(Debug, Clone)]
pub struct PlausibleConfig {
    api_token: String,
    site_id: String,
    endpoint: String,
}

impl PlausibleConfig {
    pub fn new(
        api_token: impl Into<String>,
        site_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            api_token: api_token.into(),
            site_id: site_id.into(),
            endpoint: endpoint.into(),
        }
    }

    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `PLAUSIBLE_API_TOKEN`: APIトークン（必須）
    /// - `PLAUSIBLE_SITE_ID`: サイトID（必須）
    /// - `PLAUSIBLE_ENDPOINT`: breakdownエンドポイント
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(
            required("PLAUSIBLE_API_TOKEN")?,
            required("PLAUSIBLE_SITE_ID")?,
            optional("PLAUSIBLE_ENDPOINT").unwrap_or_else(|| DEFAULT_PLAUSIBLE_ENDPOINT.to_string()),
        ))
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Ghost Content APIの設定
#[derive(Debug, Clone)]
pub struct GhostConfig {
    api_url: String,
    content_api_key: String,
    site_url: String,
}

impl GhostConfig {
    pub fn new(
        api_url: impl Into<String>,
        content_api_key: impl Into<String>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            content_api_key: content_api_key.into(),
            site_url: site_url.into(),
        }
    }

    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `GHOST_API_URL`: GhostのベースURL（必須）
    /// - `GHOST_CONTENT_API_KEY`: Content APIキー（必須）
    /// - `SITE_URL`: 公開サイトURL（デフォルト: GHOST_API_URL）
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = required("GHOST_API_URL")?;
        let content_api_key = required("GHOST_CONTENT_API_KEY")?;
        let site_url = optional("SITE_URL").unwrap_or_else(|| api_url.clone());
        Ok(Self::new(api_url, content_api_key, site_url))
    }

    pub fn content_api_key(&self) -> &str {
        &self.content_api_key
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Content APIのリソースURLを構築
    ///
    /// # 戻り値
    /// 例: "https://blog.example.com/ghost/api/content/posts/slug/my-post/"
    pub fn content_url(&self, resource: &str) -> String {
        format!(
            "{}/ghost/api/content/{}/",
            self.api_url.trim_end_matches('/'),
            resource.trim_matches('/')
        )
    }
}

/// HTTPサーバーの設定
#[derive(Debug, Clone)]
pub struct ServerConfig {
    listen_addr: SocketAddr,
    cors_origins: Vec<String>,
}

impl ServerConfig {
    /// 環境変数から設定を読み込み
    ///
    /// # 環境変数
    /// - `LISTEN_ADDR`: リッスンアドレス（デフォルト: 127.0.0.1:8080）
    /// - `CORS_ORIGINS`: 許可するオリジン（カンマ区切り）
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = optional("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                name: "LISTEN_ADDR".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            listen_addr,
            cors_origins: comma_list("CORS_ORIGINS"),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }
}

/// アプリケーション全体の設定
///
/// プロセスのエントリーポイントが所有し、各クライアントの構築に使用する。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub sms: SmsConfig,
    pub github: GithubConfig,
    pub plausible: PlausibleConfig,
    pub ghost: GhostConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// 環境変数から全設定を読み込み
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            storage: StorageConfig::from_env()?,
            database: DatabaseConfig::from_env(),
            sms: SmsConfig::from_env()?,
            github: GithubConfig::from_env(),
            plausible: PlausibleConfig::from_env()?,
            ghost: GhostConfig::from_env()?,
            server: ServerConfig::from_env()?,
        })
    }
}
