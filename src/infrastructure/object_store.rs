//! オブジェクトストレージ操作モジュール
//!
//! 画像CDNバケットに対する一覧・存在確認・コピー・アップロード・削除を提供する。
//! S3互換APIを使用し、テスト用にトレイトで抽象化する。

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::StorageConfig;

/// オブジェクトストレージ操作のエラー型
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// AWS SDK エラー
    #[error("オブジェクトストレージAPIエラー ({operation} {key}): {message}")]
    Sdk {
        /// 操作名
        operation: &'static str,
        /// 対象キー（またはプレフィックス）
        key: String,
        /// 詳細
        message: String,
    },
    /// 対象オブジェクトが存在しない
    #[error("オブジェクトが存在しません: {0}")]
    NotFound(String),
}

impl ObjectStoreError {
    fn sdk(operation: &'static str, key: &str, err: impl std::error::Error) -> Self {
        ObjectStoreError::Sdk {
            operation,
            key: key.to_string(),
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

/// バケット内の1オブジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    /// オブジェクトキー
    pub name: String,
    /// サイズ（バイト）
    pub size: Option<u64>,
}

/// CopyObjectの`x-amz-copy-source`ヘッダー値
///
/// キーはパス区切りを残してセグメントごとにURLエンコードする。
fn copy_source(bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{key}")
}

/// オブジェクトストレージ操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// プレフィックスに一致するオブジェクトを全件取得（ページネーションを辿る）
    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>, ObjectStoreError>;

    /// オブジェクトが存在するか確認
    async fn exists(&self, name: &str) -> Result<bool, ObjectStoreError>;

    /// バケット内でオブジェクトをコピー
    async fn copy(&self, source: &str, destination: &str) -> Result<(), ObjectStoreError>;

    /// オブジェクトをアップロード
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    /// オブジェクトを削除
    async fn delete(&self, name: &str) -> Result<(), ObjectStoreError>;
}

/// S3互換APIを使用したオブジェクトストレージ実装
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// 新しいS3ObjectStoreを作成
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// ストレージ設定からクライアントを作成
    ///
    /// エンドポイントが指定されている場合はパススタイルでアクセスする。
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = config.endpoint() {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint().is_some())
            .build();
        Self::new(S3Client::from_conf(s3_config), config.bucket_name())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>, ObjectStoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut blobs = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| ObjectStoreError::sdk("list", prefix, e))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    blobs.push(BlobRef {
                        name: key.to_string(),
                        size: object.size().and_then(|s| u64::try_from(s).ok()),
                    });
                }
            }
        }

        debug!(prefix = %prefix, count = blobs.len(), "オブジェクト一覧を取得");
        Ok(blobs)
    }

    async fn exists(&self, name: &str) -> Result<bool, ObjectStoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(ObjectStoreError::sdk("head", name, err)),
        }
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<(), ObjectStoreError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source))
            .key(destination)
            .send()
            .await
            .map_err(|e| ObjectStoreError::sdk("copy", source, e))?;

        info!(source = %source, destination = %destination, "オブジェクトをコピー");
        Ok(())
    }

    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ObjectStoreError::sdk("put", name, e))?;

        info!(name = %name, size, content_type = %content_type, "オブジェクトをアップロード");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ObjectStoreError> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => {
                info!(name = %name, "オブジェクトを削除");
                Ok(())
            }
            Err(err) => {
                warn!(name = %name, error = %DisplayErrorContext(&err), "オブジェクト削除エラー");
                Err(ObjectStoreError::sdk("delete", name, err))
            }
        }
    }
}
