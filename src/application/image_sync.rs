//! CDNバケットの画像同期
//!
//! 元画像ごとにretina・mobile派生画像を揃え、過去の実行が残したゴミ画像を削除し、
//! retina画像を`_retina/`サブディレクトリへ整理する。
//! 派生画像はフォルダ直下と`_retina/`のどちらにあっても1枚として扱う。
use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::ImageVariant;
use crate::domain::image_naming::{
    canonical_name, derivative_slots, is_directory_marker, is_unwanted, mobile_name,
    retina_directory_name, retina_name, webp_name,
};
use crate::infrastructure::{
    BlobRef, FetchError, ImageFetcher, ObjectStore, ObjectStoreError, ResizeError, StorageConfig,
    create_mobile_image,
};

/// 生成したmobile画像のContent-Type
const MOBILE_CONTENT_TYPE: &str = "image/jpeg";

/// Lynx画像として扱うファイル名の末尾
const LYNX_IMAGE_SUFFIX: &str = "@2x.jpg";

/// 画像同期のエラー型
#[derive(Debug, Error)]
pub enum ImageSyncError {
    #[error(transparent)]
    Storage(#[from] ObjectStoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Resize(#[from] ResizeError),
}

/// フォルダ一括処理の結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub purged: Vec<String>,
    pub retina: Vec<String>,
    pub mobile: Vec<String>,
}

/// オブジェクトストレージ上の派生画像生成サービス
pub struct ImageSyncService {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn ImageFetcher>,
    storage: StorageConfig,
}

impl ImageSyncService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn ImageFetcher>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            storage,
        }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// プレフィックス配下の全オブジェクト
    pub async fn list(&self, prefix: &str) -> Result<Vec<BlobRef>, ImageSyncError> {
        Ok(self.store.list(prefix).await?)
    }

    /// フォルダ配下の指定種別の画像
    ///
    /// フォルダのプレースホルダーは返さない。retina画像は直下と`_retina/`に
    /// 同じ画像があっても1件にまとめる。
    pub async fn fetch(
        &self,
        folder: &str,
        kind: ImageVariant,
    ) -> Result<Vec<BlobRef>, ImageSyncError> {
        let images = self.images(folder, kind).await?;
        if kind != ImageVariant::Retina {
            return Ok(images);
        }
        let mut seen = HashSet::new();
        Ok(images
            .into_iter()
            .filter(|blob| seen.insert(canonical_name(&blob.name)))
            .collect())
    }

    /// ゴミ画像を削除し、削除したキーを返す
    #[instrument(skip(self))]
    pub async fn purge_unwanted(&self, folder: &str) -> Result<Vec<String>, ImageSyncError> {
        info!("Purging unwanted images...");
        let mut seen = HashSet::new();
        let mut purged = Vec::new();
        for blob in self.list(folder).await? {
            if !is_unwanted(&blob.name) || !seen.insert(blob.name.clone()) {
                continue;
            }
            self.store.delete(&blob.name).await?;
            info!(image = %blob.name, "Deleted {}", blob.name);
            purged.push(blob.name);
        }
        Ok(purged)
    }

    /// retina画像が無い元画像をretina名でコピー
    #[instrument(skip(self))]
    pub async fn retina_transform(&self, folder: &str) -> Result<Vec<String>, ImageSyncError> {
        info!("Generating retina images...");
        let mut created = Vec::new();
        for blob in self.fetch(folder, ImageVariant::Standard).await? {
            if let Some(name) = self.create_retina(&blob.name).await? {
                created.push(name);
            }
        }
        Ok(created)
    }

    /// retina画像からmobile画像を生成
    #[instrument(skip(self))]
    pub async fn mobile_transform(&self, folder: &str) -> Result<Vec<String>, ImageSyncError> {
        info!("Generating mobile images...");
        let mut created = Vec::new();
        for blob in self.fetch(folder, ImageVariant::Retina).await? {
            if let Some(name) = self.create_mobile(&blob.name).await? {
                created.push(name);
            }
        }
        Ok(created)
    }

    /// CDNがwebpを配信しているretina画像をwebp名でコピー
    #[instrument(skip(self))]
    pub async fn webp_transform(&self, folder: &str) -> Result<Vec<String>, ImageSyncError> {
        info!("Generating webp images...");
        let mut created = Vec::new();
        for blob in self.fetch(folder, ImageVariant::Retina).await? {
            let webp = webp_name(&blob.name);
            if let Some(existing) = self.find_derivative(&webp).await? {
                debug!(image = %existing, "webp image already exists");
                continue;
            }
            if !self.fetcher.is_image(&webp).await? {
                debug!(image = %webp, "webp image not reachable over HTTP");
                continue;
            }
            info!(image = %webp, "Creating webp image {}", webp);
            self.store.copy(&blob.name, &webp).await?;
            created.push(webp);
        }
        Ok(created)
    }

    /// retina画像をフォルダの`_retina/`サブディレクトリへ移動
    #[instrument(skip(self))]
    pub async fn organize(&self, folder: &str) -> Result<Vec<String>, ImageSyncError> {
        let mut moved = Vec::new();
        for blob in self.images(folder, ImageVariant::Retina).await? {
            let Some(destination) = retina_directory_name(&blob.name) else {
                continue;
            };
            self.store.copy(&blob.name, &destination).await?;
            self.store.delete(&blob.name).await?;
            info!(source = %blob.name, destination = %destination, "Moved retina image");
            moved.push(destination);
        }
        Ok(moved)
    }

    /// ゴミ画像の削除、retina・mobile画像の生成をまとめて実行
    pub async fn transform_folder(&self, folder: &str) -> Result<TransformReport, ImageSyncError> {
        let report = TransformReport {
            purged: self.purge_unwanted(folder).await?,
            retina: self.retina_transform(folder).await?,
            mobile: self.mobile_transform(folder).await?,
        };
        info!(
            folder = %folder,
            "Transformed {} purged, {} retina, {} mobile images",
            report.purged.len(),
            report.retina.len(),
            report.mobile.len()
        );
        Ok(report)
    }

    /// ランダムに選んだLynx画像の公開URL
    pub async fn fetch_random_lynx_image(&self) -> Result<Option<String>, ImageSyncError> {
        let candidates: Vec<BlobRef> = self
            .list(self.storage.lynx_prefix())
            .await?
            .into_iter()
            .filter(|blob| {
                blob.name.contains(LYNX_IMAGE_SUFFIX)
                    && ImageVariant::classify(&blob.name) == ImageVariant::Retina
            })
            .collect();

        let image = candidates
            .choose(&mut rand::rng())
            .map(|blob| self.storage.object_url(&blob.name));
        match &image {
            Some(url) => info!(image = %url, "Selected random Lynx image {}", url),
            None => warn!(prefix = %self.storage.lynx_prefix(), "No Lynx images found"),
        }
        Ok(image)
    }

    /// 画像URLからretina画像を作成
    ///
    /// 作成した画像の公開URLを返す。作成しなかった場合は`None`。
    pub async fn create_single_retina_image(
        &self,
        image_url: &str,
    ) -> Result<Option<String>, ImageSyncError> {
        let name = self.storage.object_name(image_url);
        Ok(self
            .create_retina(&name)
            .await?
            .map(|created| self.storage.object_url(&created)))
    }

    /// 画像URLからmobile画像を作成
    ///
    /// retina画像があればそれを、無ければ元画像を縮小元にする。
    pub async fn create_single_mobile_image(
        &self,
        image_url: &str,
    ) -> Result<Option<String>, ImageSyncError> {
        let name = self.storage.object_name(image_url);
        let source = self
            .find_derivative(&retina_name(&name))
            .await?
            .unwrap_or(name);
        Ok(self
            .create_mobile(&source)
            .await?
            .map(|created| self.storage.object_url(&created)))
    }

    /// フォルダ配下の指定種別の画像（重複をまとめない）
    async fn images(
        &self,
        folder: &str,
        kind: ImageVariant,
    ) -> Result<Vec<BlobRef>, ImageSyncError> {
        Ok(self
            .list(folder)
            .await?
            .into_iter()
            .filter(|blob| !is_directory_marker(&blob.name))
            .filter(|blob| ImageVariant::classify(&blob.name) == kind)
            .collect())
    }

    /// 派生画像が置かれているキー（直下、`_retina/`の順に探す）
    async fn find_derivative(&self, name: &str) -> Result<Option<String>, ImageSyncError> {
        for slot in derivative_slots(name) {
            if self.store.exists(&slot).await? {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// 元画像をretina名でコピー（既にあれば何もしない）
    async fn create_retina(&self, name: &str) -> Result<Option<String>, ImageSyncError> {
        let retina = retina_name(name);
        if retina == name {
            return Ok(None);
        }
        if let Some(existing) = self.find_derivative(&retina).await? {
            debug!(image = %existing, "retina image already exists");
            return Ok(None);
        }
        if !self.fetcher.is_image(name).await? {
            info!(image = %name, "original not reachable as an image, skipping");
            return Ok(None);
        }
        info!(image = %retina, "Creating retina image {}", retina);
        self.store.copy(name, &retina).await?;
        Ok(Some(retina))
    }

    /// `source`を縮小してフォルダ直下のmobile名でアップロード
    async fn create_mobile(&self, source: &str) -> Result<Option<String>, ImageSyncError> {
        let mobile = mobile_name(&canonical_name(source));
        if let Some(existing) = self.find_derivative(&mobile).await? {
            debug!(image = %existing, "mobile image already exists");
            return Ok(None);
        }
        let Some(bytes) = self.fetcher.fetch_image(source).await? else {
            info!(image = %source, "source not reachable as an image, skipping");
            return Ok(None);
        };
        let resized = match create_mobile_image(bytes).await {
            Ok(Some(resized)) => resized,
            Ok(None) => return Ok(None),
            Err(ResizeError::Decode(message)) => {
                warn!(image = %source, error = %message, "could not decode image, skipping");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        info!(image = %mobile, "Creating mobile image {}", mobile);
        self.store
            .upload(&mobile, resized, MOBILE_CONTENT_TYPE)
            .await?;
        Ok(Some(mobile))
    }
}
