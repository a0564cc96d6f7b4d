//! 記事画像の派生生成エンドポイント
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use super::{ApiError, AppState};
use crate::application::TransformReport;
use crate::domain::PostUpdate;

/// `directory`クエリの最大文字数
const MAX_DIRECTORY_LENGTH: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryQuery {
    #[serde(default)]
    pub directory: Option<String>,
}

impl DirectoryQuery {
    /// 指定ディレクトリ（省略時は設定の当月ディレクトリ）
    fn resolve(self, state: &AppState) -> Result<String, ApiError> {
        match self.directory {
            Some(directory) if directory.chars().count() > MAX_DIRECTORY_LENGTH => Err(
                ApiError::bad_request(format!(
                    "directoryは{MAX_DIRECTORY_LENGTH}文字以内で指定してください"
                )),
            ),
            Some(directory) => Ok(directory),
            None => Ok(state.images.storage().default_folder()),
        }
    }
}

fn keyed_by_title(title: String, value: Value) -> Json<Value> {
    let mut body = Map::new();
    body.insert(title, value);
    Json(Value::Object(body))
}

/// POST /images/
///
/// 更新された記事のアイキャッチ画像からretina・mobile画像を作成する。
pub async fn optimize_post_image(
    State(state): State<AppState>,
    payload: Result<Json<PostUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = payload?;
    let post = update.post.current;
    let Some(feature_image) = post.feature_image.as_deref() else {
        return Ok(keyed_by_title(
            post.title,
            json!("No images exist for optimization"),
        ));
    };

    let created: Vec<String> = [
        state.images.create_single_retina_image(feature_image).await?,
        state.images.create_single_mobile_image(feature_image).await?,
    ]
    .into_iter()
    .flatten()
    .collect();

    if created.is_empty() {
        return Ok(keyed_by_title(
            post.title,
            json!("Retina & mobile images already exist"),
        ));
    }
    info!(title = %post.title, "Generated {} images for post: {:?}", created.len(), created);
    Ok(Json(json!(created)))
}

/// GET /images/?directory=
///
/// ゴミ画像の削除とretina・mobile画像の一括生成
pub async fn bulk_transform_images(
    State(state): State<AppState>,
    query: Result<Query<DirectoryQuery>, QueryRejection>,
) -> Result<Json<TransformReport>, ApiError> {
    let Query(query) = query?;
    let directory = query.resolve(&state)?;
    Ok(Json(state.images.transform_folder(&directory).await?))
}

/// GET /images/sort/?directory=
///
/// retina画像を`_retina/`へ整理
pub async fn bulk_organize_images(
    State(state): State<AppState>,
    query: Result<Query<DirectoryQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let directory = query.resolve(&state)?;
    let retina = state.images.organize(&directory).await?;
    info!(directory = %directory, "Moved {} retina images.", retina.len());
    Ok(Json(json!({ "retina": retina })))
}
