/// アクセス上位ページの集計
///
/// 分析サービスの集計結果にCMSの記事情報を結合する。
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::analytics::filter_post_visits;
use crate::domain::{PageVisit, TimePeriod};
use crate::infrastructure::{
    Database, DatabaseError, Frame, GhostError, IfExists, PlausibleError, PostCatalog, Record,
    VisitSource,
};

/// アクセス上位ページ処理のエラー型
#[derive(Debug, Error)]
pub enum TopPagesError {
    #[error(transparent)]
    Analytics(#[from] PlausibleError),
    #[error(transparent)]
    Cms(#[from] GhostError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("could not serialise page visits: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct TopPagesService {
    visits: Arc<dyn VisitSource>,
    catalog: Arc<dyn PostCatalog>,
}

impl TopPagesService {
    pub fn new(visits: Arc<dyn VisitSource>, catalog: Arc<dyn PostCatalog>) -> Self {
        Self { visits, catalog }
    }

    /// 期間内のアクセス上位記事（タイトル・URL付き）
    ///
    /// 一覧ページ、CMSの固定ページ、対応する記事が無いページは除外する。
    pub async fn top_pages(
        &self,
        period: TimePeriod,
        limit: u32,
    ) -> Result<Vec<PageVisit>, TopPagesError> {
        let visits = self.visits.fetch_top_visited_urls(period, limit).await?;
        let page_slugs: Vec<String> = self
            .catalog
            .pages()
            .await?
            .into_iter()
            .map(|page| page.slug)
            .collect();

        let mut enriched = Vec::new();
        for visit in filter_post_visits(visits, &page_slugs) {
            let slug = visit.slug_from_page().to_string();
            match self.catalog.post_by_slug(&slug).await? {
                Some(post) => {
                    enriched.push(visit.enrich(&post.title, self.catalog.site_url(), &post.url))
                }
                None => debug!(slug = %slug, "no post found for page"),
            }
        }
        info!(period = %period, count = enriched.len(), "Enriched top pages");
        Ok(enriched)
    }

    /// アクセス上位記事を取得して`table`に書き込む
    ///
    /// 書き込んだ行数を返す。
    pub async fn import_top_pages(
        &self,
        database: &Database,
        period: TimePeriod,
        limit: u32,
        table: &str,
        action: IfExists,
    ) -> Result<usize, TopPagesError> {
        let pages = self.top_pages(period, limit).await?;
        let records = pages
            .iter()
            .map(|page| match serde_json::to_value(page)? {
                Value::Object(record) => Ok(record),
                _ => Ok(Record::new()),
            })
            .collect::<Result<Vec<Record>, serde_json::Error>>()?;

        Ok(database
            .insert_dataframe(&Frame::from_records(&records), table, action)
            .await?)
    }
}
