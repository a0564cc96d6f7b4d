/// 定期実行ジョブ
///
/// HTTPサーバーと同じクライアントを使用し、スケジュール実行される処理を
/// コマンドラインから実行する。結果はJSONで標準出力に書き出す。
///
/// # 環境変数
/// サブコマンドごとに必要な設定のみ読み込む。
/// - queries: DB_PATH
/// - images / webp / lynx: BUCKET_NAME, BUCKET_URL 他
/// - top-pages: PLAUSIBLE_*, GHOST_*, DB_PATH
///
/// # ローカル実行
/// ```bash
/// # SQLバッチの実行
/// cargo run --bin blog-jobs -- queries --dir sql/tags
///
/// # 当月ディレクトリの画像を一括変換
/// cargo run --bin blog-jobs -- images
///
/// # 直近30日のアクセス上位ページを取り込み
/// cargo run --bin blog-jobs -- top-pages --period 30d --limit 100 --table weekly_stats --action replace
/// ```
use std::path::PathBuf;
use std::sync::Arc;

use blog_backend::application::{ImageSyncService, TopPagesService, run_sql_directory};
use blog_backend::domain::TimePeriod;
use blog_backend::infrastructure::{
    CdnFetcher, Database, DatabaseConfig, GhostClient, GhostConfig, IfExists, PlausibleClient,
    PlausibleConfig, S3ObjectStore, StorageConfig, init_logging,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

type JobError = Box<dyn std::error::Error + Send + Sync>;

/// コマンドライン引数
#[derive(Parser, Debug)]
#[command(name = "blog-jobs")]
#[command(about = "ブログバックエンドの定期実行ジョブ")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ディレクトリ内の.sqlファイルを1トランザクションで実行
    Queries {
        /// SQLファイルのディレクトリ
        #[arg(long)]
        dir: PathBuf,
    },
    /// ゴミ画像の削除とretina/mobile画像の生成
    Images {
        /// 対象ディレクトリ（省略時は当月ディレクトリ）
        #[arg(long)]
        directory: Option<String>,
    },
    /// retina画像のwebpコピーを作成
    Webp {
        /// 対象ディレクトリ（省略時は当月ディレクトリ）
        #[arg(long)]
        directory: Option<String>,
    },
    /// ランダムなLynx画像のURLを表示
    Lynx,
    /// アクセス上位ページをテーブルに取り込み
    TopPages {
        /// 集計期間（12mo, 6mo, month, 30d, 7d, day）
        #[arg(long, default_value = "month")]
        period: TimePeriod,
        /// 取得件数
        #[arg(long, default_value_t = 100)]
        limit: u32,
        /// 書き込み先テーブル
        #[arg(long)]
        table: String,
        /// 既存テーブルの扱い（append, replace, fail）
        #[arg(long, default_value = "append")]
        action: IfExists,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), JobError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn image_sync() -> Result<ImageSyncService, JobError> {
    let storage = StorageConfig::from_env()?;
    let store = Arc::new(S3ObjectStore::from_config(&storage).await);
    let fetcher = Arc::new(CdnFetcher::new(&storage)?);
    Ok(ImageSyncService::new(store, fetcher, storage))
}

fn folder_or_default(images: &ImageSyncService, directory: Option<String>) -> String {
    directory.unwrap_or_else(|| images.storage().default_folder())
}

async fn run(command: Command) -> Result<(), JobError> {
    match command {
        Command::Queries { dir } => {
            let config = DatabaseConfig::from_env();
            let database = Database::new(config.db_path()).await?;
            print_json(&run_sql_directory(&database, &dir).await?)
        }
        Command::Images { directory } => {
            let images = image_sync().await?;
            let folder = folder_or_default(&images, directory);
            print_json(&images.transform_folder(&folder).await?)
        }
        Command::Webp { directory } => {
            let images = image_sync().await?;
            let folder = folder_or_default(&images, directory);
            print_json(&images.webp_transform(&folder).await?)
        }
        Command::Lynx => {
            let images = image_sync().await?;
            print_json(&images.fetch_random_lynx_image().await?)
        }
        Command::TopPages {
            period,
            limit,
            table,
            action,
        } => {
            let plausible = PlausibleClient::new(&PlausibleConfig::from_env()?)?;
            let ghost = GhostClient::new(&GhostConfig::from_env()?)?;
            let database = Database::new(DatabaseConfig::from_env().db_path()).await?;
            let service = TopPagesService::new(Arc::new(plausible), Arc::new(ghost));

            let rows = service
                .import_top_pages(&database, period, limit, &table, action)
                .await?;
            print_json(&serde_json::json!({ "table": table, "rows": rows, "action": action.as_str() }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), JobError> {
    init_logging();

    let args = CliArgs::parse();
    info!(command = ?args.command, "ジョブを開始");

    if let Err(e) = run(args.command).await {
        error!(error = %e, "ジョブが失敗しました");
        return Err(e);
    }
    info!("ジョブが完了しました");
    Ok(())
}
