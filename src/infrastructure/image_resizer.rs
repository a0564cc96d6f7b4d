//! モバイル用画像の生成
//!
//! 幅が閾値を超える画像を固定サイズに縮小し、JPEGとして再エンコードする。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use thiserror::Error;
use tracing::debug;

/// この幅を超える画像のみ縮小する（ピクセル）
pub const MOBILE_WIDTH_THRESHOLD: u32 = 1000;

/// モバイル画像の幅（ピクセル）
pub const MOBILE_WIDTH: u32 = 600;

/// モバイル画像の高さ（ピクセル）
pub const MOBILE_HEIGHT: u32 = 346;

/// JPEG品質
const JPEG_QUALITY: u8 = 90;

/// 画像変換のエラー型
#[derive(Debug, Error)]
pub enum ResizeError {
    /// デコード失敗
    #[error("画像のデコードに失敗: {0}")]
    Decode(String),
    /// エンコード失敗
    #[error("画像のエンコードに失敗: {0}")]
    Encode(String),
    /// ブロッキングタスクの実行失敗
    #[error("タスク実行エラー: {0}")]
    Task(String),
}

/// モバイル用画像を生成（ブロッキング版）
///
/// # 戻り値
/// * `Ok(Some(jpeg))` - 縮小したJPEG
/// * `Ok(None)` - 幅が閾値以下のため対象外
pub fn resize_for_mobile(bytes: &[u8]) -> Result<Option<Vec<u8>>, ResizeError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ResizeError::Decode(e.to_string()))?;
    let (width, height) = decoded.dimensions();
    if width <= MOBILE_WIDTH_THRESHOLD {
        debug!(width, height, "幅が閾値以下のためモバイル画像を作成しません");
        return Ok(None);
    }

    let resized = decoded.resize_exact(MOBILE_WIDTH, MOBILE_HEIGHT, FilterType::Lanczos3);

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&resized.to_rgb8())
        .map_err(|e| ResizeError::Encode(e.to_string()))?;
    Ok(Some(buffer.into_inner()))
}

/// モバイル用画像を生成
///
/// デコードと縮小はブロッキング処理のため`spawn_blocking`で実行する。
pub async fn create_mobile_image(bytes: Vec<u8>) -> Result<Option<Vec<u8>>, ResizeError> {
    tokio::task::spawn_blocking(move || resize_for_mobile(&bytes))
        .await
        .map_err(|e| ResizeError::Task(e.to_string()))?
}

/// テスト用のPNG画像を生成
#[cfg(test)]
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::new(width, height);
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wide_image_is_resized_to_fixed_canvas() {
        let output = create_mobile_image(sample_png(1200, 800)).await.unwrap().unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.dimensions(), (MOBILE_WIDTH, MOBILE_HEIGHT));
        assert_eq!(
            image::guess_format(&output).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[tokio::test]
    async fn test_narrow_image_is_skipped() {
        assert!(create_mobile_image(sample_png(1000, 600)).await.unwrap().is_none());
    }

    #[test]
    fn test_invalid_bytes_fail_to_decode() {
        assert!(matches!(
            resize_for_mobile(b"not an image"),
            Err(ResizeError::Decode(_))
        ));
    }
}
