//! ローカルイメージのインデックス
//!
//! デーモンのイメージ一覧から、ID・短縮ID・タグ・ダイジェストで引ける表を作ります。
//! 呼び出しごとに作り直し、差分更新はしません。

use crate::daemon::{ImageDaemon, ImageRecord};
use crate::error::{ImageError, Result};
use imagesync_core::DEFAULT_TAG;
use std::collections::HashMap;

const SHORT_ID_LEN: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct LocalImageIndex {
    images: Vec<ImageRecord>,
    keys: HashMap<String, usize>,
}

impl LocalImageIndex {
    /// デーモンから一覧を取得してインデックスを作成
    pub async fn fetch<D: ImageDaemon>(daemon: &D) -> Result<Self> {
        let records = daemon.list_images().await.map_err(ImageError::List)?;
        let index = Self::from_records(records);
        tracing::debug!(
            "Local image index: {} images, keys: {:?}",
            index.len(),
            index.keys()
        );
        Ok(index)
    }

    /// 一覧からインデックスを作成
    ///
    /// キーが衝突した場合は後のイメージが優先される。
    pub fn from_records(records: Vec<ImageRecord>) -> Self {
        let mut keys = HashMap::new();

        for (pos, image) in records.iter().enumerate() {
            keys.insert(
                image.id.get(..SHORT_ID_LEN).unwrap_or(&image.id).to_string(),
                pos,
            );
            keys.insert(image.id.clone(), pos);

            // `docker images` が表示する短縮ID
            if let Some(hex) = image.id.strip_prefix("sha256:") {
                keys.insert(hex.get(..SHORT_ID_LEN).unwrap_or(hex).to_string(), pos);
            }

            for tag in &image.repo_tags {
                keys.insert(tag.clone(), pos);
            }
            for digest in &image.repo_digests {
                keys.insert(digest.clone(), pos);
            }
        }

        Self {
            images: records,
            keys,
        }
    }

    /// 名前で検索（完全一致、次に `:latest` 付き）
    pub fn search(&self, name: &str) -> Option<&ImageRecord> {
        if let Some(&pos) = self.keys.get(name) {
            return self.images.get(pos);
        }
        let with_latest = format!("{}:{}", name, DEFAULT_TAG);
        self.keys
            .get(&with_latest)
            .and_then(|&pos| self.images.get(pos))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// 登録されているキー（ソート済み）
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
