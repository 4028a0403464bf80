//! イメージのリコンサイル
//!
//! 宣言されたイメージ定義に対して、ローカル検索・pull・ビルド・プッシュを組み合わせ、
//! 最終的なイメージIDを解決します。
//!
//! `create` はローカルに無ければ pull し、それも失敗した場合だけビルドする。
//! `force_build` の場合は検索せずにビルドする。IDが決まったら `push_remote` の場合だけ
//! プッシュし、最後にローカルの状態を読み直す。

use crate::builder::ImageBuilder;
use crate::daemon::{ImageDaemon, ImageRecord, RemovedItem};
use crate::error::{ImageError, Result};
use crate::index::LocalImageIndex;
use crate::puller::ImagePuller;
use crate::pusher::ImagePusher;
use imagesync_config::CredentialTable;
use imagesync_core::{Acquisition, ImageResource, ImageState};
use tracing::instrument;

/// `find_or_pull` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub record: ImageRecord,
    pub acquisition: Acquisition,
    /// pull した場合のログ
    pub pull_output: Option<String>,
}

pub struct ImageController<D> {
    daemon: D,
    credentials: CredentialTable,
}

impl<D: ImageDaemon> ImageController<D> {
    pub fn new(daemon: D, credentials: CredentialTable) -> Self {
        Self {
            daemon,
            credentials,
        }
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    /// イメージを用意し、状態を返す
    #[instrument(skip_all, fields(image = %resource.name))]
    pub async fn create(&self, resource: &ImageResource) -> Result<ImageState> {
        let name = resource.name.as_str();
        if name.is_empty() {
            return Err(ImageError::EmptyName);
        }

        let mut acquisition = None;
        let mut pull_output = None;
        let mut build_output = None;

        let needs_build = if !resource.has_build() {
            false
        } else if resource.force_build {
            tracing::debug!("force_build is set, building {}", name);
            true
        } else {
            match self.find_or_pull(name).await {
                Ok(lookup) => {
                    tracing::debug!("Skipping build, image available: {}", lookup.record.id);
                    acquisition = Some(lookup.acquisition);
                    pull_output = lookup.pull_output;
                    false
                }
                Err(e) => {
                    tracing::debug!("Image not available ({}), falling back to build", e);
                    true
                }
            }
        };

        if needs_build {
            let builder = ImageBuilder::new(&self.daemon);
            for spec in &resource.build {
                build_output = Some(builder.build(spec, name).await?);
            }
            acquisition = Some(Acquisition::Built);
        }

        let lookup = self
            .find_or_pull(name)
            .await
            .map_err(|source| ImageError::Resolve {
                image: name.to_string(),
                source: Box::new(source),
            })?;
        tracing::debug!("Resolved {} to {}", name, lookup.record.id);
        let acquisition = acquisition.unwrap_or(lookup.acquisition);
        let pull_output = pull_output.or(lookup.pull_output);

        let push_output = if resource.push_remote {
            Some(self.push(name).await?)
        } else {
            None
        };

        let mut state = self
            .read(name)
            .await?
            .ok_or_else(|| ImageError::NotFound {
                image: name.to_string(),
            })?;
        state.build_output = build_output;
        state.pull_output = pull_output;
        state.push_output = push_output;
        state.acquired_via = Some(acquisition);

        tracing::info!("Image ready: {} ({})", name, state.latest);
        Ok(state)
    }

    /// ローカルのイメージ状態を取得（存在しなければ `None`）
    #[instrument(skip(self))]
    pub async fn read(&self, name: &str) -> Result<Option<ImageState>> {
        let index = LocalImageIndex::fetch(&self.daemon).await?;
        Ok(index
            .search(name)
            .map(|record| ImageState::resolved(&record.id, name)))
    }

    /// イメージを取得し直す（ビルドはしない）
    #[instrument(skip_all, fields(image = %resource.name))]
    pub async fn update(&self, resource: &ImageResource) -> Result<ImageState> {
        let name = resource.name.as_str();
        let lookup = self.find_or_pull(name).await?;

        let push_output = if resource.push_remote {
            Some(self.push(name).await?)
        } else {
            None
        };

        let mut state = self
            .read(name)
            .await?
            .ok_or_else(|| ImageError::NotFound {
                image: name.to_string(),
            })?;
        state.pull_output = lookup.pull_output;
        state.push_output = push_output;
        state.acquired_via = Some(lookup.acquisition);
        Ok(state)
    }

    /// ローカルのイメージを削除
    ///
    /// `keep_locally` の場合は何もしない。イメージが存在しない場合も成功。
    #[instrument(skip_all, fields(image = %resource.name))]
    pub async fn delete(&self, resource: &ImageResource) -> Result<Vec<RemovedItem>> {
        if resource.keep_locally {
            tracing::debug!("keep_locally is set, leaving {} in place", resource.name);
            return Ok(Vec::new());
        }

        let name = resource.name.as_str();
        if name.is_empty() {
            return Err(ImageError::EmptyName);
        }

        let index = LocalImageIndex::fetch(&self.daemon).await?;
        let Some(record) = index.search(name) else {
            tracing::debug!("Image {} not found locally, nothing to remove", name);
            return Ok(Vec::new());
        };

        tracing::info!("Removing image: {} ({})", name, record.id);
        self.daemon
            .remove_image(&record.id)
            .await
            .map_err(|source| ImageError::Daemon {
                operation: "remove",
                image: name.to_string(),
                source,
            })
    }

    /// ローカル検索 → 見つからなければ pull → 再検索
    pub async fn find_or_pull(&self, name: &str) -> Result<Lookup> {
        if name.is_empty() {
            return Err(ImageError::EmptyName);
        }

        let index = LocalImageIndex::fetch(&self.daemon).await?;
        if let Some(record) = index.search(name) {
            tracing::debug!("Found {} locally: {}", name, record.id);
            return Ok(Lookup {
                record: record.clone(),
                acquisition: Acquisition::Local,
                pull_output: None,
            });
        }

        tracing::debug!("{} not found locally, pulling", name);
        let output = ImagePuller::new(&self.daemon, &self.credentials)
            .pull(name)
            .await?;

        let index = LocalImageIndex::fetch(&self.daemon).await?;
        match index.search(name) {
            Some(record) => Ok(Lookup {
                record: record.clone(),
                acquisition: Acquisition::Pulled,
                pull_output: Some(output),
            }),
            None => Err(ImageError::NotFound {
                image: name.to_string(),
            }),
        }
    }

    async fn push(&self, name: &str) -> Result<String> {
        ImagePusher::new(&self.daemon, &self.credentials)
            .push(name)
            .await
    }
}
