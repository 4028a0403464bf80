//! イメージ管理デーモンとの境界
//!
//! エンジンはこのトレイト越しにデーモンを操作する。本番実装は [`crate::docker::DockerDaemon`]。

use crate::error::DaemonError;
use futures_util::stream::BoxStream;
use imagesync_config::RegistryCredential;
use imagesync_core::BuildSpec;
use serde::Serialize;
use std::collections::HashMap;

/// デーモンが返す進捗メッセージのストリーム
pub type ProgressStream<'a> = BoxStream<'a, Result<ProgressMessage, StreamError>>;

/// イメージ管理デーモンのトレイト
#[allow(async_fn_in_trait)]
pub trait ImageDaemon {
    /// タグ付きイメージの一覧（中間レイヤーは含まない）
    async fn list_images(&self) -> Result<Vec<ImageRecord>, DaemonError>;

    /// `repository:tag` を pull する
    ///
    /// `tag` が空の場合、`repository` はダイジェスト付きの参照全体。
    fn pull_image<'a>(
        &'a self,
        repository: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> ProgressStream<'a>;

    /// `repository:tag` をプッシュする
    fn push_image<'a>(
        &'a self,
        repository: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> ProgressStream<'a>;

    /// tar アーカイブのコンテキストでビルドする
    async fn build_image<'a>(
        &'a self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> Result<ProgressStream<'a>, DaemonError>;

    /// `source` に `repository:tag` を付ける
    async fn tag_image(&self, source: &str, repository: &str, tag: &str)
    -> Result<(), DaemonError>;

    async fn remove_image(&self, id: &str) -> Result<Vec<RemovedItem>, DaemonError>;
}

/// ローカルイメージの要約
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
}

/// イメージ削除の結果1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RemovedItem {
    Untagged(String),
    Deleted(String),
}

/// 進捗メッセージ1件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressMessage {
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
    /// ビルド出力
    pub stream: Option<String>,
    pub error: Option<String>,
}

impl ProgressMessage {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }

    /// 1行分のテキストに整形
    ///
    /// 複数行の `stream` は空行を除いて空白で連結する。
    pub fn render(&self) -> String {
        if let Some(error) = &self.error {
            return format!("ERROR: {}", error);
        }

        let mut line = String::new();
        if let Some(id) = &self.id {
            line.push_str(id);
            line.push_str(": ");
        }

        match (&self.status, &self.progress, &self.stream) {
            (Some(status), Some(progress), _) if !progress.is_empty() => {
                line.push_str(status);
                line.push(' ');
                line.push_str(progress);
            }
            (_, _, Some(stream)) => {
                let joined = stream
                    .lines()
                    .map(str::trim_end)
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                line.push_str(&joined);
            }
            (Some(status), _, _) => line.push_str(status),
            _ => {}
        }
        line
    }
}

/// ストリームの読み出し失敗
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// フレームを解釈できない
    Malformed(String),
    /// デーモンとの通信が失敗した
    Transport(DaemonError),
}

impl From<bollard::errors::Error> for StreamError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::JsonDataError { .. }
            | bollard::errors::Error::JsonSerdeError { .. } => {
                StreamError::Malformed(err.to_string())
            }
            other => StreamError::Transport(DaemonError::from(other)),
        }
    }
}

/// デーモン向けのビルドオプション
///
/// ビルダーはレガシービルダー（BuildKit ではない）固定。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// コンテキストからの相対パス
    pub dockerfile: String,
    /// 先頭がイメージ名。残りはビルド後に付与する追加タグ
    pub tags: Vec<String>,
    pub force_remove: bool,
    pub remove: bool,
    pub no_cache: bool,
    pub target: Option<String>,
    pub build_args: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

impl BuildOptions {
    /// ビルド設定からオプションを組み立てる
    ///
    /// タグは `[image_name]` に `spec.tag` を順に重複なく連結したもの。
    pub fn from_spec(spec: &BuildSpec, image_name: &str) -> Self {
        let mut tags = vec![image_name.to_string()];
        for tag in &spec.tag {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let mut build_args = HashMap::with_capacity(spec.build_arg.len());
        for (key, value) in &spec.build_arg {
            build_args.insert(key.clone(), value.clone());
        }

        let mut labels = HashMap::with_capacity(spec.label.len());
        for (key, value) in &spec.label {
            labels.insert(key.clone(), value.clone());
        }

        Self {
            dockerfile: spec.dockerfile.replace('\\', "/"),
            tags,
            force_remove: spec.force_remove,
            remove: spec.remove,
            no_cache: spec.no_cache,
            target: spec.target.clone().filter(|t| !t.is_empty()),
            build_args,
            labels,
        }
    }

    /// ビルド時に付けるイメージ名
    pub fn primary_tag(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or_default()
    }

    /// ビルド後に付与する追加タグ
    pub fn extra_tags(&self) -> &[String] {
        self.tags.get(1..).unwrap_or_default()
    }
}
