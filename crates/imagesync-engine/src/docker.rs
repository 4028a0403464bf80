//! Docker Engine API 実装（bollard）

use crate::daemon::{
    BuildOptions, ImageDaemon, ImageRecord, ProgressMessage, ProgressStream, RemovedItem,
    StreamError,
};
use crate::error::DaemonError;
use bollard::auth::DockerCredentials;
use bollard::models::{BuildInfo, CreateImageInfo, ImageSummary, PushImageInfo};
use bollard::query_parameters::{
    BuildImageOptions, BuilderVersion, CreateImageOptions, ListImagesOptionsBuilder,
    PushImageOptionsBuilder, RemoveImageOptionsBuilder, TagImageOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{Either, Full};
use imagesync_config::RegistryCredential;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// bollard 経由で Docker デーモンを操作する
pub struct DockerDaemon {
    docker: Docker,
}

impl DockerDaemon {
    /// デーモンに接続
    ///
    /// `host` が `None` の場合は DOCKER_HOST / ローカルソケットを使用。
    /// `unix://` はソケット、`tcp://` と `http://` は HTTP で接続する。
    pub fn connect(host: Option<&str>) -> Result<Self, DaemonError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults()?,
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Some(host) => {
                return Err(DaemonError::Connection(format!(
                    "unsupported Docker host: {}",
                    host
                )));
            }
        };
        Ok(Self { docker })
    }
}

impl ImageDaemon for DockerDaemon {
    async fn list_images(&self) -> Result<Vec<ImageRecord>, DaemonError> {
        let options = ListImagesOptionsBuilder::new().all(false).build();
        let images = self.docker.list_images(Some(options)).await?;
        Ok(images.into_iter().map(ImageRecord::from).collect())
    }

    fn pull_image<'a>(
        &'a self,
        repository: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> ProgressStream<'a> {
        let options = CreateImageOptions {
            from_image: Some(repository.to_string()),
            tag: (!tag.is_empty()).then(|| tag.to_string()),
            platform: String::new(),
            ..Default::default()
        };

        let stream = self
            .docker
            .create_image(Some(options), None, to_docker_credentials(credential));

        stream
            .map(|item| item.map(ProgressMessage::from).map_err(StreamError::from))
            .boxed()
    }

    fn push_image<'a>(
        &'a self,
        repository: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> ProgressStream<'a> {
        let options = PushImageOptionsBuilder::new().tag(tag).build();

        let stream =
            self.docker
                .push_image(repository, Some(options), to_docker_credentials(credential));

        stream
            .map(|item| item.map(ProgressMessage::from).map_err(StreamError::from))
            .boxed()
    }

    async fn build_image<'a>(
        &'a self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> Result<ProgressStream<'a>, DaemonError> {
        // BuildKit ではなくレガシービルダーを使う
        let build_options = BuildImageOptions {
            dockerfile: options.dockerfile.clone(),
            t: Some(options.primary_tag().to_string()),
            version: BuilderVersion::BuilderV1,
            target: options.target.clone().unwrap_or_default(),
            buildargs: Some(options.build_args.clone()),
            labels: Some(options.labels.clone()),
            nocache: options.no_cache,
            rm: options.remove,
            forcerm: options.force_remove,
            platform: String::new(),
            ..Default::default()
        };

        tracing::debug!("Build options: {:?}", build_options);

        let body = Full::new(Bytes::from(context));
        let stream = self
            .docker
            .build_image(build_options, None, Some(Either::Left(body)));

        Ok(stream
            .map(|item| item.map(ProgressMessage::from).map_err(StreamError::from))
            .boxed())
    }

    async fn tag_image(
        &self,
        source: &str,
        repository: &str,
        tag: &str,
    ) -> Result<(), DaemonError> {
        let options = TagImageOptionsBuilder::new()
            .repo(repository)
            .tag(tag)
            .build();
        self.docker.tag_image(source, Some(options)).await?;
        Ok(())
    }

    async fn remove_image(&self, id: &str) -> Result<Vec<RemovedItem>, DaemonError> {
        let options = RemoveImageOptionsBuilder::new()
            .force(false)
            .noprune(false)
            .build();
        let items = self.docker.remove_image(id, Some(options), None).await?;

        let mut removed = Vec::with_capacity(items.len());
        for item in items {
            if let Some(untagged) = item.untagged {
                removed.push(RemovedItem::Untagged(untagged));
            }
            if let Some(deleted) = item.deleted {
                removed.push(RemovedItem::Deleted(deleted));
            }
        }
        Ok(removed)
    }
}

/// 空の認証情報は匿名アクセスとして送らない
fn to_docker_credentials(credential: &RegistryCredential) -> Option<DockerCredentials> {
    if credential.is_empty() {
        return None;
    }
    Some(DockerCredentials {
        username: credential.username.clone(),
        password: credential.password.clone(),
        serveraddress: credential.server_address.clone(),
        identitytoken: credential.identity_token.clone(),
        registrytoken: credential.registry_token.clone(),
        ..Default::default()
    })
}

impl From<ImageSummary> for ImageRecord {
    fn from(summary: ImageSummary) -> Self {
        Self {
            id: summary.id,
            repo_tags: summary.repo_tags,
            repo_digests: summary.repo_digests,
        }
    }
}

impl From<CreateImageInfo> for ProgressMessage {
    fn from(info: CreateImageInfo) -> Self {
        Self {
            id: info.id,
            status: info.status,
            progress: info.progress,
            stream: None,
            error: info.error,
        }
    }
}

impl From<PushImageInfo> for ProgressMessage {
    fn from(info: PushImageInfo) -> Self {
        Self {
            id: None,
            status: info.status,
            progress: info.progress,
            stream: None,
            error: info.error,
        }
    }
}

impl From<BuildInfo> for ProgressMessage {
    fn from(info: BuildInfo) -> Self {
        let error = info.error.or_else(|| {
            info.error_detail
                .map(|detail| detail.message.unwrap_or_else(|| "Unknown build error".to_string()))
        });
        Self {
            id: info.id,
            status: info.status,
            progress: info.progress,
            stream: info.stream,
            error,
        }
    }
}
