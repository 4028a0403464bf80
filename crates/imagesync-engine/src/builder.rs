//! イメージビルド処理
//!
//! ビルド設定からコンテキストを作成し、デーモンでビルドしてログを返します。

use crate::context::{
    ContextBuilder, is_within_context, read_dockerignore, trim_build_files_from_excludes,
};
use crate::daemon::{BuildOptions, ImageDaemon};
use crate::error::{ImageError, Result};
use crate::stream::decode_stream;
use imagesync_config::expand_home;
use imagesync_core::{BuildSpec, ImageReference};
use std::collections::HashMap;
use std::path::Path;
use tracing::instrument;

const SENSITIVE_PATTERNS: [&str; 5] = ["password", "token", "secret", "api_key", "private_key"];

pub struct ImageBuilder<'a, D> {
    daemon: &'a D,
}

impl<'a, D: ImageDaemon> ImageBuilder<'a, D> {
    pub fn new(daemon: &'a D) -> Self {
        Self { daemon }
    }

    /// イメージをビルドし、ビルドログを返す
    ///
    /// ビルド成功後、追加タグ（`spec.tag`）をイメージに付与する。
    #[instrument(skip_all, fields(image = %image_name))]
    pub async fn build(&self, spec: &BuildSpec, image_name: &str) -> Result<String> {
        let context_dir = expand_home(&spec.path);
        if !context_dir.is_dir() {
            return Err(ImageError::ContextNotFound(context_dir));
        }

        let options = BuildOptions::from_spec(spec, image_name);
        let dockerfile_path = context_dir.join(&options.dockerfile);
        if !is_within_context(Path::new(&options.dockerfile)) || !dockerfile_path.is_file() {
            return Err(ImageError::DockerfileNotFound(dockerfile_path));
        }

        for key in sensitive_build_args(&options.build_args) {
            tracing::warn!(
                "警告: ビルド引数 '{}' は機密情報を含む可能性があります。\n\
                 ビルド引数はイメージ履歴に記録されます。\n\
                 機密情報はビルド引数ではなく、シークレットマウントを使用してください。",
                key
            );
        }

        let excludes = read_dockerignore(&context_dir)?;
        let excludes = trim_build_files_from_excludes(excludes, &options.dockerfile, false)?;
        let context = ContextBuilder::create_context(&context_dir, &excludes)?;

        tracing::info!("Building image: {}", image_name);

        let stream = self
            .daemon
            .build_image(context, &options)
            .await
            .map_err(|source| ImageError::Daemon {
                operation: "build",
                image: image_name.to_string(),
                source,
            })?;

        let (output, result) = decode_stream(stream).await;
        if let Err(source) = result {
            return Err(ImageError::Build {
                image: image_name.to_string(),
                source,
                output,
            });
        }

        for tag in options.extra_tags() {
            let reference = ImageReference::parse(tag);
            tracing::debug!("Tagging {} as {}", options.primary_tag(), tag);
            self.daemon
                .tag_image(
                    options.primary_tag(),
                    &reference.name_without_tag(),
                    reference.tag_or_latest(),
                )
                .await
                .map_err(|source| ImageError::Daemon {
                    operation: "tag",
                    image: tag.clone(),
                    source,
                })?;
        }

        tracing::info!("Successfully built: {}", image_name);
        Ok(output)
    }
}

/// 機密情報を含む可能性のあるビルド引数名（ソート済み）
pub fn sensitive_build_args(build_args: &HashMap<String, String>) -> Vec<&str> {
    let mut keys: Vec<&str> = build_args
        .keys()
        .filter(|key| {
            let key_lower = key.to_lowercase();
            SENSITIVE_PATTERNS
                .iter()
                .any(|pattern| key_lower.contains(pattern))
        })
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    keys
}
