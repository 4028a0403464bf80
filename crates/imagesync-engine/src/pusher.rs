//! イメージプッシュ処理
//!
//! ローカルのイメージをコンテナレジストリにプッシュします。

use crate::auth::resolve_auth;
use crate::daemon::ImageDaemon;
use crate::error::{ImageError, Result};
use crate::stream::decode_stream;
use imagesync_config::CredentialTable;
use imagesync_core::ImageReference;
use tracing::instrument;

/// イメージプッシュを実行するハンドラ
pub struct ImagePusher<'a, D> {
    daemon: &'a D,
    credentials: &'a CredentialTable,
}

impl<'a, D: ImageDaemon> ImagePusher<'a, D> {
    pub fn new(daemon: &'a D, credentials: &'a CredentialTable) -> Self {
        Self {
            daemon,
            credentials,
        }
    }

    /// イメージをレジストリにプッシュし、プッシュログを返す
    #[instrument(skip(self))]
    pub async fn push(&self, name: &str) -> Result<String> {
        let reference = ImageReference::parse(name);
        let tag = reference.tag_or_latest();
        validate_tag(tag)?;

        let credential = resolve_auth(&reference, self.credentials);
        let repository = reference.name_without_tag();

        tracing::info!("Pushing image: {}:{}", repository, tag);

        let stream = self.daemon.push_image(&repository, tag, &credential);
        let (output, result) = decode_stream(stream).await;

        match result {
            Ok(()) => Ok(output),
            Err(source) => Err(ImageError::Push {
                image: name.to_string(),
                source,
                output,
            }),
        }
    }
}

/// タグのバリデーション
///
/// Docker タグの制約: 128文字以下、英数字・ピリオド・ハイフン・アンダースコアのみ、
/// 先頭はピリオドまたはハイフンではない。
fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(ImageError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(ImageError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(ImageError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return Err(ImageError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}
