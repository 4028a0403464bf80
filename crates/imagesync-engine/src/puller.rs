//! イメージの pull

use crate::auth::resolve_auth;
use crate::daemon::ImageDaemon;
use crate::error::{ImageError, Result};
use crate::stream::decode_stream;
use imagesync_config::CredentialTable;
use imagesync_core::ImageReference;
use tracing::instrument;

/// レジストリからイメージを取得する
pub struct ImagePuller<'a, D> {
    daemon: &'a D,
    credentials: &'a CredentialTable,
}

impl<'a, D: ImageDaemon> ImagePuller<'a, D> {
    pub fn new(daemon: &'a D, credentials: &'a CredentialTable) -> Self {
        Self {
            daemon,
            credentials,
        }
    }

    /// イメージを pull し、pull ログを返す
    ///
    /// タグ省略時は `latest`。ダイジェスト指定はタグなしで参照全体を渡す。再試行はしない。
    #[instrument(skip(self))]
    pub async fn pull(&self, name: &str) -> Result<String> {
        let reference = ImageReference::parse(name);
        let credential = resolve_auth(&reference, self.credentials);
        let (repository, tag) = if reference.is_digest() {
            (reference.raw.clone(), "")
        } else {
            (reference.name_without_tag(), reference.tag_or_latest())
        };

        tracing::info!("Pulling image: {}", name);

        let stream = self.daemon.pull_image(&repository, tag, &credential);
        let (output, result) = decode_stream(stream).await;

        match result {
            Ok(()) => Ok(output),
            Err(source) => Err(ImageError::Pull {
                image: name.to_string(),
                source,
                output,
            }),
        }
    }
}
