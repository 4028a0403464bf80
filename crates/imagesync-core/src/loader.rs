//! リソース定義ファイルのローダー

use crate::error::{CoreError, Result};
use crate::model::ImageResource;
use std::path::Path;
use tracing::{debug, instrument};

/// YAMLファイルからリソース定義を読み込み、検証する
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_resource(path: &Path) -> Result<ImageResource> {
    let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let resource = parse_resource_str(&content)?;
    debug!(name = %resource.name, builds = resource.build.len(), "Resource loaded");
    Ok(resource)
}

/// 文字列からリソース定義をパース
pub fn parse_resource_str(content: &str) -> Result<ImageResource> {
    let resource: ImageResource = serde_yaml::from_str(content)?;
    resource.validate()?;
    Ok(resource)
}
