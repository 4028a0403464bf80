//! イメージリソース定義

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// 宣言的なイメージリソース
///
/// YAML形式：
/// ```yaml
/// name: ghcr.io/org/app:v1
/// force_build: false
/// keep_locally: false
/// push_remote: true
/// build:
///   - path: ./app
///     dockerfile: Dockerfile
///     tag: ["app:dev"]
///     build_arg:
///       NODE_VERSION: "20"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResource {
    pub name: String,
    /// ビルド設定（省略時はpullのみ）
    #[serde(default)]
    pub build: Vec<BuildSpec>,
    /// ローカルに同名イメージがあってもビルドする
    #[serde(default)]
    pub force_build: bool,
    /// 削除時にローカルイメージを残す
    #[serde(default)]
    pub keep_locally: bool,
    /// 解決後にレジストリへプッシュする
    #[serde(default)]
    pub push_remote: bool,
}

impl ImageResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_build(&self) -> bool {
        !self.build.is_empty()
    }

    /// 入力値の検証
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::EmptyName);
        }
        for (i, spec) in self.build.iter().enumerate() {
            if spec.path.as_os_str().is_empty() {
                return Err(CoreError::InvalidConfig(format!(
                    "build[{}]: path が指定されていません",
                    i
                )));
            }
            if spec.dockerfile.trim().is_empty() {
                return Err(CoreError::InvalidConfig(format!(
                    "build[{}]: dockerfile が空です",
                    i
                )));
            }
        }
        Ok(())
    }
}

/// ビルド設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// ビルドコンテキストのディレクトリ
    pub path: PathBuf,
    /// コンテキストからの相対パス
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// 追加タグ
    #[serde(default)]
    pub tag: Vec<String>,
    /// 失敗時も中間コンテナを削除
    #[serde(default)]
    pub force_remove: bool,
    /// 成功時に中間コンテナを削除
    #[serde(default = "default_true")]
    pub remove: bool,
    #[serde(default)]
    pub no_cache: bool,
    /// マルチステージビルドのターゲット
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub build_arg: HashMap<String, String>,
    #[serde(default)]
    pub label: HashMap<String, String>,
}

impl BuildSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dockerfile: default_dockerfile(),
            tag: Vec::new(),
            force_remove: false,
            remove: true,
            no_cache: false,
            target: None,
            build_arg: HashMap::new(),
            label: HashMap::new(),
        }
    }
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_true() -> bool {
    true
}
