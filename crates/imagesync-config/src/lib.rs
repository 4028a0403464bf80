//! imagesync の設定
//!
//! プロバイダー設定ファイルの探索と読み込み、レジストリ認証テーブルの構築を行います。

pub mod credentials;
pub mod error;
pub mod provider;

pub use credentials::{
    CredentialTable, DOCKER_HUB_REGISTRY, RegistryCredential, load_docker_config,
    normalize_registry_address,
};
pub use error::*;
pub use provider::{ProviderConfig, RegistryAuthEntry};

use std::path::{Path, PathBuf};

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "IMAGESYNC_CONFIG";

/// プロバイダー設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 IMAGESYNC_CONFIG (直接パス指定)
/// 2. カレントディレクトリ: imagesync.yaml, .imagesync.yaml
/// 3. ./.imagesync/ ディレクトリ内: imagesync.yaml
/// 4. ~/.config/imagesync/config.yaml (グローバル設定)
///
/// 見つからない場合は `None`（デフォルト設定で動作する）。
pub fn find_config_file() -> Option<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("{} is set but {:?} does not exist", CONFIG_PATH_ENV, path);
    }

    // 2-3. カレントディレクトリと ./.imagesync/
    if let Ok(current_dir) = std::env::current_dir() {
        let candidates = [
            current_dir.join("imagesync.yaml"),
            current_dir.join(".imagesync.yaml"),
            current_dir.join(".imagesync").join("imagesync.yaml"),
        ];
        if let Some(found) = candidates.into_iter().find(|p| p.exists()) {
            return Some(found);
        }
    }

    // 4. グローバル設定
    dirs::config_dir()
        .map(|dir| dir.join("imagesync").join("config.yaml"))
        .filter(|path| path.exists())
}

/// 先頭の `~` をホームディレクトリに展開
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}
