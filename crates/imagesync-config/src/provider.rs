//! プロバイダー設定
//!
//! Docker ホストと認証情報の取得元を指定する YAML ファイル。
//!
//! ```yaml
//! host: unix:///var/run/docker.sock
//! config_file: ~/.docker/config.json
//! registry_auth:
//!   - address: registry.example.com
//!     username: ci
//!     password: s3cret
//!   - address: ghcr.io
//!     config_file: ./ci/docker-config.json
//! ```

use crate::credentials::{CredentialTable, RegistryCredential, load_docker_config};
use crate::error::{ConfigError, Result};
use crate::{expand_home, find_config_file};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Docker デーモンのアドレス（省略時は DOCKER_HOST / ローカルデフォルト）
    #[serde(default)]
    pub host: Option<String>,
    /// Docker config.json のパス
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// レジストリごとの明示的な認証情報
    #[serde(default)]
    pub registry_auth: Vec<RegistryAuthEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryAuthEntry {
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// username/password の代わりに読み込む config.json
    #[serde(default)]
    pub config_file: Option<PathBuf>,
}

impl ProviderConfig {
    /// 設定ファイルを探して読み込む（見つからなければデフォルト）
    pub fn discover() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("No provider config found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!("Loaded provider config from {:?}", path);
        Ok(config)
    }

    /// 使用する Docker config.json のパス
    ///
    /// 優先順位:
    /// 1. 設定ファイルの `config_file`
    /// 2. `$DOCKER_CONFIG/config.json`
    /// 3. `~/.docker/config.json`
    pub fn docker_config_path(&self) -> PathBuf {
        if let Some(path) = &self.config_file {
            return expand_home(path);
        }

        std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json")
    }

    /// 認証テーブルを作成
    ///
    /// config.json の内容に `registry_auth` のエントリを上書きする。
    pub fn credential_table(&self) -> Result<CredentialTable> {
        let mut table = load_docker_config(&self.docker_config_path())?;

        for entry in &self.registry_auth {
            let credential = entry.resolve()?;
            tracing::debug!("Using explicit credentials for {}", entry.address);
            table.insert(&entry.address, credential);
        }

        Ok(table)
    }
}

impl RegistryAuthEntry {
    fn resolve(&self) -> Result<RegistryCredential> {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Ok(RegistryCredential::basic(username, password, &self.address));
        }

        if let Some(config_file) = &self.config_file {
            let table = load_docker_config(&expand_home(config_file))?;
            return table.get(&self.address).cloned().ok_or_else(|| {
                ConfigError::InvalidRegistryAuth {
                    address: self.address.clone(),
                    message: format!("{} に認証情報がありません", config_file.display()),
                }
            });
        }

        Err(ConfigError::InvalidRegistryAuth {
            address: self.address.clone(),
            message: "username/password または config_file を指定してください".to_string(),
        })
    }
}
