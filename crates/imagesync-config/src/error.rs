use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO エラー: {path}\n理由: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルのパースに失敗しました: {path}\n理由: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("registry_auth '{address}' が不正です: {message}")]
    InvalidRegistryAuth { address: String, message: String },

    #[error("Authentication failed for registry '{registry}': {message}")]
    AuthFailed { registry: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
