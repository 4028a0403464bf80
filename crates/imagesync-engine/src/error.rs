use std::path::PathBuf;
use thiserror::Error;

/// デーモン呼び出しの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaemonError {
    #[error(
        "Docker connection error: {0}\n\nHint:\n  • Make sure the Docker daemon is running\n  • Check DOCKER_HOST or the `host` setting"
    )]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Docker API error: {0}")]
    Api(String),
}

impl From<bollard::errors::Error> for DaemonError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => DaemonError::NotFound(message.clone()),
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    DaemonError::Connection(err_str)
                } else {
                    DaemonError::Api(err_str)
                }
            }
        }
    }
}

/// 進捗ストリームのデコード失敗
///
/// `Malformed` と `Transport` はデコードを途中で打ち切った構造的な失敗、
/// `OperationFailed` はストリームを最後まで読んだ上での操作失敗。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("problem decoding message from docker daemon: {0}")]
    Malformed(String),

    #[error("daemon stream interrupted: {0}")]
    Transport(DaemonError),

    #[error("unable to complete operation: {0}")]
    OperationFailed(String),
}

impl DecodeError {
    /// ストリームを最後まで読めなかった失敗かどうか
    pub fn is_structural(&self) -> bool {
        !matches!(self, DecodeError::OperationFailed(_))
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Empty image name is not allowed")]
    EmptyName,

    #[error("Unable to list Docker images: {0}")]
    List(#[source] DaemonError),

    #[error("Unable to {operation} image {image}: {source}")]
    Daemon {
        operation: &'static str,
        image: String,
        #[source]
        source: DaemonError,
    },

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Invalid build context {path}: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid .dockerignore pattern '{pattern}': {message}")]
    IgnorePattern { pattern: String, message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Unable to build image {image}: {source}\n\n{output}")]
    Build {
        image: String,
        #[source]
        source: DecodeError,
        output: String,
    },

    #[error("Unable to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: DecodeError,
        output: String,
    },

    #[error("Unable to push image {image}: {source}")]
    Push {
        image: String,
        #[source]
        source: DecodeError,
        output: String,
    },

    #[error("Unable to find or pull image {image}")]
    NotFound { image: String },

    #[error("Unable to read Docker image {image} into resource: {source}")]
    Resolve {
        image: String,
        #[source]
        source: Box<ImageError>,
    },
}

impl ImageError {
    /// 失敗した操作のデーモン出力（ビルド・pull・プッシュのみ）
    pub fn output(&self) -> Option<&str> {
        match self {
            ImageError::Build { output, .. }
            | ImageError::Pull { output, .. }
            | ImageError::Push { output, .. } => Some(output),
            ImageError::Resolve { source, .. } => source.output(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_kinds() {
        assert!(DecodeError::Malformed("eof".into()).is_structural());
        assert!(DecodeError::Transport(DaemonError::Api("boom".into())).is_structural());
        assert!(!DecodeError::OperationFailed("denied".into()).is_structural());
    }

    #[test]
    fn test_output_through_resolve() {
        let err = ImageError::Resolve {
            image: "app".into(),
            source: Box::new(ImageError::Pull {
                image: "app".into(),
                source: DecodeError::OperationFailed("manifest unknown".into()),
                output: "ERROR: manifest unknown\n".into(),
            }),
        };
        assert_eq!(err.output(), Some("ERROR: manifest unknown\n"));
        assert!(ImageError::EmptyName.output().is_none());
    }

    #[test]
    fn test_build_error_message_includes_output() {
        let err = ImageError::Build {
            image: "app".into(),
            source: DecodeError::OperationFailed("exit code 1".into()),
            output: "Step 1/2 : FROM alpine\n".into(),
        };
        let message = err.to_string();
        assert!(message.starts_with("Unable to build image app"));
        assert!(message.ends_with("Step 1/2 : FROM alpine\n"));
    }
}
