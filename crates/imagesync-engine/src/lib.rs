//! imagesync image engine
//!
//! 宣言されたイメージ定義からローカル／リモートのイメージ状態をリコンサイルします。
//! ローカルイメージの検索、pull、ビルド、プッシュ、削除を組み合わせ、
//! 最終的なイメージIDを解決します。

pub mod auth;
pub mod builder;
pub mod context;
pub mod controller;
pub mod daemon;
pub mod docker;
pub mod error;
pub mod index;
pub mod puller;
pub mod pusher;
pub mod stream;

pub use auth::resolve_auth;
pub use builder::{ImageBuilder, sensitive_build_args};
pub use context::{ContextBuilder, read_dockerignore, trim_build_files_from_excludes};
pub use controller::{ImageController, Lookup};
pub use daemon::{
    BuildOptions, ImageDaemon, ImageRecord, ProgressMessage, ProgressStream, RemovedItem,
    StreamError,
};
pub use docker::DockerDaemon;
pub use error::{DaemonError, DecodeError, ImageError, Result};
pub use index::LocalImageIndex;
pub use puller::ImagePuller;
pub use pusher::ImagePusher;
pub use stream::decode_stream;
