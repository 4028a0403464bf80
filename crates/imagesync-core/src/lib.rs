//! imagesync core
//!
//! イメージリソースのデータモデル、イメージ参照のパース、
//! リソース定義ファイルのロードを提供します。

pub mod error;
pub mod loader;
pub mod model;
pub mod reference;

pub use error::{CoreError, Result};
pub use loader::{load_resource, parse_resource_str};
pub use model::*;
pub use reference::{DEFAULT_TAG, ImageReference};
