//! モデル定義
//!
//! イメージリソースの宣言的な入力と、リコンサイル結果の状態を定義します。

mod resource;
mod state;

// Re-exports
pub use resource::*;
pub use state::*;
