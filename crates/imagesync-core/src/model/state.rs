//! リコンサイル結果

use serde::{Deserialize, Serialize};

/// イメージをどの遷移で用意したか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acquisition {
    /// ローカルに既に存在した
    Local,
    /// レジストリからpullした
    Pulled,
    /// ビルドした
    Built,
}

/// 1サイクル分の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageState {
    /// リソースID（`イメージID + 名前`）
    pub id: String,
    pub name: String,
    /// デーモンが割り当てたイメージID
    pub latest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_via: Option<Acquisition>,
}

impl ImageState {
    /// ローカルで見つかったイメージから状態を作成
    pub fn resolved(image_id: &str, name: &str) -> Self {
        Self {
            id: composite_id(image_id, name),
            name: name.to_string(),
            latest: image_id.to_string(),
            build_output: None,
            pull_output: None,
            push_output: None,
            acquired_via: None,
        }
    }
}

/// リソースIDを組み立てる
pub fn composite_id(image_id: &str, name: &str) -> String {
    format!("{}{}", image_id, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_state_id() {
        let state = ImageState::resolved("sha256:abc", "nginx:latest");
        assert_eq!(state.id, "sha256:abcnginx:latest");
        assert_eq!(state.latest, "sha256:abc");
        assert!(state.build_output.is_none());
    }

    #[test]
    fn test_acquisition_serialization() {
        let json = serde_yaml::to_string(&Acquisition::Pulled).unwrap();
        assert_eq!(json.trim(), "pulled");
    }
}
