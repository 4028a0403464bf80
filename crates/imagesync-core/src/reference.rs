//! イメージ参照のパース
//!
//! 自由形式のイメージ名をレジストリ・リポジトリ・タグに分解します。
//! パースは失敗しません。判定できない部分はレジストリなし・タグなしとして扱います。

use serde::Serialize;
use std::fmt;

/// タグ省略時にデーモンが補うタグ
pub const DEFAULT_TAG: &str = "latest";

/// パース済みのイメージ参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    /// 入力文字列
    pub raw: String,
    /// レジストリホスト（`host[:port]`）。指定がなければ空
    pub registry: String,
    /// リポジトリ名（レジストリとタグを含まない）
    pub repository: String,
    /// タグ。指定がなければ空
    pub tag: String,
    /// レジストリ・リポジトリ・タグを再結合した名前
    pub fully_qualified_name: String,
}

impl ImageReference {
    /// イメージ名をパース
    ///
    /// # Examples
    /// - `ubuntu:22.04` -> registry なし, `ubuntu`, `22.04`
    /// - `myuser/app` -> registry なし, `myuser/app`, タグなし
    /// - `localhost:5000/app:dev` -> `localhost:5000`, `app`, `dev`
    /// - `docker.io/library/nginx` -> `docker.io`, `library/nginx`, タグなし
    pub fn parse(name: &str) -> Self {
        let registry = detect_registry(name);

        // タグ区切りの `:` はレジストリ部分より後ろだけで探す（ポート番号の `:` を除外）
        let rest = if registry.is_empty() {
            name
        } else {
            &name[registry.len() + 1..]
        };

        let (repository, tag) = match rest.find(':') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };

        Self {
            raw: name.to_string(),
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
            fully_qualified_name: compose(registry, repository, tag),
        }
    }

    /// タグを除いたイメージ名（レジストリ込み）
    pub fn name_without_tag(&self) -> String {
        if self.registry.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.registry, self.repository)
        }
    }

    /// タグ。空の場合は `latest`
    pub fn tag_or_latest(&self) -> &str {
        if self.tag.is_empty() {
            DEFAULT_TAG
        } else {
            &self.tag
        }
    }

    pub fn has_registry(&self) -> bool {
        !self.registry.is_empty()
    }

    /// `repo@sha256:...` のようにダイジェストで固定された参照かどうか
    pub fn is_digest(&self) -> bool {
        self.raw.contains('@')
    }
}

impl From<&str> for ImageReference {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified_name)
    }
}

/// 最初の `/` より前がレジストリかどうかを判定
///
/// `/` が2つ以上ある場合、または先頭要素が `.` か `:` を含むか `localhost` の場合にレジストリとみなす。
fn detect_registry(name: &str) -> &str {
    let Some(first_slash) = name.find('/') else {
        return "";
    };
    let prefix = &name[..first_slash];

    let looks_like_host = prefix.contains(|c| c == '.' || c == ':') || prefix == "localhost";
    if name.matches('/').count() > 1 || looks_like_host {
        prefix
    } else {
        ""
    }
}

fn compose(registry: &str, repository: &str, tag: &str) -> String {
    let mut fq = String::with_capacity(registry.len() + repository.len() + tag.len() + 2);
    if !registry.is_empty() {
        fq.push_str(registry);
        fq.push('/');
    }
    fq.push_str(repository);
    if !tag.is_empty() {
        fq.push(':');
        fq.push_str(tag);
    }
    fq
}
