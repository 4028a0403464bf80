//! ビルドコンテキストの作成
//!
//! `.dockerignore` を読み込み、除外パターンを適用した tar.gz アーカイブを作成します。

use crate::error::{ImageError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io::Write;
use std::path::{Component, Path};
use tar::Builder;

const DOCKERIGNORE: &str = ".dockerignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// コンテキストディレクトリの `.dockerignore` を読み込む
///
/// ファイルがなければ空。空行と `#` コメントは無視し、先頭の `/` は取り除く。
pub fn read_dockerignore(context_dir: &Path) -> Result<Vec<String>> {
    let path = context_dir.join(DOCKERIGNORE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(ImageError::Context { path, source }),
    };

    let mut excludes = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (negated, pattern) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };

        let pattern = clean_pattern(pattern);
        if negated {
            excludes.push(format!("!{}", pattern));
        } else {
            excludes.push(pattern);
        }
    }

    tracing::debug!("Loaded {} ignore patterns from {}", excludes.len(), path.display());
    Ok(excludes)
}

/// Dockerfile と `.dockerignore` がコンテキストから除外されないようにする
///
/// どちらかが除外パターンに一致する場合は `!` の例外パターンを末尾に追加する。
/// Dockerfile を標準入力から渡す場合、Dockerfile の例外は追加しない。
pub fn trim_build_files_from_excludes(
    mut excludes: Vec<String>,
    dockerfile: &str,
    dockerfile_from_stdin: bool,
) -> Result<Vec<String>> {
    let matcher = ExcludeMatcher::new(&excludes)?;
    if matcher.is_excluded(DOCKERIGNORE) {
        excludes.push(format!("!{}", DOCKERIGNORE));
    }

    let dockerfile = clean_pattern(&dockerfile.replace('\\', "/"));
    if !dockerfile_from_stdin && matcher.is_excluded(&dockerfile) {
        excludes.push(format!("!{}", dockerfile));
    }

    Ok(excludes)
}

/// パスを `/` 区切りの相対パスに正規化
fn clean_pattern(pattern: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in pattern.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

struct ExcludeRule {
    pattern: Pattern,
    depth: usize,
    exception: bool,
}

/// 除外パターンの評価器
///
/// 最後に一致したパターンが結果を決める。`!` 付きのパターンは再び含める。
/// 親ディレクトリが一致した場合も除外とみなす。
struct ExcludeMatcher {
    rules: Vec<ExcludeRule>,
}

impl ExcludeMatcher {
    fn new(excludes: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(excludes.len());
        for raw in excludes {
            let (exception, body) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.as_str()),
            };
            let body = clean_pattern(body);
            let pattern = Pattern::new(&body).map_err(|e| ImageError::IgnorePattern {
                pattern: raw.clone(),
                message: e.msg.to_string(),
            })?;
            rules.push(ExcludeRule {
                pattern,
                depth: body.split('/').count(),
                exception,
            });
        }
        Ok(Self { rules })
    }

    fn has_exceptions(&self) -> bool {
        self.rules.iter().any(|rule| rule.exception)
    }

    /// `/` 区切りの相対パスが除外されるかどうか
    fn is_excluded(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').collect();
        let parents = &segments[..segments.len().saturating_sub(1)];

        let mut excluded = false;
        for rule in &self.rules {
            let mut matched = rule.pattern.matches_with(path, MATCH_OPTIONS);

            if !matched && rule.depth <= parents.len() {
                let parent = parents[..rule.depth].join("/");
                matched = rule.pattern.matches_with(&parent, MATCH_OPTIONS);
            }

            if matched {
                excluded = !rule.exception;
            }
        }
        excluded
    }
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    ///
    /// エントリは名前順。シンボリックリンクはリンクのまま格納する。
    pub fn create_context(context_dir: &Path, excludes: &[String]) -> Result<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", context_dir.display());

        let matcher = ExcludeMatcher::new(excludes)?;
        let io_err = |source| ImageError::Context {
            path: context_dir.to_path_buf(),
            source,
        };

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);

            Self::append_dir(&mut tar, context_dir, "", &matcher)?;

            let encoder = tar.into_inner().map_err(io_err)?;
            encoder.finish().map_err(io_err)?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        // コンテキストサイズの警告
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn append_dir<W: Write>(
        tar: &mut Builder<W>,
        dir: &Path,
        prefix: &str,
        matcher: &ExcludeMatcher,
    ) -> Result<()> {
        let context_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ImageError::Context { path, source }
        };

        let mut entries = fs::read_dir(dir)
            .map_err(context_err(dir))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(context_err(dir))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let file_type = entry.file_type().map_err(context_err(&path))?;
            let excluded = matcher.is_excluded(&relative);

            if file_type.is_dir() {
                if excluded && !matcher.has_exceptions() {
                    continue;
                }
                if !excluded {
                    tar.append_dir(&relative, &path)
                        .map_err(context_err(&path))?;
                }
                Self::append_dir(tar, &path, &relative, matcher)?;
            } else if !excluded {
                tar.append_path_with_name(&path, &relative)
                    .map_err(context_err(&path))?;
            }
        }

        Ok(())
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 .dockerignoreファイルで不要なファイルを除外することを推奨します。",
                size / 1024 / 1024
            );
        }
    }
}

/// コンテキストの外を指さない相対パスかどうか
pub(crate) fn is_within_context(relative: &Path) -> bool {
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
