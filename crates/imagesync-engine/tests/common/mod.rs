//! テスト用のインメモリデーモン

#![allow(dead_code)]

use futures_util::{StreamExt, stream};
use imagesync_config::RegistryCredential;
use imagesync_core::ImageReference;
use imagesync_engine::{
    BuildOptions, DaemonError, ImageDaemon, ImageRecord, ProgressMessage, ProgressStream,
    RemovedItem, StreamError,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// デーモンへの呼び出し記録
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Pull {
        repository: String,
        tag: String,
        username: Option<String>,
    },
    Push {
        repository: String,
        tag: String,
        username: Option<String>,
    },
    Build {
        options: BuildOptions,
        context: Vec<u8>,
    },
    Tag {
        source: String,
        repository: String,
        tag: String,
    },
    Remove {
        id: String,
    },
}

#[derive(Default)]
struct FakeState {
    images: Vec<ImageRecord>,
    /// pull 可能な `repository:tag`
    remote: HashSet<String>,
    fail_build: bool,
    fail_push: bool,
    calls: Vec<Call>,
    next_id: u64,
}

impl FakeState {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("sha256:{:064x}", self.next_id)
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.images
            .iter()
            .position(|image| {
                image.id == name
                    || image.repo_tags.iter().any(|t| t == name)
                    || image.repo_digests.iter().any(|d| d == name)
            })
    }

    /// 他のイメージから同じタグを外して付け替える
    fn add_tag(&mut self, pos: usize, tag: &str) {
        for image in &mut self.images {
            image.repo_tags.retain(|t| t != tag);
        }
        self.images[pos].repo_tags.push(tag.to_string());
    }
}

#[derive(Default)]
pub struct FakeDaemon {
    state: Mutex<FakeState>,
}

/// `repo` → `repo:latest`（ダイジェスト指定はそのまま）
pub fn normalize(name: &str) -> String {
    let reference = ImageReference::parse(name);
    if reference.is_digest() {
        return name.to_string();
    }
    format!("{}:{}", reference.name_without_tag(), reference.tag_or_latest())
}

fn ok_stream<'a>(messages: Vec<ProgressMessage>) -> ProgressStream<'a> {
    stream::iter(messages.into_iter().map(Ok)).boxed()
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// ローカルにイメージを追加し、IDを返す
    pub fn with_local_image(self, tags: &[&str]) -> Self {
        self.add_local_image(tags);
        self
    }

    pub fn add_local_image(&self, tags: &[&str]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.new_id();
        state.images.push(ImageRecord {
            id: id.clone(),
            repo_tags: tags.iter().map(|t| normalize(t)).collect(),
            repo_digests: Vec::new(),
        });
        id
    }

    /// レジストリに pull 可能なイメージを登録
    pub fn with_remote_image(self, name: &str) -> Self {
        self.state.lock().unwrap().remote.insert(normalize(name));
        self
    }

    pub fn failing_build(self) -> Self {
        self.state.lock().unwrap().fail_build = true;
        self
    }

    pub fn failing_push(self) -> Self {
        self.state.lock().unwrap().fail_push = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn images(&self) -> Vec<ImageRecord> {
        self.state.lock().unwrap().images.clone()
    }

    pub fn id_of(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .find(&normalize(name))
            .map(|pos| state.images[pos].id.clone())
    }

    pub fn build_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Build { .. }))
    }

    pub fn pull_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Pull { .. }))
    }

    pub fn push_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Push { .. }))
    }

    pub fn remove_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Remove { .. }))
    }

    fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|&c| f(c)).count()
    }
}

impl ImageDaemon for FakeDaemon {
    async fn list_images(&self) -> Result<Vec<ImageRecord>, DaemonError> {
        Ok(self.state.lock().unwrap().images.clone())
    }

    fn pull_image<'a>(
        &'a self,
        repository: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> ProgressStream<'a> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Pull {
            repository: repository.to_string(),
            tag: tag.to_string(),
            username: credential.username.clone(),
        });

        let key = if tag.is_empty() {
            repository.to_string()
        } else {
            format!("{}:{}", repository, tag)
        };
        let pulling = ProgressMessage::status(format!("Pulling from {}", repository));

        if !state.remote.contains(&key) {
            return stream::iter(vec![
                Ok(pulling),
                Err(StreamError::Transport(DaemonError::NotFound(format!(
                    "manifest for {} not found",
                    key
                )))),
            ])
            .boxed();
        }

        let pos = match state.find(&key) {
            Some(pos) => pos,
            None => {
                let id = state.new_id();
                state.images.push(ImageRecord {
                    id,
                    repo_tags: Vec::new(),
                    repo_digests: Vec::new(),
                });
                state.images.len() - 1
            }
        };
        if tag.is_empty() {
            // ダイジェストで pull したイメージはタグを持たない
            if !state.images[pos].repo_digests.contains(&key) {
                state.images[pos].repo_digests.push(key.clone());
            }
        } else {
            state.add_tag(pos, &key);
        }

        ok_stream(vec![
            pulling,
            ProgressMessage::status("Pull complete").with_id("a1b2c3d4e5f6"),
            ProgressMessage::status(format!("Status: Downloaded newer image for {}", key)),
        ])
    }

    fn push_image<'a>(
        &'a self,
        repository: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> ProgressStream<'a> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Push {
            repository: repository.to_string(),
            tag: tag.to_string(),
            username: credential.username.clone(),
        });

        let key = format!("{}:{}", repository, tag);
        let refers = ProgressMessage::status(format!(
            "The push refers to repository [{}]",
            repository
        ));

        if state.find(&key).is_none() {
            return ok_stream(vec![ProgressMessage::error(format!(
                "An image does not exist locally with the tag: {}",
                repository
            ))]);
        }

        if state.fail_push {
            return ok_stream(vec![
                refers,
                ProgressMessage::status("Preparing").with_id("a1b2c3d4e5f6"),
                ProgressMessage::error("denied: requested access to the resource is denied"),
            ]);
        }

        state.remote.insert(key);
        ok_stream(vec![
            refers,
            ProgressMessage::status("Pushed").with_id("a1b2c3d4e5f6"),
            ProgressMessage::status(format!("{}: digest: sha256:feedface size: 528", tag)),
        ])
    }

    async fn build_image<'a>(
        &'a self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> Result<ProgressStream<'a>, DaemonError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Build {
            options: options.clone(),
            context,
        });

        if state.fail_build {
            return Ok(ok_stream(vec![
                ProgressMessage::stream("Step 1/2 : FROM alpine\n"),
                ProgressMessage::stream("Step 2/2 : RUN false\n"),
                ProgressMessage::error("The command '/bin/sh -c false' returned a non-zero code: 1"),
            ]));
        }

        let tag = normalize(options.primary_tag());
        let id = state.new_id();
        state.images.push(ImageRecord {
            id: id.clone(),
            repo_tags: Vec::new(),
            repo_digests: Vec::new(),
        });
        let pos = state.images.len() - 1;
        state.add_tag(pos, &tag);

        Ok(ok_stream(vec![
            ProgressMessage::stream("Step 1/1 : FROM alpine\n"),
            ProgressMessage::stream(format!("Successfully built {}\n", &id[7..19])),
            ProgressMessage::stream(format!("Successfully tagged {}\n", tag)),
        ]))
    }

    async fn tag_image(&self, source: &str, repository: &str, tag: &str) -> Result<(), DaemonError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Tag {
            source: source.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        });

        let pos = state
            .find(source)
            .or_else(|| state.find(&normalize(source)))
            .ok_or_else(|| DaemonError::NotFound(format!("No such image: {}", source)))?;
        state.add_tag(pos, &format!("{}:{}", repository, tag));
        Ok(())
    }

    async fn remove_image(&self, id: &str) -> Result<Vec<RemovedItem>, DaemonError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove { id: id.to_string() });

        let pos = state
            .find(id)
            .ok_or_else(|| DaemonError::NotFound(format!("No such image: {}", id)))?;
        let image = state.images.remove(pos);

        let mut removed: Vec<RemovedItem> = image
            .repo_tags
            .into_iter()
            .map(RemovedItem::Untagged)
            .collect();
        removed.push(RemovedItem::Deleted(image.id));
        Ok(removed)
    }
}

/// Dockerfile を含むビルドコンテキストを作成
pub fn write_context(dir: &Path, dockerfile: &str) {
    std::fs::write(dir.join("Dockerfile"), dockerfile).unwrap();
}

/// tar.gz のエントリ名一覧
pub fn archive_entries(archive: &[u8]) -> Vec<String> {
    let decoder = flate2::read::GzDecoder::new(archive);
    let mut tar = tar::Archive::new(decoder);
    tar.entries()
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string()
        })
        .collect()
}
