//! レジストリ認証情報
//!
//! Docker config.json と credential helper から認証情報を読み込み、
//! 正規化したレジストリホストをキーにしたテーブルとして保持します。

use crate::error::{ConfigError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Docker Hub の正規ホスト名
pub const DOCKER_HUB_REGISTRY: &str = "docker.io";

/// Docker Hub の別名（正規化で [`DOCKER_HUB_REGISTRY`] に寄せる）
const DOCKER_HUB_ALIASES: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

/// credential helper が identity token を返すときのユーザー名
const TOKEN_USERNAME: &str = "<token>";

/// 1レジストリ分の認証情報
///
/// すべて `None` の値は匿名アクセスを表す。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub username: Option<String>,
    pub password: Option<String>,
    pub identity_token: Option<String>,
    pub registry_token: Option<String>,
    pub server_address: Option<String>,
}

impl RegistryCredential {
    pub fn basic(username: &str, password: &str, server_address: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            server_address: Some(server_address.to_string()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.identity_token.is_none()
            && self.registry_token.is_none()
    }
}

/// 正規化済みレジストリホスト -> 認証情報
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    entries: HashMap<String, RegistryCredential>,
}

impl CredentialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 認証情報を登録（キーは正規化される。既存エントリは上書き）
    pub fn insert(&mut self, registry: &str, credential: RegistryCredential) {
        self.entries
            .insert(normalize_registry_address(registry), credential);
    }

    pub fn get(&self, registry: &str) -> Option<&RegistryCredential> {
        self.entries.get(&normalize_registry_address(registry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 登録済みレジストリ（ソート済み）
    pub fn registries(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// レジストリアドレスを正規化
///
/// # Examples
/// - `https://index.docker.io/v1/` -> `docker.io`
/// - `http://Registry.Example.com:5000/` -> `registry.example.com:5000`
/// - `ghcr.io` -> `ghcr.io`
pub fn normalize_registry_address(address: &str) -> String {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if host.is_empty() || DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        DOCKER_HUB_REGISTRY.to_string()
    } else {
        host
    }
}

/// Docker config.json の構造
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    /// 認証情報 (レジストリ -> AuthEntry)
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
    /// レジストリごとの credential helper
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

/// 認証エントリ
#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
    identitytoken: Option<String>,
    registrytoken: Option<String>,
}

/// credential helper からのレスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// Docker config.json から認証テーブルを作成
///
/// ファイルが存在しない場合は空のテーブルを返す。
/// credential helper の失敗はそのレジストリをスキップするだけでエラーにしない。
pub fn load_docker_config(path: &Path) -> Result<CredentialTable> {
    let mut table = CredentialTable::new();

    if !path.exists() {
        tracing::debug!("Docker config.json not found at {:?}", path);
        return Ok(table);
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: DockerConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    for (address, entry) in &config.auths {
        if let Some(credential) = credential_from_entry(address, entry)? {
            table.insert(address, credential);
            continue;
        }
        if let Some(helper) = &config.creds_store
            && let Some(credential) = lookup_helper(helper, address)
        {
            table.insert(address, credential);
        }
    }

    for (registry, helper) in &config.cred_helpers {
        if let Some(credential) = lookup_helper(helper, registry) {
            table.insert(registry, credential);
        }
    }

    tracing::debug!(
        "Loaded credentials for {} registries from {:?}",
        table.len(),
        path
    );
    Ok(table)
}

fn credential_from_entry(address: &str, entry: &AuthEntry) -> Result<Option<RegistryCredential>> {
    let mut credential = match &entry.auth {
        Some(auth_b64) if !auth_b64.is_empty() => match decode_auth(auth_b64, address)? {
            Some(credential) => credential,
            None => return Ok(None),
        },
        _ => RegistryCredential {
            username: entry.username.clone(),
            password: entry.password.clone(),
            server_address: Some(address.to_string()),
            ..Default::default()
        },
    };
    credential.identity_token = entry.identitytoken.clone();
    credential.registry_token = entry.registrytoken.clone();

    if credential.is_empty() {
        Ok(None)
    } else {
        Ok(Some(credential))
    }
}

/// Base64エンコードされた認証情報をデコード
fn decode_auth(auth_b64: &str, registry: &str) -> Result<Option<RegistryCredential>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .map_err(|e| ConfigError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let auth_str = String::from_utf8(decoded).map_err(|e| ConfigError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(auth_str
        .split_once(':')
        .map(|(username, password)| RegistryCredential::basic(username, password, registry)))
}

fn lookup_helper(helper: &str, registry: &str) -> Option<RegistryCredential> {
    match get_from_helper(helper, registry) {
        Ok(credential) => credential,
        Err(e) => {
            tracing::warn!("Credential helper '{}' failed for {}: {}", helper, registry, e);
            None
        }
    }
}

/// credential helper から認証情報を取得
fn get_from_helper(helper: &str, registry: &str) -> Result<Option<RegistryCredential>> {
    let helper_cmd = format!("docker-credential-{}", helper);

    let mut child = Command::new(&helper_cmd)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ConfigError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to run {}: {}", helper_cmd, e),
        })?;

    // レジストリ名を stdin に渡す
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(registry.as_bytes()).ok();
    }

    let output = child
        .wait_with_output()
        .map_err(|e| ConfigError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Credential helper failed: {}", e),
        })?;

    if !output.status.success() {
        // credential helper が認証情報を持っていない場合は None
        tracing::debug!(
            "Credential helper returned error for {}: {}",
            registry,
            String::from_utf8_lossy(&output.stderr)
        );
        return Ok(None);
    }

    let response: CredentialResponse =
        serde_json::from_slice(&output.stdout).map_err(|e| ConfigError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to parse credential helper response: {}", e),
        })?;

    if response.username == TOKEN_USERNAME {
        return Ok(Some(RegistryCredential {
            identity_token: Some(response.secret),
            server_address: Some(registry.to_string()),
            ..Default::default()
        }));
    }

    Ok(Some(RegistryCredential::basic(
        &response.username,
        &response.secret,
        registry,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn test_normalize_docker_hub_aliases() {
        for address in [
            "https://index.docker.io/v1/",
            "index.docker.io",
            "https://registry.hub.docker.com",
            "registry-1.docker.io",
            "docker.io",
            "",
        ] {
            assert_eq!(normalize_registry_address(address), "docker.io", "{address}");
        }
    }

    #[test]
    fn test_normalize_private_registries() {
        assert_eq!(normalize_registry_address("ghcr.io"), "ghcr.io");
        assert_eq!(
            normalize_registry_address("http://Registry.Example.com:5000/"),
            "registry.example.com:5000"
        );
        assert_eq!(
            normalize_registry_address("https://localhost:5000/v2/"),
            "localhost:5000"
        );
    }

    #[test]
    fn test_table_lookup_uses_normalized_key() {
        let mut table = CredentialTable::new();
        table.insert(
            "https://ghcr.io",
            RegistryCredential::basic("user", "pass", "ghcr.io"),
        );

        assert!(table.get("ghcr.io").is_some());
        assert!(table.get("GHCR.IO").is_some());
        assert!(table.get("gcr.io").is_none());
        assert_eq!(table.registries(), vec!["ghcr.io"]);
    }

    #[test]
    fn test_empty_credential() {
        assert!(RegistryCredential::default().is_empty());
        assert!(!RegistryCredential::basic("u", "p", "r").is_empty());
    }

    #[test]
    fn test_load_docker_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = load_docker_config(&dir.path().join("config.json")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_docker_config_auths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let content = format!(
            r#"{{
  "auths": {{
    "https://index.docker.io/v1/": {{ "auth": "{}" }},
    "registry.example.com": {{ "username": "bob", "password": "secret" }},
    "ghcr.io": {{ "auth": "{}", "identitytoken": "tok" }}
  }}
}}"#,
            encode("alice:hunter2"),
            encode("gh:pat")
        );
        fs::write(&path, content).unwrap();

        let table = load_docker_config(&path).unwrap();
        assert_eq!(table.len(), 3);

        let hub = table.get("docker.io").unwrap();
        assert_eq!(hub.username.as_deref(), Some("alice"));
        assert_eq!(hub.password.as_deref(), Some("hunter2"));

        let private = table.get("registry.example.com").unwrap();
        assert_eq!(private.username.as_deref(), Some("bob"));

        let ghcr = table.get("ghcr.io").unwrap();
        assert_eq!(ghcr.identity_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_load_docker_config_skips_empty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "auths": { "quay.io": {} } }"#).unwrap();

        let table = load_docker_config(&path).unwrap();
        assert!(table.get("quay.io").is_none());
    }

    #[test]
    fn test_load_docker_config_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let result = load_docker_config(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_docker_config_invalid_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "auths": { "ghcr.io": { "auth": "%%%" } } }"#).unwrap();

        let result = load_docker_config(&path);
        assert!(matches!(result, Err(ConfigError::AuthFailed { .. })));
    }

    #[test]
    fn test_missing_helper_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "credHelpers": { "gcr.io": "imagesync-test-no-such-helper" } }"#,
        )
        .unwrap();

        let table = load_docker_config(&path).unwrap();
        assert!(table.is_empty());
    }
}
