//! レジストリ認証の解決
//!
//! イメージ参照のレジストリから、認証テーブルのエントリを引きます。

use imagesync_config::{CredentialTable, DOCKER_HUB_REGISTRY, RegistryCredential};
use imagesync_core::ImageReference;

/// イメージ参照に対応する認証情報を取得
///
/// レジストリ指定がなければ Docker Hub を引く。見つからない場合は匿名（空の認証情報）。
pub fn resolve_auth(reference: &ImageReference, table: &CredentialTable) -> RegistryCredential {
    let registry = if reference.has_registry() {
        reference.registry.as_str()
    } else {
        DOCKER_HUB_REGISTRY
    };

    match table.get(registry) {
        Some(credential) => {
            tracing::debug!("Using credentials for registry: {}", registry);
            credential.clone()
        }
        None => {
            tracing::debug!("No credentials for registry: {}", registry);
            RegistryCredential::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CredentialTable {
        let mut table = CredentialTable::new();
        table.insert(
            "https://index.docker.io/v1/",
            RegistryCredential::basic("hubuser", "hubpass", "https://index.docker.io/v1/"),
        );
        table.insert(
            "localhost:5000",
            RegistryCredential::basic("local", "secret", "localhost:5000"),
        );
        table
    }

    #[test]
    fn test_registry_lookup() {
        let reference = ImageReference::parse("localhost:5000/app:dev");
        let credential = resolve_auth(&reference, &table());
        assert_eq!(credential.username.as_deref(), Some("local"));
    }

    #[test]
    fn test_no_registry_uses_docker_hub() {
        let reference = ImageReference::parse("myuser/app");
        let credential = resolve_auth(&reference, &table());
        assert_eq!(credential.username.as_deref(), Some("hubuser"));
    }

    #[test]
    fn test_unknown_registry_is_anonymous() {
        let reference = ImageReference::parse("ghcr.io/org/app:v1");
        let credential = resolve_auth(&reference, &table());
        assert!(credential.is_empty());
    }

    #[test]
    fn test_empty_table_is_anonymous() {
        let reference = ImageReference::parse("nginx");
        assert!(resolve_auth(&reference, &CredentialTable::new()).is_empty());
    }
}
