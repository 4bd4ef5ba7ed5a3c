//! Persists the client's long-lived identity (§4.A). Generated once on
//! first run; every subsequent start loads and validates the existing
//! pair. A corrupt or unreadable identity is fatal (§7: "unreadable
//! newly-generated credentials; corrupt key/cert on reload").

use std::path::Path;

use hostlink_crypto::Identity;

use crate::error::CoreError;
use crate::paths::AppPaths;

pub fn load_or_generate(paths: &AppPaths) -> Result<Identity, CoreError> {
    let key_file = paths.identity_key_file();
    let cert_file = paths.identity_cert_file();

    if key_file.exists() && cert_file.exists() {
        match reload(&key_file, &cert_file) {
            Ok(identity) => {
                tracing::info!(unique_id = identity.unique_id(), "loaded existing client identity");
                return Ok(identity);
            }
            Err(e) => {
                tracing::error!(error = %e, "existing identity is corrupt, this is fatal");
                return Err(CoreError::Fatal(format!("corrupt client identity: {e}")));
            }
        }
    }

    tracing::info!("no client identity on disk, generating one");
    let identity = Identity::generate().map_err(|e| {
        tracing::error!(error = %e, "failed to generate client identity, this is fatal");
        CoreError::Fatal(format!("identity generation failed: {e}"))
    })?;

    if let Some(parent) = key_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&key_file, identity.private_key_pem())?;
    std::fs::write(&cert_file, identity.cert_pem())?;

    tracing::info!(unique_id = identity.unique_id(), "generated and persisted new client identity");
    Ok(identity)
}

fn reload(key_file: &Path, cert_file: &Path) -> Result<Identity, CoreError> {
    let key_pem = std::fs::read_to_string(key_file)?;
    let cert_pem = std::fs::read_to_string(cert_file)?;
    Ok(Identity::from_pem(&key_pem, &cert_pem)?)
}

/// Combined PEM (cert followed by key) in the shape `reqwest::Identity`
/// expects for client-cert mTLS.
pub fn combined_pem(identity: &Identity) -> String {
    format!("{}\n{}", identity.cert_pem(), identity.private_key_pem())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_on_first_run_then_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path().to_path_buf());

        let first = load_or_generate(&paths).unwrap();
        let second = load_or_generate(&paths).unwrap();
        assert_eq!(first.unique_id(), second.unique_id());
    }

    #[test]
    fn combined_pem_contains_both_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path().to_path_buf());
        let identity = load_or_generate(&paths).unwrap();
        let combined = combined_pem(&identity);
        assert!(combined.contains("BEGIN CERTIFICATE"));
        assert!(combined.contains("PRIVATE KEY"));
    }

    #[test]
    fn corrupt_identity_on_disk_is_fatal_not_silently_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(paths.identity_key_file(), "not a key").unwrap();
        std::fs::write(paths.identity_cert_file(), "not a cert").unwrap();

        let result = load_or_generate(&paths);
        assert!(matches!(result, Err(CoreError::Fatal(_))));
    }
}
