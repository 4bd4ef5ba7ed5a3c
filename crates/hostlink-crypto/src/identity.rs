use rand::rngs::OsRng;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

use crate::error::CryptoError;

const KEY_BITS: usize = 2048;
const VALIDITY_YEARS: i64 = 20;
const COMMON_NAME: &str = "GameStream Client";

/// This client's long-lived identity: an RSA-2048 keypair and a self-signed
/// X.509 certificate presented to every host during mTLS and pairing.
///
/// Generated once on first start; every subsequent start loads and validates
/// the existing pair from disk. A failed load is fatal — see
/// [`CryptoError`] and the caller's handling in `hostlink-core`'s startup
/// path.
pub struct Identity {
    private_key_pem: Zeroizing<String>,
    cert_pem: String,
    unique_id: String,
}

impl Identity {
    /// Generate a fresh RSA-2048 identity and self-sign its certificate.
    pub fn generate() -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let private_key_pem = private_key
            .to_pkcs8_pem(Default::default())
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let pkcs8_der = private_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let pkcs8_key_der = rustls_pki_types::PrivatePkcs8KeyDer::from(pkcs8_der.as_bytes());
        let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(&pkcs8_key_der, &rcgen::PKCS_RSA_SHA256)
            .map_err(|e| CryptoError::CertGeneration(e.to_string()))?;

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| CryptoError::CertGeneration(e.to_string()))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, COMMON_NAME);
        params.distinguished_name = dn;
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + Duration::days(365 * VALIDITY_YEARS);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CryptoError::CertGeneration(e.to_string()))?;

        let cert_pem = cert.pem();
        let unique_id = unique_id_from_cert_der(cert.der());

        Ok(Self {
            private_key_pem: Zeroizing::new(private_key_pem.to_string()),
            cert_pem,
            unique_id,
        })
    }

    /// Load an existing identity from PEM-encoded key and certificate
    /// material (as read back from disk, newline-token-decoded already).
    pub fn from_pem(private_key_pem: &str, cert_pem: &str) -> Result<Self, CryptoError> {
        let _private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
            .map_err(|e| CryptoError::CertParse(e.to_string()))?;
        let _parsed = pem
            .parse_x509()
            .map_err(|e| CryptoError::CertParse(e.to_string()))?;
        let unique_id = unique_id_from_cert_der(&pem.contents);

        Ok(Self {
            private_key_pem: Zeroizing::new(private_key_pem.to_string()),
            cert_pem: cert_pem.to_string(),
            unique_id,
        })
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// A cached unique-id string for this client, stable across restarts as
    /// long as the identity isn't regenerated. Used as the `uniqueid` query
    /// param on every request to a host.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("unique_id", &self.unique_id)
            .finish_non_exhaustive()
    }
}

/// Derive the stable client unique-id from the first 8 bytes of the
/// certificate's SHA-256 digest, hex-encoded.
fn unique_id_from_cert_der(der: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(der);
    hex::encode_upper(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_parseable_cert() {
        let identity = Identity::generate().expect("generate");
        assert!(identity.cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(identity.private_key_pem().contains("PRIVATE KEY"));
        assert_eq!(identity.unique_id().len(), 16);
    }

    #[test]
    fn roundtrip_through_pem() {
        let identity = Identity::generate().expect("generate");
        let reloaded =
            Identity::from_pem(identity.private_key_pem(), identity.cert_pem()).expect("reload");
        assert_eq!(identity.unique_id(), reloaded.unique_id());
        assert_eq!(identity.cert_pem(), reloaded.cert_pem());
    }

    #[test]
    fn unique_id_is_stable_across_reload() {
        let identity = Identity::generate().expect("generate");
        let first = identity.unique_id().to_string();
        let reloaded =
            Identity::from_pem(identity.private_key_pem(), identity.cert_pem()).expect("reload");
        assert_eq!(first, reloaded.unique_id());
    }
}
