//! Cryptographic primitives for the five-round pairing handshake (see
//! `hostlink-core::pairing` for the round-by-round orchestration).
//!
//! Kept separate from [`crate::identity`] because these are stateless
//! functions operating on salts/challenges/secrets generated fresh per
//! pairing attempt, not on the client's long-lived identity.

use aes::Aes128;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use rand::RngCore;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

type EcbEnc = ecb::Encryptor<Aes128>;
type EcbDec = ecb::Decryptor<Aes128>;

/// The hash function used throughout a pairing attempt is chosen once, up
/// front, from the host's reported GFE major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha1,
    Sha256,
}

impl HashAlgo {
    /// SHA-256 for GFE major version >= 7, SHA-1 otherwise.
    pub fn for_server_major_version(major: u32) -> Self {
        if major >= 7 {
            HashAlgo::Sha256
        } else {
            HashAlgo::Sha1
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 => 32,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgo::Sha1 => {
                use sha1::{Digest, Sha1};
                Sha1::digest(data).to_vec()
            }
            HashAlgo::Sha256 => {
                use sha2::Digest;
                Sha256::digest(data).to_vec()
            }
        }
    }
}

/// Zero-pad (or truncate, which should never happen in practice) `data` up
/// to `len` bytes.
pub fn zero_pad(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    out.resize(len, 0);
    out
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// AES-128-ECB encrypt. The pairing handshake's own rounds only ever feed
/// block-aligned input (16/32/48-byte challenges and hashes), so no padding
/// is applied — a non-multiple-of-16 input is a caller bug.
pub fn aes128_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::EncryptionError(
            "input is not AES block-aligned".to_string(),
        ));
    }
    let mut buf = data.to_vec();
    let encryptor = EcbEnc::new(key.into());
    let n = buf.len();
    encryptor
        .encrypt_padded_mut::<ecb::cipher::block_padding::NoPadding>(&mut buf, n)
        .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;
    Ok(buf)
}

pub fn aes128_ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::DecryptionError(
            "input is not AES block-aligned".to_string(),
        ));
    }
    let mut buf = data.to_vec();
    let decryptor = EcbDec::new(key.into());
    let out_len = decryptor
        .decrypt_padded_mut::<ecb::cipher::block_padding::NoPadding>(&mut buf)
        .map_err(|e| CryptoError::DecryptionError(e.to_string()))?
        .len();
    buf.truncate(out_len);
    Ok(buf)
}

/// PKCS7-pad `data` to the next 16-byte boundary. Only used by the
/// federated-identity PIN cipher (round 1's `pincode` field); the core
/// handshake rounds never pad.
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let block = 16usize;
    let pad_len = block - (data.len() % block);
    let mut out = data.to_vec();
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

pub fn rsa_sign_sha256(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature: Signature = signing_key.sign_with_rng(&mut rand::rngs::OsRng, data);
    Ok(signature.to_bytes().to_vec())
}

pub fn rsa_verify_sha256(
    public_key: &RsaPublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    let sig = Signature::try_from(signature)
        .map_err(|e| CryptoError::VerificationError(e.to_string()))?;
    verifying_key
        .verify(data, &sig)
        .map_err(|e| CryptoError::VerificationError(e.to_string()))
}

/// Extract the RSA public key from a PEM-encoded X.509 certificate (the
/// server's pinned cert from pairing round 1).
pub fn rsa_public_key_from_cert_pem(cert_pem: &str) -> Result<RsaPublicKey, CryptoError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| CryptoError::CertParse(e.to_string()))?;
    let parsed = pem
        .parse_x509()
        .map_err(|e| CryptoError::CertParse(e.to_string()))?;
    let spki_der = parsed.tbs_certificate.subject_pki.raw;
    RsaPublicKey::try_from(rsa::pkcs8::SubjectPublicKeyInfoRef::try_from(spki_der).map_err(
        |e| CryptoError::CertParse(e.to_string()),
    )?)
    .map_err(|e| CryptoError::CertParse(e.to_string()))
}

/// Extract the raw signature bytes of a self-signed certificate (the
/// `clientCert.signatureBytes` / `serverCert.signatureBytes` fed into
/// pairing rounds 3 and 4 — not a fresh signature, the cert's own).
pub fn cert_signature_bytes(cert_pem: &str) -> Result<Vec<u8>, CryptoError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| CryptoError::CertParse(e.to_string()))?;
    let parsed = pem
        .parse_x509()
        .map_err(|e| CryptoError::CertParse(e.to_string()))?;
    Ok(parsed.signature_value.data.into_owned())
}

/// Load an RSA private key from PKCS8 PEM, for signing round 4's
/// `clientPairingSecret`.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    use rsa::pkcs8::DecodePrivateKey;
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Derive the federated-identity PIN cipher key: SHA-256 (or SHA-1,
/// depending on the negotiated [`HashAlgo`]) of the MD5 digest of the
/// external identity service's secret package.
pub fn federated_pin_key(secret: &[u8], algo: HashAlgo) -> [u8; 16] {
    use md5::{Digest as Md5Digest, Md5};
    let md5_digest = Md5::digest(secret);
    let outer = algo.digest(&md5_digest);
    let mut key = [0u8; 16];
    key.copy_from_slice(&outer[..16]);
    key
}

/// Encrypt a PIN for the federated-identity pairing variant:
/// `AES-128-ECB(PKCS7-pad(pin), federated_pin_key(secret))`.
pub fn encrypt_federated_pin(
    pin: &str,
    secret: &[u8],
    algo: HashAlgo,
) -> Result<Vec<u8>, CryptoError> {
    let key = federated_pin_key(secret, algo);
    let padded = pkcs7_pad(pin.as_bytes());
    aes128_ecb_encrypt(&key, &padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_ecb_roundtrip() {
        let key = random_bytes::<16>();
        let data = random_bytes::<32>();
        let ct = aes128_ecb_encrypt(&key, &data).unwrap();
        let pt = aes128_ecb_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, data);
    }

    #[test]
    fn non_aligned_input_rejected() {
        let key = random_bytes::<16>();
        assert!(aes128_ecb_encrypt(&key, &[0u8; 15]).is_err());
    }

    #[test]
    fn hash_algo_selection_by_major_version() {
        assert_eq!(HashAlgo::for_server_major_version(6), HashAlgo::Sha1);
        assert_eq!(HashAlgo::for_server_major_version(7), HashAlgo::Sha256);
        assert_eq!(HashAlgo::for_server_major_version(8), HashAlgo::Sha256);
    }

    #[test]
    fn hash_output_lengths() {
        assert_eq!(HashAlgo::Sha1.digest(b"x").len(), 20);
        assert_eq!(HashAlgo::Sha256.digest(b"x").len(), 32);
    }

    #[test]
    fn pkcs7_padding_always_adds_at_least_one_byte() {
        let padded = pkcs7_pad(&[0u8; 16]);
        assert_eq!(padded.len(), 32);
        assert_eq!(*padded.last().unwrap(), 16);
    }

    #[test]
    fn cert_signature_bytes_are_nonempty_for_a_real_cert() {
        let identity = crate::identity::Identity::generate().unwrap();
        let sig = cert_signature_bytes(identity.cert_pem()).unwrap();
        assert!(!sig.is_empty());
    }

    #[test]
    fn private_key_from_pem_roundtrips() {
        let identity = crate::identity::Identity::generate().unwrap();
        assert!(private_key_from_pem(identity.private_key_pem()).is_ok());
    }

    #[test]
    fn rsa_sign_verify_roundtrip() {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let data = b"challenge-response-bytes";
        let sig = rsa_sign_sha256(&private_key, data).unwrap();
        assert!(rsa_verify_sha256(&public_key, data, &sig).is_ok());
        assert!(rsa_verify_sha256(&public_key, b"tampered", &sig).is_err());
    }
}
