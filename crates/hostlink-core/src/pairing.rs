//! Pairing Engine orchestration (§4.D): the five synchronous rounds,
//! layered over [`hostlink_crypto::pairing`]'s stateless primitives and
//! [`hostlink_transport::HttpTransport`].

use hostlink_crypto::pairing::{
    aes128_ecb_decrypt, aes128_ecb_encrypt, cert_signature_bytes, encrypt_federated_pin,
    private_key_from_pem, random_bytes, rsa_public_key_from_cert_pem, rsa_sign_sha256,
    rsa_verify_sha256, zero_pad, HashAlgo,
};
use hostlink_crypto::Identity;
use hostlink_protocol::HostRecord;
use hostlink_transport::{HttpTransport, StopSignal, TransportError};

use crate::poller::TransportConfig;

const DEFAULT_HTTP_PORT: u16 = 47989;
const DEFAULT_HTTPS_PORT: u16 = 47984;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Paired { server_cert_pem: String },
    PinWrong,
    Failed(String),
    AlreadyInProgress,
    RazerWrong,
}

/// Federated-identity pairing inputs (§4.D "Federated-identity
/// variant"). Obtained by the caller from an external identity service.
pub struct FederatedCredentials {
    pub secret: Vec<u8>,
    pub pincode_uuid: String,
}

pub async fn pair(
    record: &HostRecord,
    pin: &str,
    identity: &Identity,
    transport_config: &TransportConfig,
    stop: StopSignal,
    federated: Option<FederatedCredentials>,
) -> PairOutcome {
    match run(record, pin, identity, transport_config, stop, federated).await {
        Ok(outcome) => outcome,
        Err(e) => PairOutcome::Failed(e.to_string()),
    }
}

async fn run(
    record: &HostRecord,
    pin: &str,
    identity: &Identity,
    transport_config: &TransportConfig,
    stop: StopSignal,
    federated: Option<FederatedCredentials>,
) -> Result<PairOutcome, TransportError> {
    let Some(address) = record.unique_addresses().into_iter().next() else {
        return Ok(PairOutcome::Failed("no known address for host".to_string()));
    };

    let mut transport = HttpTransport::new(
        transport_config.identity_pem.as_str(),
        address.host.clone(),
        if address.port == 0 { DEFAULT_HTTP_PORT } else { address.port },
        DEFAULT_HTTPS_PORT,
        transport_config.client_unique_id.as_str(),
    )?;
    // Route cancellation through this attempt's own transport instance
    // rather than the process-wide flag (§4.H cancellation).
    transport = transport_with_stop(transport, stop);

    let hash_algo = HashAlgo::for_server_major_version(record.server_app_version.major);
    let hash_len = hash_algo.output_len();

    let salt = random_bytes::<16>();
    let client_challenge = random_bytes::<16>();
    let client_secret = random_bytes::<16>();

    let mut salt_and_pin = salt.to_vec();
    salt_and_pin.extend_from_slice(pin.as_bytes());
    let aes_key_bytes = hash_algo.digest(&salt_and_pin);
    let mut aes_key = [0u8; 16];
    aes_key.copy_from_slice(&aes_key_bytes[..16]);

    // --- Round 1: getservercert ---
    let client_cert_hex = hex::encode(identity.cert_pem());
    let mut query: Vec<(&str, &str)> = vec![("devicename", "roth"), ("phrase", "getservercert")];
    let salt_hex = hex::encode(salt);
    query.push(("salt", &salt_hex));
    query.push(("clientcert", &client_cert_hex));

    let pincode_uuid;
    let encrypted_pin_hex;
    if let Some(creds) = &federated {
        pincode_uuid = creds.pincode_uuid.clone();
        let cipher = encrypt_federated_pin(pin, &creds.secret, hash_algo)?;
        encrypted_pin_hex = hex::encode(cipher);
        query.push(("pincode", &pincode_uuid));
        query.push(("otsecret", &encrypted_pin_hex));
    }

    let round1 = match transport.get_http("/pair", &query, None).await {
        Ok(resp) => resp,
        Err(e) => return Ok(round1_failure_outcome(e, federated.is_some())),
    };

    if round1.field_or_default("paired") != "1" {
        return Ok(PairOutcome::Failed("paired!=1 in round 1".to_string()));
    }
    let plaincert_hex = round1.field_or_default("plaincert");
    if plaincert_hex.is_empty() {
        let _ = transport.get_http("/unpair", &[], Some(std::time::Duration::from_secs(5))).await;
        return Ok(PairOutcome::AlreadyInProgress);
    }
    let server_cert_pem = String::from_utf8(
        hex::decode(&plaincert_hex).map_err(|_| protocol_malformed("plaincert not valid hex"))?,
    )
    .map_err(|_| protocol_malformed("plaincert not valid utf-8"))?;

    // --- Round 2: clientchallenge ---
    let encrypted_challenge = aes128_ecb_encrypt(&aes_key, &client_challenge)?;
    let challenge_hex = hex::encode(encrypted_challenge);
    let round2 = transport
        .get_http("/pair", &[("devicename", "roth"), ("clientchallenge", &challenge_hex)], Some(std::time::Duration::from_secs(10)))
        .await;
    let round2 = match round2 {
        Ok(r) => r,
        Err(e) => {
            abort_with_unpair(&transport).await;
            return Ok(round1_failure_outcome(e, false));
        }
    };

    let response_hex = round2.field_or_default("challengeresponse");
    let response_bytes = hex::decode(&response_hex).unwrap_or_default();
    let decrypted = aes128_ecb_decrypt(&aes_key, &response_bytes)?;
    if decrypted.len() < hash_len + 16 {
        abort_with_unpair(&transport).await;
        return Ok(PairOutcome::Failed("round 2 response too short".to_string()));
    }
    let server_response_hash = decrypted[..hash_len].to_vec();
    let server_challenge = decrypted[hash_len..hash_len + 16].to_vec();

    // --- Round 3: serverchallengeresp ---
    let client_cert_signature = cert_signature_bytes(identity.cert_pem())?;
    let mut challenge_response_input = server_challenge.clone();
    challenge_response_input.extend_from_slice(&client_cert_signature);
    challenge_response_input.extend_from_slice(&client_secret);
    let challenge_response_hash = zero_pad(&hash_algo.digest(&challenge_response_input), 32);
    let encrypted_cr = aes128_ecb_encrypt(&aes_key, &challenge_response_hash)?;
    let cr_hex = hex::encode(encrypted_cr);

    let round3 = transport
        .get_http("/pair", &[("devicename", "roth"), ("serverchallengeresp", &cr_hex)], Some(std::time::Duration::from_secs(10)))
        .await;
    let round3 = match round3 {
        Ok(r) => r,
        Err(e) => {
            abort_with_unpair(&transport).await;
            return Ok(round1_failure_outcome(e, false));
        }
    };

    let pairing_secret_hex = round3.field_or_default("pairingsecret");
    let pairing_secret = hex::decode(&pairing_secret_hex).unwrap_or_default();
    if pairing_secret.len() < 16 {
        abort_with_unpair(&transport).await;
        return Ok(PairOutcome::Failed("round 3 pairingsecret too short".to_string()));
    }
    let server_secret = &pairing_secret[..16];
    let server_signature = &pairing_secret[16..];

    let server_public_key = rsa_public_key_from_cert_pem(&server_cert_pem)?;
    if rsa_verify_sha256(&server_public_key, server_secret, server_signature).is_err() {
        tracing::warn!("pairing aborted: server signature over serverSecret did not verify (possible MITM)");
        abort_with_unpair(&transport).await;
        return Ok(PairOutcome::Failed("server signature verification failed".to_string()));
    }

    let server_cert_signature = cert_signature_bytes(&server_cert_pem)?;
    let mut pin_check_input = client_challenge.to_vec();
    pin_check_input.extend_from_slice(&server_cert_signature);
    pin_check_input.extend_from_slice(server_secret);
    let expected_hash = hash_algo.digest(&pin_check_input);
    if expected_hash != server_response_hash {
        abort_with_unpair(&transport).await;
        return Ok(PairOutcome::PinWrong);
    }

    // --- Round 4: clientpairingsecret ---
    let private_key = private_key_from_pem(identity.private_key_pem())?;
    let client_secret_signature = rsa_sign_sha256(&private_key, &client_secret)?;
    let mut client_pairing_secret = client_secret.to_vec();
    client_pairing_secret.extend_from_slice(&client_secret_signature);
    let cps_hex = hex::encode(client_pairing_secret);

    let round4 = transport
        .get_http("/pair", &[("devicename", "roth"), ("clientpairingsecret", &cps_hex)], Some(std::time::Duration::from_secs(10)))
        .await;
    let round4 = match round4 {
        Ok(r) => r,
        Err(e) => {
            abort_with_unpair(&transport).await;
            return Ok(round1_failure_outcome(e, false));
        }
    };
    if round4.field_or_default("paired") != "1" {
        abort_with_unpair(&transport).await;
        return Ok(PairOutcome::Failed("paired!=1 in round 4".to_string()));
    }

    // --- Round 5: pairchallenge (HTTPS) ---
    let mut https_transport = HttpTransport::new(
        transport_config.identity_pem.as_str(),
        address.host.clone(),
        if address.port == 0 { DEFAULT_HTTP_PORT } else { address.port },
        DEFAULT_HTTPS_PORT,
        transport_config.client_unique_id.as_str(),
    )?;
    https_transport = transport_with_stop(https_transport, transport.stop_signal());

    let round5 = https_transport
        .get_https("/pair", &[("devicename", "roth"), ("phrase", "pairchallenge")], Some(std::time::Duration::from_secs(10)))
        .await;
    match round5 {
        Ok(_) => Ok(PairOutcome::Paired { server_cert_pem }),
        Err(e) => {
            abort_with_unpair(&transport).await;
            Ok(round1_failure_outcome(e, false))
        }
    }
}

fn transport_with_stop(transport: HttpTransport, stop: StopSignal) -> HttpTransport {
    // `HttpTransport` owns its stop flag privately; pairing cancellation
    // (§4.H) plumbs in by sharing the caller's flag as the instance's own
    // rather than signalling the process-wide one, so only this pair
    // attempt is interrupted.
    transport.with_stop_signal(stop)
}

async fn abort_with_unpair(transport: &HttpTransport) {
    let _ = transport.get_http("/unpair", &[], Some(std::time::Duration::from_secs(5))).await;
}

/// RazerWrong only ever surfaces from round 1's federated-pincode
/// rejection (§4.D "Federated-identity variant"); later rounds map every
/// transport failure to `Failed`.
fn round1_failure_outcome(e: TransportError, is_federated: bool) -> PairOutcome {
    if is_federated && e.is_unauthorized() {
        PairOutcome::RazerWrong
    } else {
        PairOutcome::Failed(e.to_string())
    }
}

fn protocol_malformed(msg: &str) -> TransportError {
    TransportError::Protocol(hostlink_protocol::ProtocolError::MalformedResponse(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_outcome_equality() {
        assert_eq!(PairOutcome::PinWrong, PairOutcome::PinWrong);
        assert_ne!(PairOutcome::PinWrong, PairOutcome::Failed("x".into()));
    }
}
