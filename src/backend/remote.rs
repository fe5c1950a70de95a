//! HTTP client for a proving service.
//!
//! `POST {base_url}/v1/circuits/{circuit_id}/prove` with the witness and the
//! expected instance; the service answers with proof bytes and the instance it
//! proved. The witness is sent to the service, so the service is expected to
//! run under the applicant's control (for example on localhost).

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{check_circuit, BackendProof, ProvingBackend};
use crate::inputs::CircuitInputs;
use crate::merkle::hash::{field_to_hex, hex_to_field};
use crate::merkle::tree::MerklePathData;
use crate::model::{CircuitId, ProofSystem, VerificationKeyRef};
use crate::progress::ProgressReporter;
use crate::prover::{ProverError, ProverResult};

#[derive(Debug, Serialize)]
struct ProveRequest {
    private_inputs: WirePrivateInputs,
    public_inputs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WirePrivateInputs {
    skill_scores: Vec<u64>,
    expected_salary: u64,
    region_path: MerklePathData,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct ProveResponse {
    proof: String,
    public_inputs: Vec<String>,
    verification_key: String,
}

/// Proving service client. The request deadline is enforced here as well as
/// by the generator.
#[derive(Clone, Debug)]
pub struct RemoteProver {
    client: reqwest::Client,
    base_url: String,
    deadline: Duration,
}

impl RemoteProver {
    pub fn new(base_url: &str, deadline: Duration) -> ProverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| {
                ProverError::ProvingBackendUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            deadline,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, circuit: &CircuitId) -> String {
        format!("{}/v1/circuits/{}/prove", self.base_url, circuit)
    }

    fn request_body(inputs: &CircuitInputs) -> ProverResult<ProveRequest> {
        // The service proves whatever the witness satisfies; the generator
        // only calls us for eligible inputs.
        let instance = inputs
            .public
            .instance(true)
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;
        Ok(ProveRequest {
            private_inputs: WirePrivateInputs {
                skill_scores: inputs.private.skill_scores.to_vec(),
                expected_salary: inputs.private.expected_salary,
                region_path: MerklePathData::from(&inputs.private.region_path),
                secret: field_to_hex(&inputs.private.secret),
            },
            public_inputs: instance.iter().map(field_to_hex).collect(),
        })
    }

    fn map_send_error(&self, endpoint: &str, e: reqwest::Error) -> ProverError {
        if e.is_timeout() {
            ProverError::VerificationTimeout(self.deadline)
        } else {
            ProverError::ProvingBackendUnavailable(format!("{endpoint}: {e}"))
        }
    }
}

impl ProvingBackend for RemoteProver {
    fn system(&self) -> ProofSystem {
        ProofSystem::Groth16Bn254
    }

    fn name(&self) -> &'static str {
        "remote"
    }

    async fn generate_proof(
        &self,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> ProverResult<BackendProof> {
        check_circuit(circuit)?;
        let endpoint = self.endpoint(circuit);
        let body = Self::request_body(inputs)?;
        progress.set(10);

        debug!(%endpoint, "requesting remote proof");
        let resp = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;

        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%endpoint, %status, "proving service error");
            return Err(ProverError::ProvingBackendUnavailable(format!(
                "{endpoint}: HTTP {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProverError::ProofGenerationFailed(format!(
                "{endpoint}: HTTP {status}: {body}"
            )));
        }
        progress.set(80);

        let parsed: ProveResponse = resp
            .json()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;

        let proof = hex::decode(&parsed.proof)
            .map_err(|e| ProverError::SerializationError(format!("proof: {e}")))?;
        let public_inputs = parsed
            .public_inputs
            .iter()
            .map(|s| hex_to_field(s))
            .collect::<Result<Vec<Fr>, _>>()
            .map_err(|e| ProverError::SerializationError(format!("public inputs: {e}")))?;
        progress.set(90);

        Ok(BackendProof {
            proof,
            public_inputs,
            verification_key: VerificationKeyRef(parsed.verification_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{profile, sample_job};
    use crate::inputs::PUBLIC_INSTANCE_LEN;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn inputs() -> CircuitInputs {
        CircuitInputs::assemble(&profile(80, 60, 120_000, "CA-ON"), &sample_job()).unwrap()
    }

    async fn generate(prover: &RemoteProver) -> ProverResult<BackendProof> {
        prover
            .generate_proof(
                &CircuitId::eligibility_v1(),
                &inputs(),
                &ProgressReporter::detached(),
            )
            .await
    }

    /// Accept one connection and answer it with `response`.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the whole JSON request before answering.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.ends_with(b"}") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn test_endpoint_is_versioned_by_circuit() {
        let prover = RemoteProver::new("http://localhost:6300/", Duration::from_secs(1)).unwrap();
        assert_eq!(prover.base_url(), "http://localhost:6300");
        assert_eq!(
            prover.endpoint(&CircuitId::eligibility_v1()),
            "http://localhost:6300/v1/circuits/ghosthire-eligibility-v1/prove"
        );
    }

    #[test]
    fn test_request_body_carries_full_instance() {
        let body = RemoteProver::request_body(&inputs()).unwrap();
        assert_eq!(body.public_inputs.len(), PUBLIC_INSTANCE_LEN);
        assert_eq!(body.private_inputs.skill_scores.len(), 8);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prover = RemoteProver::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = generate(&prover).await.unwrap_err();
        assert!(matches!(err, ProverError::ProvingBackendUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_silent_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let prover =
            RemoteProver::new(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        assert!(matches!(
            generate(&prover).await,
            Err(ProverError::VerificationTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let url = serve_once(http_response("503 Service Unavailable", "{}")).await;
        let prover = RemoteProver::new(&url, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            generate(&prover).await,
            Err(ProverError::ProvingBackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_response_is_decoded() {
        let instance = inputs().public.instance(true).unwrap();
        let body = serde_json::json!({
            "proof": hex::encode([1u8, 2, 3]),
            "public_inputs": instance.iter().map(field_to_hex).collect::<Vec<_>>(),
            "verification_key": "groth16-bn254:abcd",
        })
        .to_string();
        let url = serve_once(http_response("200 OK", &body)).await;

        let prover = RemoteProver::new(&url, Duration::from_secs(2)).unwrap();
        let out = generate(&prover).await.unwrap();
        assert_eq!(out.proof, vec![1, 2, 3]);
        assert_eq!(out.public_inputs, instance);
        assert_eq!(out.verification_key.0, "groth16-bn254:abcd");
    }
}
