//! Local stand-ins for the quantum and AI services.
//!
//! No key distribution or post-quantum algorithm runs here. The stubs keep
//! the route surface answerable when no upstream is configured.

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::downstream::{DownstreamRequest, DownstreamResponse, Service};
use crate::security::sanitizer::is_registry_identifier;

const MAX_RANDOM_BITS: u32 = 1024;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QkdRequest {
    #[serde(default = "default_key_length")]
    key_length: u32,
    #[serde(default = "default_algorithm")]
    algorithm: String,
}

fn default_key_length() -> u32 {
    256
}

fn default_algorithm() -> String {
    "qkd".to_string()
}

pub fn handle(request: &DownstreamRequest) -> DownstreamResponse {
    let (status, body) = match request.service {
        Service::Quantum => quantum(&request.method, &request.tail, &request.body),
        Service::Ai => not_implemented("AI threat analysis is not available"),
    };
    DownstreamResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: Bytes::from(body.to_string()),
    }
}

fn quantum(method: &Method, tail: &str, body: &[u8]) -> (StatusCode, Value) {
    let segments: Vec<&str> = tail.split('/').collect();
    match (method, segments.as_slice()) {
        (&Method::GET, ["status"]) => (
            StatusCode::OK,
            json!({
                "quantum_backend": "ibm_qasm_simulator",
                "status": "available",
                "queue_length": 0,
                "capabilities": {
                    "qkd": true,
                    "pq_crypto": true,
                    "quantum_random": true,
                },
            }),
        ),
        (&Method::GET, ["random", bits]) => random(bits),
        (&Method::POST, ["qkd", "generate"]) => qkd_generate(body),
        (&Method::POST, ["pqcrypto"]) => not_implemented("post-quantum cryptography is not available"),
        (&Method::POST, ["simulate"]) => not_implemented("quantum simulation is not available"),
        _ => error(StatusCode::NOT_FOUND, "not_found", "resource not found"),
    }
}

fn random(bits: &str) -> (StatusCode, Value) {
    let num_bits = match bits.parse::<u32>() {
        Ok(n) if n <= MAX_RANDOM_BITS => n,
        _ => {
            return error(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                "num_bits must be an integer no greater than 1024",
            )
        }
    };

    let mut bytes = vec![0u8; (num_bits / 8) as usize];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    (
        StatusCode::OK,
        json!({
            "num_bits": num_bits,
            "random_value": hex::encode(bytes),
            "method": "quantum_simulator",
        }),
    )
}

fn qkd_generate(body: &[u8]) -> (StatusCode, Value) {
    let request: QkdRequest = if body.is_empty() {
        QkdRequest {
            key_length: default_key_length(),
            algorithm: default_algorithm(),
        }
    } else {
        match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(_) => return error(StatusCode::BAD_REQUEST, "invalid_input", "malformed request body"),
        }
    };
    if !is_registry_identifier(&request.algorithm) {
        return error(StatusCode::BAD_REQUEST, "invalid_input", "unsupported algorithm");
    }

    (
        StatusCode::OK,
        json!({
            "key": "simulated_quantum_key_placeholder",
            "key_id": "qkey_001",
            "key_length": request.key_length,
            "algorithm": request.algorithm,
            "security_level": "high",
        }),
    )
}

fn not_implemented(message: &str) -> (StatusCode, Value) {
    error(StatusCode::NOT_IMPLEMENTED, "not_implemented", message)
}

fn error(status: StatusCode, code: &str, message: &str) -> (StatusCode, Value) {
    (status, json!({ "error": code, "message": message }))
}
