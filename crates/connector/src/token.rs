//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Capability token validation.
//!
//! A token is three Base64URL segments joined by dots,
//! `header.payload.signature`. The signature covers the exact bytes
//! `header "." payload` (before any decoding) and is checked against a
//! PEM public key loaded at startup; the key's algorithm picks the
//! scheme (RSA PKCS#1 v1.5 or ECDSA P-256, both over SHA-256). Only
//! after the signature verifies is the payload parsed and its `exp`
//! claim compared against the clock.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use p256::ecdsa::signature::Verifier;
use p256::pkcs8::DecodePublicKey as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fs;
use std::path::Path;

/// Token rejection reasons, in the wording the broker replies with.
#[derive(Error, Debug)]
pub enum TokenError {
    /// Structural problems: wrong segment count, undecodable payload.
    #[error("{0}")]
    Malformed(String),

    /// The signature does not verify against the configured key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The `exp` claim lies in the past.
    #[error("Token expired")]
    Expired,
}

/// Startup problems with the configured public key. Fatal.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("cannot read public key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported public key (expected PEM RSA or ECDSA P-256)")]
    Unsupported,
}

/// The verified token payload.
#[derive(Clone, Debug)]
pub struct Claims {
    payload: Value,
}

impl Claims {
    /// Expiry as seconds since epoch, if the token carries one.
    pub fn exp(&self) -> Option<i64> {
        self.payload.get("exp").and_then(Value::as_i64)
    }

    /// Whether the `permissions` claim contains `capability`.
    pub fn has_permission(&self, capability: &str) -> bool {
        self.payload
            .get("permissions")
            .and_then(Value::as_array)
            .map(|list| list.iter().any(|p| p.as_str() == Some(capability)))
            .unwrap_or(false)
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.payload.get(claim)
    }
}

enum SignatureScheme {
    RsaSha256(Box<RsaPublicKey>),
    EcdsaP256Sha256(p256::ecdsa::VerifyingKey),
}

/// Validator bound to one public key; read-only after construction.
pub struct TokenValidator {
    scheme: SignatureScheme,
}

impl TokenValidator {
    /// Load the key file and pick the signature scheme from it.
    pub fn from_pem_file(path: &Path) -> Result<Self, KeyError> {
        let pem = fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self {
                scheme: SignatureScheme::RsaSha256(Box::new(key)),
            });
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
            return Ok(Self {
                scheme: SignatureScheme::RsaSha256(Box::new(key)),
            });
        }
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self {
                scheme: SignatureScheme::EcdsaP256Sha256(key),
            });
        }
        Err(KeyError::Unsupported)
    }

    /// Validate against the current wall clock.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    /// Validate with an explicit `now` (seconds since epoch).
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::Malformed(
                "Invalid token format (not 3 parts)".to_string(),
            ));
        }

        // The signing input is the raw first two segments, undecoded.
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let signature = decode_segment(parts[2]).map_err(|_| TokenError::InvalidSignature)?;
        self.verify(signing_input.as_bytes(), &signature)?;

        let payload_bytes = decode_segment(parts[1])
            .map_err(|_| TokenError::Malformed("Invalid payload encoding".to_string()))?;
        let payload: Value = serde_json::from_slice(&payload_bytes)
            .map_err(|e| TokenError::Malformed(format!("JSON parsing error: {e}")))?;

        if let Some(exp) = payload.get("exp").and_then(Value::as_i64) {
            if now > exp {
                return Err(TokenError::Expired);
            }
        }

        Ok(Claims { payload })
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        match &self.scheme {
            SignatureScheme::RsaSha256(key) => {
                let digest = Sha256::digest(message);
                key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                    .map_err(|_| TokenError::InvalidSignature)
            }
            SignatureScheme::EcdsaP256Sha256(key) => {
                // Standard mints emit raw r||s; OpenSSL-based signers
                // emit DER. Accept both.
                let parsed = p256::ecdsa::Signature::from_slice(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_der(signature))
                    .map_err(|_| TokenError::InvalidSignature)?;
                key.verify(message, &parsed)
                    .map_err(|_| TokenError::InvalidSignature)
            }
        }
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}
