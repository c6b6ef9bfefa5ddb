// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::backends::{merge_request, parse_settings};
use crate::config::{ServiceConfig, ServiceType};
use crate::errors::{ConfigError, ServiceError};
use crate::observability::messages::service::TokenRejected;
use crate::observability::messages::StructuredLog;
use crate::traits::Service;

/// Family of signing algorithms a token must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMethod {
    Hmac,
    Ecdsa,
    Rsa,
    RsaPss,
}

impl SigningMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_uppercase().replace(['-', '_'], "").as_str() {
            "HMAC" | "HS" => Some(Self::Hmac),
            "ECDSA" | "ES" => Some(Self::Ecdsa),
            "RSA" | "RS" => Some(Self::Rsa),
            "RSAPSS" | "PS" => Some(Self::RsaPss),
            _ => None,
        }
    }

    pub fn accepts(self, algorithm: Algorithm) -> bool {
        use Algorithm::*;
        match self {
            Self::Hmac => matches!(algorithm, HS256 | HS384 | HS512),
            Self::Ecdsa => matches!(algorithm, ES256 | ES384),
            Self::Rsa => matches!(algorithm, RS256 | RS384 | RS512),
            Self::RsaPss => matches!(algorithm, PS256 | PS384 | PS512),
        }
    }

    /// Build the verification key. HMAC secrets may be given as `base64:<data>`.
    fn decoding_key(self, key: &str) -> Result<DecodingKey, String> {
        match self {
            Self::Hmac => match key.strip_prefix("base64:") {
                Some(encoded) => STANDARD
                    .decode(encoded.trim())
                    .map(|bytes| DecodingKey::from_secret(&bytes))
                    .map_err(|e| format!("secret is not valid base64: {}", e)),
                None => Ok(DecodingKey::from_secret(key.as_bytes())),
            },
            Self::Ecdsa => DecodingKey::from_ec_pem(key.as_bytes()).map_err(|e| e.to_string()),
            Self::Rsa | Self::RsaPss => DecodingKey::from_rsa_pem(key.as_bytes()).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hmac => "HMAC",
            Self::Ecdsa => "ECDSA",
            Self::Rsa => "RSA",
            Self::RsaPss => "RSAPSS",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JwtSettings {
    signing_method: String,
    key: String,
    iss: String,
    aud: String,
    sub: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JwtRequest {
    pub token: String,
    pub key: String,
    pub signing_method: String,
    pub iss: String,
    pub aud: String,
    pub sub: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtResponse {
    pub valid: bool,
    pub claims: Value,
    pub header: Value,
    pub validation_message: String,
    pub error: bool,
    pub error_message: String,
}

impl JwtResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            validation_message: message.into(),
            ..Default::default()
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: true,
            error_message: message.into(),
            ..Default::default()
        }
    }
}

/// Verifies signed tokens.
///
/// A token that does not verify is an answer, not a failure: the response carries
/// `valid = false` and a `validationMessage`. Only unusable key material fails the
/// step.
pub struct JwtService {
    name: String,
    settings: Arc<JwtSettings>,
    request: JwtRequest,
    response: Option<JwtResponse>,
}

impl JwtService {
    pub fn from_config(definition: &ServiceConfig) -> Result<Self, ConfigError> {
        let settings: JwtSettings = parse_settings(definition)?;
        let invalid =
            |reason: String| ConfigError::invalid_settings(&definition.name, definition.service_type, reason);

        if settings.signing_method.is_empty() {
            return Err(invalid("signingMethod is required".to_string()));
        }
        let method = SigningMethod::parse(&settings.signing_method).ok_or_else(|| {
            invalid(format!(
                "unknown signingMethod '{}' (expected HMAC, ECDSA, RSA or RSAPSS)",
                settings.signing_method
            ))
        })?;
        if !settings.key.is_empty() {
            method.decoding_key(&settings.key).map_err(|e| invalid(format!("key: {}", e)))?;
        }

        Ok(Self::with_settings(definition.name.clone(), Arc::new(settings)))
    }

    fn with_settings(name: String, settings: Arc<JwtSettings>) -> Self {
        Self {
            name,
            settings,
            request: JwtRequest::default(),
            response: None,
        }
    }

    /// Request value when given, otherwise the setting.
    fn pick<'a>(requested: &'a str, configured: &'a str) -> &'a str {
        if requested.is_empty() {
            configured
        } else {
            requested
        }
    }

    fn verify(&self) -> Result<JwtResponse, ServiceError> {
        let token = self.request.token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Ok(JwtResponse::failed("no token supplied"));
        }

        let method_name = Self::pick(&self.request.signing_method, &self.settings.signing_method);
        let method = SigningMethod::parse(method_name).ok_or_else(|| ServiceError::Jwt {
            service: self.name.clone(),
            reason: format!("unknown signing method '{}'", method_name),
        })?;

        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => return Ok(JwtResponse::rejected(format!("malformed token: {}", e))),
        };
        let header_json = serde_json::to_value(&header).unwrap_or(Value::Null);

        if !method.accepts(header.alg) {
            return Ok(JwtResponse {
                header: header_json,
                ..JwtResponse::rejected(format!(
                    "unexpected signing method {:?}, expected {}",
                    header.alg, method
                ))
            });
        }

        let key_text = Self::pick(&self.request.key, &self.settings.key);
        if key_text.is_empty() {
            return Err(ServiceError::Jwt {
                service: self.name.clone(),
                reason: "no key configured".to_string(),
            });
        }
        let key = method.decoding_key(key_text).map_err(|reason| ServiceError::Jwt {
            service: self.name.clone(),
            reason,
        })?;

        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        let iss = Self::pick(&self.request.iss, &self.settings.iss);
        if !iss.is_empty() {
            validation.set_issuer(&[iss]);
        }
        let aud = Self::pick(&self.request.aud, &self.settings.aud);
        if aud.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&[aud]);
        }
        let sub = Self::pick(&self.request.sub, &self.settings.sub);
        if !sub.is_empty() {
            validation.sub = Some(sub.to_string());
        }

        match decode::<Map<String, Value>>(token, &key, &validation) {
            Ok(data) => Ok(JwtResponse {
                valid: true,
                claims: Value::Object(data.claims),
                header: header_json,
                ..Default::default()
            }),
            Err(e) => match e.kind() {
                ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                    Err(ServiceError::Jwt {
                        service: self.name.clone(),
                        reason: e.to_string(),
                    })
                }
                ErrorKind::Crypto(_) => Ok(JwtResponse {
                    header: header_json,
                    ..JwtResponse::failed(e.to_string())
                }),
                _ => Ok(JwtResponse {
                    header: header_json,
                    ..JwtResponse::rejected(e.to_string())
                }),
            },
        }
    }
}

#[async_trait]
impl Service for JwtService {
    fn name(&self) -> &str {
        &self.name
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Jwt
    }

    fn update_request(&mut self, values: &Map<String, Value>) -> Result<(), ServiceError> {
        self.request = merge_request(&self.name, &self.request, values)?;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        let response = self.verify()?;

        if !response.valid {
            let reason = if response.error {
                &response.error_message
            } else {
                &response.validation_message
            };
            TokenRejected {
                service: &self.name,
                reason,
            }
            .log();
        }

        self.response = Some(response);
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({
            "request": serde_json::to_value(&self.request).unwrap_or(Value::Null),
            "response": self.response.as_ref().map_or(Value::Null, |r| {
                serde_json::to_value(r).unwrap_or(Value::Null)
            }),
        })
    }

    fn fork(&self) -> Box<dyn Service> {
        Box::new(Self::with_settings(self.name.clone(), self.settings.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "gateway-secret";

    fn service(settings: Value) -> JwtService {
        let definition = ServiceConfig {
            name: "Auth".to_string(),
            service_type: ServiceType::Jwt,
            description: None,
            settings: settings.as_object().cloned().unwrap(),
        };
        JwtService::from_config(&definition).unwrap()
    }

    fn token(claims: Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn check(svc: &mut JwtService, token: &str) -> Value {
        svc.update_request(json!({"token": token}).as_object().unwrap())
            .unwrap();
        svc.execute().await.unwrap();
        svc.snapshot()["response"].clone()
    }

    #[tokio::test]
    async fn test_valid_token_with_matching_claims() {
        let mut svc = service(json!({"signingMethod": "HMAC", "key": SECRET, "iss": "gateway", "aud": "pets"}));
        let jwt = token(json!({"iss": "gateway", "aud": "pets", "sub": "rex"}), SECRET);

        let response = check(&mut svc, &format!("Bearer {}", jwt)).await;

        assert_eq!(response["valid"], json!(true));
        assert_eq!(response["claims"]["sub"], json!("rex"));
        assert_eq!(response["header"]["alg"], json!("HS256"));
        assert_eq!(response["validationMessage"], json!(""));
    }

    #[tokio::test]
    async fn test_rejections_are_not_fatal() {
        let mut svc = service(json!({"signingMethod": "HMAC", "key": SECRET, "iss": "gateway"}));
        let good = token(json!({"iss": "gateway"}), SECRET);

        let mut tampered = good.clone();
        tampered.pop();
        tampered.push(if good.ends_with('A') { 'B' } else { 'A' });

        let cases = vec![
            ("tampered signature", tampered),
            ("wrong issuer", token(json!({"iss": "someone-else"}), SECRET)),
            ("wrong key", token(json!({"iss": "gateway"}), "other-secret")),
            ("expired", token(json!({"iss": "gateway", "exp": 1_000_000}), SECRET)),
            ("garbage", "not.a.token".to_string()),
        ];

        for (name, jwt) in cases {
            let response = check(&mut svc, &jwt).await;
            assert_eq!(response["valid"], json!(false), "{}", name);
            assert_ne!(response["validationMessage"], json!(""), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_signing_family_mismatch_is_rejected() {
        let mut svc = service(json!({"signingMethod": "RSA"}));
        let jwt = token(json!({}), SECRET);

        let response = check(&mut svc, &jwt).await;

        assert_eq!(response["valid"], json!(false));
        assert!(response["validationMessage"].as_str().unwrap().contains("RSA"));
    }

    #[tokio::test]
    async fn test_base64_secret() {
        let encoded = format!("base64:{}", STANDARD.encode(SECRET));
        let mut svc = service(json!({"signingMethod": "hmac", "key": encoded}));

        let response = check(&mut svc, &token(json!({"n": 1}), SECRET)).await;
        assert_eq!(response["valid"], json!(true));
    }

    #[tokio::test]
    async fn test_missing_token_is_an_error_response() {
        let mut svc = service(json!({"signingMethod": "HMAC", "key": SECRET}));

        let response = check(&mut svc, "").await;
        assert_eq!(response["valid"], json!(false));
        assert_eq!(response["error"], json!(true));
    }

    #[tokio::test]
    async fn test_bad_key_material_fails_the_step() {
        let mut svc = service(json!({"signingMethod": "RSA"}));
        svc.update_request(json!({"token": token(json!({}), SECRET), "signingMethod": "HMAC", "key": ""}).as_object().unwrap())
            .unwrap();
        assert!(matches!(svc.execute().await, Err(ServiceError::Jwt { .. })));

        let definition = ServiceConfig {
            name: "Auth".to_string(),
            service_type: ServiceType::Jwt,
            description: None,
            settings: json!({"signingMethod": "RSA", "key": "not a pem"}).as_object().cloned().unwrap(),
        };
        assert!(JwtService::from_config(&definition).is_err());
    }

    #[test]
    fn test_signing_method_is_required_at_warm_up() {
        let definition = ServiceConfig {
            name: "Auth".to_string(),
            service_type: ServiceType::Jwt,
            description: None,
            settings: json!({"key": SECRET}).as_object().cloned().unwrap(),
        };

        let err = JwtService::from_config(&definition).err().unwrap();
        assert!(err.to_string().contains("signingMethod"));
    }
}
