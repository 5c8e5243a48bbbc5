//! # GCP Federated Identity
//!
//! Obtains a signed login assertion for Vault's GCP auth method without a
//! cloud SDK: the runtime identity's access token comes from the metadata
//! server, and the assertion is signed by the IAM Credentials REST API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{IAM_CREDENTIALS_BASE_URL, JWT_TTL_SECS, METADATA_BASE_URL};

use super::error::AuthError;

#[derive(Debug, Serialize)]
struct SignJwtRequest {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct SignJwtResponse {
    #[serde(rename = "signedJwt")]
    signed_jwt: String,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Build the claims of the login assertion.
///
/// The audience encodes the target Vault role, the subject is the runtime
/// service account, and the expiry is a fixed short window from the time
/// of signing.
pub fn login_claims(vault_role: &str, service_account: &str, now: DateTime<Utc>) -> Value {
    json!({
        "aud": format!("vault/{vault_role}"),
        "sub": service_account,
        "exp": (now + Duration::seconds(JWT_TTL_SECS)).timestamp(),
    })
}

/// REST client for the metadata server and the IAM Credentials API.
#[derive(Debug, Clone)]
pub struct IamCredentialsClient {
    http: reqwest::Client,
    metadata_base: String,
    iam_base: String,
}

impl IamCredentialsClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_endpoints(METADATA_BASE_URL, IAM_CREDENTIALS_BASE_URL)
    }

    /// Client with overridden endpoints; used by tests to point both
    /// services at a mock server.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_endpoints(metadata_base: &str, iam_base: &str) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(AuthError::Client)?;
        Ok(Self {
            http,
            metadata_base: metadata_base.trim_end_matches('/').to_string(),
            iam_base: iam_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a short-lived access token for the runtime identity from the
    /// metadata server.
    ///
    /// # Errors
    ///
    /// [`AuthError::IdentityProviderUnavailable`] when the metadata server
    /// is unreachable or the environment carries no credentials.
    pub async fn runtime_access_token(&self) -> Result<String, AuthError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_base
        );

        let token = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(AuthError::IdentityProviderUnavailable)?
            .json::<MetadataToken>()
            .await
            .map_err(AuthError::IdentityProviderUnavailable)?;

        Ok(token.access_token)
    }

    /// Ask the IAM Credentials API to sign `claims` with the service
    /// account's key.
    ///
    /// # Errors
    ///
    /// [`AuthError::SigningFailed`] when the API rejects the request;
    /// [`AuthError::IdentityProviderUnavailable`] when it is unreachable.
    pub async fn sign_jwt(
        &self,
        access_token: &str,
        project: &str,
        service_account: &str,
        claims: &Value,
    ) -> Result<String, AuthError> {
        let url = format!(
            "{}/v1/projects/{project}/serviceAccounts/{service_account}:signJwt",
            self.iam_base
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&SignJwtRequest {
                payload: claims.to_string(),
            })
            .send()
            .await
            .map_err(AuthError::IdentityProviderUnavailable)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| format!("status {status}"));
            return Err(AuthError::SigningFailed {
                service_account: service_account.to_string(),
                message,
            });
        }

        let signed = response
            .json::<SignJwtResponse>()
            .await
            .map_err(AuthError::IdentityProviderUnavailable)?;

        Ok(signed.signed_jwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_encode_role_subject_and_expiry() {
        let now = Utc::now();
        let claims = login_claims("my-role", "sa@proj.iam.gserviceaccount.com", now);

        assert_eq!(claims["aud"], "vault/my-role");
        assert_eq!(claims["sub"], "sa@proj.iam.gserviceaccount.com");
        assert_eq!(claims["exp"], now.timestamp() + 600);
    }
}
