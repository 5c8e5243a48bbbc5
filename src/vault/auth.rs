//! # Authentication Strategies
//!
//! Exactly one login flow runs per client lifetime. The two flows are a
//! tagged union rather than an open trait: both are small, closed, and
//! independently testable, and selection is a plain match.

use std::fmt;

use serde_json::json;
use tracing::{debug, Instrument};

use crate::config::{AuthMaterial, Config};
use crate::constants::GITHUB_AUTH_MOUNT;
use crate::observability::Observability;

use super::api::StoreApi;
use super::error::AuthError;
use super::gcp::{login_claims, IamCredentialsClient};
use super::types::{Credential, Envelope};

/// The selected login flow.
#[derive(Clone)]
pub enum AuthStrategy {
    /// Present a JWT signed by the IAM Credentials API to
    /// `auth/<mount>/login`.
    FederatedIdentity {
        project: String,
        service_account: String,
        auth_mount: String,
    },
    /// Hand a pre-provisioned access token to `auth/github/login`.
    StaticToken { token: String },
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FederatedIdentity {
                project,
                service_account,
                auth_mount,
            } => f
                .debug_struct("FederatedIdentity")
                .field("project", project)
                .field("service_account", service_account)
                .field("auth_mount", auth_mount)
                .finish(),
            Self::StaticToken { .. } => f
                .debug_struct("StaticToken")
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl AuthStrategy {
    /// Choose the strategy for a validated configuration. Infallible:
    /// configuration validation already guarantees exactly one mechanism.
    pub fn select(config: &Config) -> Self {
        match &config.auth {
            AuthMaterial::Github { token } => Self::StaticToken {
                token: token.clone(),
            },
            AuthMaterial::Gcp {
                project,
                service_account,
                auth_mount,
            } => Self::FederatedIdentity {
                project: project.clone(),
                service_account: service_account.clone(),
                auth_mount: auth_mount.clone(),
            },
        }
    }
}

/// Execute the selected strategy and produce a bearer credential.
///
/// No retries: any failure is fatal to client construction. `iam` may be
/// supplied to redirect the identity endpoints (tests); when `None`, the
/// production endpoints are used.
///
/// # Errors
///
/// See [`AuthError`] for the failure taxonomy.
pub async fn authenticate(
    strategy: &AuthStrategy,
    api: &dyn StoreApi,
    iam: Option<&IamCredentialsClient>,
    vault_role: &str,
    obs: &Observability,
) -> Result<Credential, AuthError> {
    let span = obs.span("NewVaultToken");
    async {
        match strategy {
            AuthStrategy::StaticToken { token } => {
                let span = obs.span("github/GetVaultToken");
                async {
                    let payload = json!({ "token": token });
                    let envelope = api
                        .login(GITHUB_AUTH_MOUNT, &payload)
                        .instrument(obs.span("github/vaultLogin"))
                        .await?;
                    debug!("logged into vault with auth/github/login");
                    credential_from(envelope)
                }
                .instrument(span)
                .await
            }
            AuthStrategy::FederatedIdentity {
                project,
                service_account,
                auth_mount,
            } => {
                let span = obs.span("gcp/GetVaultToken");
                async {
                    let default_client;
                    let iam = match iam {
                        Some(client) => client,
                        None => {
                            default_client = IamCredentialsClient::new()?;
                            &default_client
                        }
                    };

                    let access_token = iam.runtime_access_token().await?;
                    let claims = login_claims(vault_role, service_account, chrono::Utc::now());
                    let signed = iam
                        .sign_jwt(&access_token, project, service_account, &claims)
                        .await?;
                    debug!("generated signed jwt for login");

                    let payload = json!({ "role": vault_role, "jwt": signed });
                    let envelope = api
                        .login(auth_mount, &payload)
                        .instrument(obs.span("gcp/vaultLogin"))
                        .await?;
                    debug!("logged into vault with auth/{}/login", auth_mount);
                    credential_from(envelope)
                }
                .instrument(span)
                .await
            }
        }
    }
    .instrument(span)
    .await
}

fn credential_from(envelope: Envelope) -> Result<Credential, AuthError> {
    envelope
        .auth
        .map(|auth| Credential::new(auth.client_token))
        .ok_or(AuthError::MissingClientToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(&move |name| vars.get(name).cloned()).unwrap()
    }

    fn base_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("VAULT_ADDR", "http://127.0.0.1:8200"),
            ("VAULT_ROLE", "read"),
            ("VAULT_SECRET", "kv/data/app/dotenv"),
            ("K8S_NAMESPACE", "default"),
        ]
    }

    #[test]
    fn selects_static_token_for_github_config() {
        let mut vars = base_vars();
        vars.push(("GITHUB_OAUTH_TOKEN", "gh-token"));
        let strategy = AuthStrategy::select(&config_with(&vars));
        assert!(matches!(strategy, AuthStrategy::StaticToken { ref token } if token == "gh-token"));
    }

    #[test]
    fn selects_federated_identity_for_gcp_config() {
        let mut vars = base_vars();
        vars.push(("GCLOUD_PROJECT", "proj"));
        vars.push(("FUNCTION_IDENTITY", "sa@proj.iam.gserviceaccount.com"));
        vars.push(("GCP_AUTH_PATH", "gcp-dev"));
        let strategy = AuthStrategy::select(&config_with(&vars));
        match strategy {
            AuthStrategy::FederatedIdentity {
                project,
                service_account,
                auth_mount,
            } => {
                assert_eq!(project, "proj");
                assert_eq!(service_account, "sa@proj.iam.gserviceaccount.com");
                assert_eq!(auth_mount, "gcp-dev");
            }
            AuthStrategy::StaticToken { .. } => panic!("expected federated identity"),
        }
    }

    #[test]
    fn strategy_debug_redacts_token() {
        let strategy = AuthStrategy::StaticToken {
            token: "gh-secret".to_string(),
        };
        let output = format!("{strategy:?}");
        assert!(!output.contains("gh-secret"));
    }
}
