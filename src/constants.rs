//! Shared constants and defaults.

/// Default span prefix when `TRACE_PREFIX` is not set.
pub const DEFAULT_TRACE_PREFIX: &str = "vault";

/// Default mount path of Vault's GCP auth method.
pub const DEFAULT_GCP_AUTH_MOUNT: &str = "gcp";

/// Mount path of Vault's GitHub auth method.
pub const GITHUB_AUTH_MOUNT: &str = "github";

/// Name of the Kubernetes Secret this tool owns. Publishes always target
/// this one object per namespace; re-runs update it in place.
pub const TARGET_SECRET_NAME: &str = "vault-secret";

/// Lifetime of the signed login assertion.
pub const JWT_TTL_SECS: i64 = 600;

/// Conflict retry budget for the publish path.
pub const APPLY_RETRY_STEPS: u32 = 5;

/// Base delay for the publish conflict backoff, doubled per attempt.
pub const APPLY_RETRY_BASE_MS: u64 = 10;

/// GCP metadata server, source of the runtime identity's access token.
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal";

/// IAM Credentials API, used to sign the login assertion.
pub const IAM_CREDENTIALS_BASE_URL: &str = "https://iamcredentials.googleapis.com";
