//! Wire types for the Vault REST API and the credential wrapper.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Flat key/value data for one engine path. Absent keys are represented by
/// key-absence, never by null values.
pub type SecretSet = BTreeMap<String, String>;

/// Vault response envelope.
///
/// Reads carry the secret under `data.data` with the version counter in
/// `data.current_version` or `data.metadata.version`; listings carry
/// `data.keys`; logins carry `auth.client_token`. Fields that a given
/// operation does not use are simply absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub auth: Option<AuthData>,
}

/// The `auth` sub-object of a login response.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthData {
    pub client_token: String,
}

/// Metadata returned by a successful write. Vault always creates a new
/// version; the counter comes back in the write envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    pub version: Option<i64>,
}

/// Bearer token for the Vault API.
///
/// Obtained once per client lifetime, never cached or refreshed. The
/// backing memory is wiped on drop and the token never appears in `Debug`
/// output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for placing on the `X-Vault-Token` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}
