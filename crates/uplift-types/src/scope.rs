//! Memory scope URIs and access modes.
//!
//! All agent memory lives in named scopes addressed by `uplift://` URIs,
//! e.g. `uplift://agent/research-agent` or `uplift://user/financial-prefs`.
//! Scopes are the unit of permissioning: every grant names a scope and an
//! access mode, and the kernel checks both on every memory operation.

use crate::error::UpliftError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The URI scheme prefix for all memory scopes.
pub const SCOPE_SCHEME: &str = "uplift://";

/// The realm a scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeRealm {
    /// Private per-agent storage (`uplift://agent/<name>`).
    Agent,
    /// User-owned data an agent may be granted (`uplift://user/<name>`).
    User,
    /// Storage shared between agents (`uplift://shared/<name>`).
    Shared,
}

impl ScopeRealm {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::User => "user",
            Self::Shared => "shared",
        }
    }
}

/// A parsed memory scope URI: `uplift://<realm>/<name>`.
///
/// Names are limited to `[a-z0-9_-]` to keep them shell- and URL-safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeUri {
    realm: ScopeRealm,
    name: String,
}

impl ScopeUri {
    /// Construct a scope from its parts, validating the name.
    pub fn new(realm: ScopeRealm, name: &str) -> Result<Self, UpliftError> {
        if name.is_empty() || !name.bytes().all(valid_name_byte) {
            return Err(UpliftError::InvalidScope(format!(
                "scope name '{name}' must be non-empty [a-z0-9_-]"
            )));
        }
        Ok(Self {
            realm,
            name: name.to_string(),
        })
    }

    /// The private scope owned by the named agent.
    pub fn agent_private(agent_name: &str) -> Result<Self, UpliftError> {
        Self::new(ScopeRealm::Agent, agent_name)
    }

    /// The realm component of the URI.
    pub fn realm(&self) -> ScopeRealm {
        self.realm
    }

    /// The name component of the URI.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn valid_name_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-'
}

impl FromStr for ScopeUri {
    type Err = UpliftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCOPE_SCHEME)
            .ok_or_else(|| UpliftError::InvalidScope(format!("'{s}' missing uplift:// scheme")))?;
        let (realm, name) = rest
            .split_once('/')
            .ok_or_else(|| UpliftError::InvalidScope(format!("'{s}' missing /name part")))?;
        let realm = match realm {
            "agent" => ScopeRealm::Agent,
            "user" => ScopeRealm::User,
            "shared" => ScopeRealm::Shared,
            other => {
                return Err(UpliftError::InvalidScope(format!(
                    "unknown realm '{other}' in '{s}'"
                )))
            }
        };
        Self::new(realm, name)
    }
}

impl fmt::Display for ScopeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCOPE_SCHEME}{}/{}", self.realm.as_str(), self.name)
    }
}

// Serde uses the canonical URI string form.
impl Serialize for ScopeUri {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScopeUri {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Access mode attached to a scope grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeAccess {
    /// Read keys and run queries.
    Read,
    /// Store and delete keys.
    Write,
    /// Both.
    ReadWrite,
}

impl ScopeAccess {
    /// Whether this grant covers the requested mode.
    pub fn allows(&self, requested: ScopeAccess) -> bool {
        match (self, requested) {
            (Self::ReadWrite, _) => true,
            (Self::Read, Self::Read) => true,
            (Self::Write, Self::Write) => true,
            _ => false,
        }
    }
}

/// A scope plus the access mode granted on it, as declared in manifests
/// and delegation requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeGrant {
    /// The scope being granted.
    pub scope: ScopeUri,
    /// The access mode.
    #[serde(default = "default_access")]
    pub access: ScopeAccess,
}

fn default_access() -> ScopeAccess {
    ScopeAccess::Read
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_uris() {
        let s: ScopeUri = "uplift://agent/research-agent".parse().unwrap();
        assert_eq!(s.realm(), ScopeRealm::Agent);
        assert_eq!(s.name(), "research-agent");
        assert_eq!(s.to_string(), "uplift://agent/research-agent");

        let u: ScopeUri = "uplift://user/financial-prefs".parse().unwrap();
        assert_eq!(u.realm(), ScopeRealm::User);

        let sh: ScopeUri = "uplift://shared/task_results".parse().unwrap();
        assert_eq!(sh.realm(), ScopeRealm::Shared);
    }

    #[test]
    fn reject_invalid_uris() {
        assert!("agent/private".parse::<ScopeUri>().is_err());
        assert!("uplift://agent".parse::<ScopeUri>().is_err());
        assert!("uplift://kernel/x".parse::<ScopeUri>().is_err());
        assert!("uplift://agent/".parse::<ScopeUri>().is_err());
        assert!("uplift://agent/Has Spaces".parse::<ScopeUri>().is_err());
    }

    #[test]
    fn access_lattice() {
        assert!(ScopeAccess::ReadWrite.allows(ScopeAccess::Read));
        assert!(ScopeAccess::ReadWrite.allows(ScopeAccess::Write));
        assert!(ScopeAccess::Read.allows(ScopeAccess::Read));
        assert!(!ScopeAccess::Read.allows(ScopeAccess::Write));
        assert!(!ScopeAccess::Write.allows(ScopeAccess::Read));
    }

    #[test]
    fn serde_round_trip() {
        let grant = ScopeGrant {
            scope: "uplift://shared/reports".parse().unwrap(),
            access: ScopeAccess::ReadWrite,
        };
        let json = serde_json::to_string(&grant).unwrap();
        assert!(json.contains("uplift://shared/reports"));
        let back: ScopeGrant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grant);
    }
}
