//! Wire types shared between the admin console and the platform API.
//!
//! Field names follow the backend's camelCase JSON convention via serde
//! renames. These are transport shapes, not sources of truth - the session
//! view in particular is a cache rebuilt from backend calls.

use serde::{Deserialize, Serialize};

/// Credential pair issued at login and rotated on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Account profile as returned by the profile endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Institution the account belongs to, if any. Drives the optional
    /// institution lookup when the session view is rebuilt.
    #[serde(default)]
    pub institution_id: Option<i64>,
}

/// A role granted to the account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Institution record referenced by a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Institution {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Derived session view: profile, roles, and (optionally) the institution.
///
/// Rebuildable at any time from a valid refresh credential; never consulted
/// to decide whether the session itself is alive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Session {
    pub profile: UserProfile,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub institution: Option<Institution>,
}

impl Session {
    /// True if any granted role carries the given code.
    pub fn has_role(&self, code: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r.code.as_deref() == Some(code) || r.name == code)
    }
}
