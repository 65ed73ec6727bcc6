//! Derived status flags for a fetched profile.
//!
//! Everything here except [`RoleChecker`] and [`fetch_profile`] is pure.
//! Two admin checks exist on purpose and must not be merged:
//! [`is_listed_admin`] compares against a client-side allow-list and is for
//! display only; [`RoleChecker::is_admin`] asks the backend and is the only
//! check that may gate anything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use garden_backend::schema::{columns, procedures, tables};
use garden_backend::{Backend, Filter};
use garden_common::TrackingError;

use crate::policy::{absorb, Operation};

/// Visits needed for the Local Guide badge.
pub const LOCAL_GUIDE_THRESHOLD: u32 = 30;

/// Role name checked by the authoritative admin check.
pub const ADMIN_ROLE: &str = "admin";

/// Subscription tier of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Vip,
}

impl Tier {
    /// Unknown or missing tiers are `Free`. Matching is exact, the same
    /// rule [`is_premium`] applies.
    pub fn parse(tier: Option<&str>) -> Self {
        match tier {
            Some("premium") => Self::Premium,
            Some("vip") => Self::Vip,
            _ => Self::Free,
        }
    }

    pub fn is_paid(self) -> bool {
        matches!(self, Self::Premium | Self::Vip)
    }
}

/// A `profiles` row as far as status resolution is concerned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub tier: Option<String>,
    #[serde(deserialize_with = "null_as_zero")]
    pub visit_count: u32,
    pub last_seen: Option<DateTime<Utc>>,
}

/// The column is nullable; a null count means no visits yet.
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_default())
}

/// True iff the tier string is exactly `premium` or `vip`.
pub fn is_premium(tier: Option<&str>) -> bool {
    Tier::parse(tier).is_paid()
}

pub fn is_local_guide(visit_count: u32) -> bool {
    visit_count >= LOCAL_GUIDE_THRESHOLD
}

/// Display-only allow-list check. Any client can spoof this; never use it
/// to gate a protected action.
pub fn is_listed_admin(email: Option<&str>, allow_list: &[String]) -> bool {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return false;
    };
    allow_list.iter().any(|a| a.trim().eq_ignore_ascii_case(email))
}

/// Flags derived from one profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DerivedStatus {
    pub tier: Tier,
    pub premium: bool,
    pub local_guide: bool,
    /// From the allow-list. Display only.
    pub listed_admin: bool,
}

impl DerivedStatus {
    pub fn resolve(profile: &Profile, allow_list: &[String]) -> Self {
        Self {
            tier: Tier::parse(profile.tier.as_deref()),
            premium: is_premium(profile.tier.as_deref()),
            local_guide: is_local_guide(profile.visit_count),
            listed_admin: is_listed_admin(profile.email.as_deref(), allow_list),
        }
    }
}

/// Authoritative role lookup through the `has_role` procedure.
pub struct RoleChecker {
    backend: Arc<dyn Backend>,
}

impl RoleChecker {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn has_role(&self, user_id: &str, role: &str) -> bool {
        let payload = json!({ "_user_id": user_id, "_role": role });
        let result = self.backend.rpc(procedures::HAS_ROLE, payload).await;
        let granted = matches!(absorb(Operation::RoleCheck, result), Some(Value::Bool(true)));
        debug!(user_id, role, granted, "Role check");
        granted
    }

    /// Any failure resolves to `false`.
    pub async fn is_admin(&self, user_id: &str) -> bool {
        self.has_role(user_id, ADMIN_ROLE).await
    }
}

/// Fetch the profile row for `user_id`. Failures and missing rows are `None`.
pub async fn fetch_profile(backend: &dyn Backend, user_id: &str) -> Option<Profile> {
    let filter = Filter::new().eq(columns::ID, user_id);
    let result = backend
        .select(tables::PROFILES, &filter)
        .await
        .and_then(|rows| match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| TrackingError::Decode(e.to_string())),
            None => Ok(None),
        });
    absorb(Operation::ProfileFetch, result).flatten()
}
