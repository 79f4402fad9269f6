//! # palisade-types: Core types for `Palisade`
//!
//! This crate contains shared types used across the `Palisade` system:
//! - Entity IDs ([`PermissionId`], [`ResourceId`], [`PvmId`], [`RoleId`], [`UserId`],
//!   [`DatabaseId`], [`DatasourceId`], [`ChartId`], [`DashboardId`], [`RlsFilterId`])
//! - Row-level security filter kinds ([`RlsFilterType`])
//! - Temporal types ([`Timestamp`])

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a permission (an action class such as `datasource_access`).
    PermissionId
);
entity_id!(
    /// Identifier of a resource (the protected object a permission applies to).
    ResourceId
);
entity_id!(
    /// Identifier of a permission-resource pair, the atomic grantable unit.
    PvmId
);
entity_id!(
    /// Identifier of a role.
    RoleId
);
entity_id!(
    /// Identifier of a persisted user.
    UserId
);
entity_id!(
    /// Identifier of a registered database connection.
    DatabaseId
);
entity_id!(
    /// Identifier of a datasource (a dataset backed by a physical or virtual table).
    DatasourceId
);
entity_id!(
    /// Identifier of a chart.
    ChartId
);
entity_id!(
    /// Identifier of a dashboard.
    DashboardId
);
entity_id!(
    /// Identifier of a row-level security filter.
    ///
    /// The numeric order of these ids is what makes RLS cache keys canonical.
    RlsFilterId
);

// ============================================================================
// Row-level security
// ============================================================================

/// How a row-level security filter combines with the principal's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RlsFilterType {
    /// Permissive: holding a linked role unlocks the rows matched by the clause.
    #[default]
    Regular,
    /// Restrictive: applies to everyone except holders of a linked role.
    Base,
}

impl Display for RlsFilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RlsFilterType::Regular => write!(f, "Regular"),
            RlsFilterType::Base => write!(f, "Base"),
        }
    }
}

// ============================================================================
// Temporal Types
// ============================================================================

/// Wall-clock timestamp with second precision.
///
/// Guest credentials carry `iat`/`exp` as whole seconds since the Unix
/// epoch, so this is the only precision the crate needs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from seconds since Unix epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the timestamp as seconds since Unix epoch.
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Creates a timestamp for the current time.
    ///
    /// A system clock set before the Unix epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self(secs)
    }

    /// Returns this timestamp moved forward by `secs`, saturating at `u64::MAX`.
    pub fn saturating_add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
