//! Core types used throughout the system
//!
//! Identifiers fall into two groups:
//!
//! - **External ids** (`OrgId`, `ContractId`, `PersonId`, `UserId`) are owned by the
//!   surrounding system and only referenced here. They are `i64` newtypes so they can never
//!   be swapped for one another by accident.
//! - **Record ids** (`CaseId`, `OwnershipRecordId`, ...) are generated by this crate. They are
//!   ULID-based: sortable to the millisecond and generated without coordination.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[inline]
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

external_id!(
    /// Tenant organization. Every entity is scoped by one.
    OrgId
);
external_id!(
    /// Funerary-use right contract (owned by the contract/plot subsystem).
    ContractId
);
external_id!(
    /// Person in the person directory.
    PersonId
);
external_id!(
    /// Authenticated operator account.
    UserId
);

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique id
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Get the inner ULID value
            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

record_id!(
    /// Ownership transfer case
    CaseId
);
record_id!(CaseDocumentId);
record_id!(PartyId);
record_id!(PublicationId);
record_id!(
    /// One holder's tenure of a contract
    OwnershipRecordId
);
record_id!(BeneficiaryId);
record_id!(
    /// Audit mirror entry (operational or administrative)
    AuditEntryId
);

/// Opaque reference returned by the document-storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller role. Operators may read everything but mutate nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Operator => "OPERATOR",
        }
    }

    #[inline]
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "OPERATOR" => Ok(Role::Operator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Authenticated caller: tenant, user and role.
///
/// Every core operation is scoped by `org`; nothing outside it is ever read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub org: OrgId,
    pub user: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(org: OrgId, user: UserId, role: Role) -> Self {
        Self { org, user, role }
    }

    pub fn admin(org: OrgId, user: UserId) -> Self {
        Self::new(org, user, Role::Admin)
    }
}

/// Time source for the core.
///
/// Closing dates, case numbers and audit timestamps all derive from it, so tests pin it with
/// [`FixedClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Add calendar years, clamping Feb 29 to Feb 28 on non-leap targets.
pub fn add_years(date: NaiveDate, years: i32) -> NaiveDate {
    use chrono::Datelike;
    let target = date.year() + years;
    date.with_year(target)
        .or_else(|| NaiveDate::from_ymd_opt(target, date.month(), 28))
        .unwrap_or(date)
}
