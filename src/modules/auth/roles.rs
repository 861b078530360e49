use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::error::GateError;

/// Roles an account or invitation can carry.
///
/// Variants are declared in alphabetical order; the derived `Ord` is what sorts a
/// `RoleSet` by name.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Reviewer,
    Staff,
    Student,
    User,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Instructor,
        Role::Reviewer,
        Role::Staff,
        Role::Student,
        Role::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Reviewer => "reviewer",
            Role::Instructor => "instructor",
            Role::Staff => "staff",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| GateError::UnknownRole(s.trim().to_string()))
    }
}

/// Order-irrelevant set of roles.
///
/// Stored and displayed as the lower-case, comma-joined form (`"reviewer,student"`);
/// everything inside the crate works with the set itself.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn single(role: Role) -> Self {
        Self(BTreeSet::from([role]))
    }

    /// Parse the comma-joined form; blank entries are skipped, unknown names are errors
    pub fn parse(joined: &str) -> Result<Self, GateError> {
        joined
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Role::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn is_admin(&self) -> bool {
        self.contains(Role::Admin)
    }

    /// Comma-joined form used at the persistence and display boundary
    pub fn joined(&self) -> String {
        self.0.iter().map(Role::as_str).join(",")
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl TryFrom<String> for RoleSet {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoleSet::parse(&value)
    }
}

impl From<RoleSet> for String {
    fn from(roles: RoleSet) -> Self {
        roles.joined()
    }
}
