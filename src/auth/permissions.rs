use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnEntries,
    EditOwnEntries,
    EditOwnProfile,
    CompleteChallenges,
    SubmitChallengeWork,

    ManageChallenges,
    ReviewSubmissions,
    ViewAllUsers,
    EditUserCredentials,
    EditUserRoles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Learner,
    Admin,
}

static LEARNER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnEntries);
    permissions.insert(Permission::EditOwnEntries);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::CompleteChallenges);
    permissions.insert(Permission::SubmitChallengeWork);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(LEARNER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageChallenges);
    permissions.insert(Permission::ReviewSubmissions);
    permissions.insert(Permission::ViewAllUsers);
    permissions.insert(Permission::EditUserCredentials);
    permissions.insert(Permission::EditUserRoles);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Learner => &LEARNER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Learner => "learner",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "learner" => Ok(Role::Learner),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Learner => write!(f, "learner"),
            Role::Admin => write!(f, "admin"),
        }
    }
}
