pub mod handle;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the role of an account inside the institution.
///
/// There is no fallback role: a record carrying anything else fails to
/// deserialize, so an unrecognized role is an error instead of being
/// silently treated as a student.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Student,
    ClassRepresentative,
    Admin,
}

impl Role {
    /// Permissions granted by this role.
    pub fn permissions(self) -> &'static [Permission] {
        match self {
            Role::Student => &[Permission::Submit, Permission::View],
            Role::ClassRepresentative => {
                &[Permission::Submit, Permission::View, Permission::Review]
            }
            Role::Admin => &[
                Permission::View,
                Permission::Advance,
                Permission::ManageTickets,
                Permission::ManageRoles,
            ],
        }
    }

    /// Indicates whether this role grants the target permission.
    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Student => "student",
            Role::ClassRepresentative => "class-representative",
            Role::Admin => "admin",
        })
    }
}

/// A pending self-service role upgrade, awaiting an admin decision.
///
/// Requesting the class representative role is the only upgrade a user
/// can ask for, so this is a single-variant enum.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RequestedRole {
    ClassRepresentative,
}

pub type Permissions = Vec<Permission>;

/// Represent permissions an account has, derived from its [`Role`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Permission {
    /// Move approved tickets forward to in-progress and resolved.
    Advance,
    /// Decide pending role upgrade requests.
    ManageRoles,
    /// Delete any ticket, not only one's own.
    ManageTickets,
    /// Approve or reject pending tickets submitted by others.
    Review,
    /// Submit issue tickets.
    Submit,
    /// View tickets within one's own scope.
    View,
}

/// Represents a user's metadata.
#[derive(Serialize, Deserialize, Debug)]
pub struct UserMetadata {
    pub email: lettre::Address,
    pub first_name: String,
    pub last_name: String,
    /// Student id in the `XX-XXXX` format.
    pub student_id: String,
    pub role: Role,
    pub requested_role: Option<RequestedRole>,
}
