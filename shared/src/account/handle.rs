use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct AccountCreateDescriptor {
    pub email: lettre::Address,
}

#[derive(Serialize, Deserialize)]
pub struct AccountVerifyDescriptor {
    pub email: lettre::Address,
    pub code: u32,
    pub variant: AccountVerifyVariant,
}

#[derive(Serialize, Deserialize)]
pub enum AccountVerifyVariant {
    /// Activate an unverified account.
    Activate {
        first_name: String,
        last_name: String,
        /// Student id in the `XX-XXXX` format.
        student_id: String,
        requested_role: Option<super::RequestedRole>,
        password: String,
        /// Must equal `password`, mirroring the signup form.
        password_confirmation: String,
    },
    /// Complete a reset-password session with the new password.
    ResetPassword(String),
}

#[derive(Serialize, Deserialize)]
pub struct AccountLoginDescriptor {
    pub email: lettre::Address,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct ResetPasswordDescriptor {
    pub email: lettre::Address,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ViewAccountResult {
    pub id: u64,
    pub metadata: super::UserMetadata,
    pub permissions: super::Permissions,
    pub registration_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct AccountEditDescriptor {
    pub variants: Vec<AccountEditVariant>,
}

#[derive(Serialize, Deserialize)]
pub enum AccountEditVariant {
    FirstName(String),
    LastName(String),
    Password { old: String, new: String },
}

pub mod manage {
    use serde::{Deserialize, Serialize};

    /// An account with a pending role upgrade request.
    #[derive(Serialize, Deserialize, Debug)]
    pub struct RoleRequestEntry {
        pub account_id: u64,
        pub email: lettre::Address,
        pub first_name: String,
        pub last_name: String,
        pub student_id: String,
        pub requested_role: crate::account::RequestedRole,
    }

    #[derive(Serialize, Deserialize)]
    pub struct ReviewRoleDescriptor {
        pub account_id: u64,
        pub variant: ReviewRoleVariant,
    }

    #[derive(Serialize, Deserialize, Clone, Copy)]
    pub enum ReviewRoleVariant {
        /// Grant the requested role.
        Approve,
        /// Decline the request, leaving the role unchanged.
        Reject,
    }
}
