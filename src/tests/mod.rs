mod account;
mod account_manage;

pub use crate::account::verify::Tokens;
pub use crate::account::{Account, RequestedRole, Role, UserProfile, UserVerifyVariant};

use sha256::digest;

pub fn reset_all() {
    crate::account::INSTANCE.reset();
    crate::ticket::INSTANCE.reset();
    crate::ticket::attachment::INSTANCE.reset();
}

/// Push a verified account with the target role, returning a usable
/// token for it.
pub fn push_account(account_id: u64, email_local: &str, role: Role) -> String {
    push_account_requesting(account_id, email_local, role, None)
}

pub fn push_account_requesting(
    account_id: u64,
    email_local: &str,
    role: Role,
    requested_role: Option<RequestedRole>,
) -> String {
    let token;

    crate::account::INSTANCE.push(Account::Verified {
        id: account_id,
        profile: UserProfile {
            email: lettre::Address::new(email_local, "plv.edu.ph").unwrap(),
            first_name: "Juan".to_string(),
            last_name: "Dela Cruz".to_string(),
            student_id: "23-3302".to_string(),
            role,
            requested_role,
            registration_time: chrono::Utc::now(),
            password_sha: digest("password123456".to_string()),
            token_expiration_time: 0,
        },
        tokens: {
            let mut t = Tokens::new();
            token = t.new_token(account_id, 0);
            t
        },
        verify: UserVerifyVariant::None,
    });

    token
}
