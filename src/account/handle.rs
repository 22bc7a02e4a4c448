use super::verify;
use super::Account;
use super::Error;
use super::UserProfile;
use super::UserVerifyVariant;
use crate::RequirePermissionContext;
use crate::ResError;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use sha256::digest;
use std::ops::{Deref, DerefMut};
use tracing::info;

use cira_shared::account::handle::*;
use cira_shared::account::Role;

/// Create an unverified account and dispatch its verification code.
/// Requesting again with the email of a pending signup resends a
/// fresh code instead of failing.
pub async fn create_account(
    Json(descriptor): Json<AccountCreateDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let existing = {
        let b = super::INSTANCE.inner().read();
        b.iter()
            .position(|account| account.read().email() == &descriptor.email)
            .map(|index| {
                (
                    index,
                    matches!(b[index].read().deref(), Account::Verified { .. }),
                )
            })
    };

    if let Some((_, true)) = existing {
        return Err(ResError(Error::UserRegistered).into());
    }

    let account = Account::new(descriptor.email).await.map_err(ResError)?;

    match existing {
        Some((index, _)) => {
            let b = super::INSTANCE.inner().read();
            let mut aw = b
                .get(index)
                .ok_or(ResError(Error::TargetAccountNotFound))?
                .write();
            *aw = account;
            aw.save();
            info!("verification code resent to {}", aw.email());
        }
        None => {
            info!(
                "unverified account created: {} (id: {})",
                account.email(),
                account.id()
            );
            super::INSTANCE.push(account);
        }
    }

    Ok(Json(json!({})))
}

/// Verify an account with the code it received, either activating a
/// pending signup or completing a password reset.
pub async fn verify_account(
    Json(descriptor): Json<AccountVerifyDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    match &descriptor.variant {
        AccountVerifyVariant::Activate {
            first_name,
            last_name,
            student_id,
            password,
            password_confirmation,
            ..
        } => {
            if first_name.trim().is_empty() {
                return Err(ResError(Error::FieldEmpty("first name")).into());
            }
            if last_name.trim().is_empty() {
                return Err(ResError(Error::FieldEmpty("last name")).into());
            }
            super::validate_student_id(student_id).map_err(ResError)?;
            if password.is_empty() {
                return Err(ResError(Error::FieldEmpty("password")).into());
            }
            if password != password_confirmation {
                return Err(ResError(Error::PasswordMismatch).into());
            }
        }
        AccountVerifyVariant::ResetPassword(password) => {
            if password.is_empty() {
                return Err(ResError(Error::FieldEmpty("password")).into());
            }
        }
    }

    let id = {
        let b = super::INSTANCE.inner().read();
        b.iter().find_map(|account| {
            let ar = account.read();
            (ar.email() == &descriptor.email).then(|| ar.id())
        })
    }
    .ok_or(ResError(Error::TargetAccountNotFound))?;

    // Drops the account when its code expired already.
    super::INSTANCE.refresh(id);

    let index = *super::INSTANCE
        .index()
        .get(&id)
        .ok_or(ResError(Error::TargetAccountNotFound))?;
    let b = super::INSTANCE.inner().read();
    let mut aw = b
        .get(index)
        .ok_or(ResError(Error::TargetAccountNotFound))?
        .write();

    match descriptor.variant {
        AccountVerifyVariant::Activate {
            first_name,
            last_name,
            student_id,
            requested_role,
            password,
            ..
        } => {
            aw.verify(
                descriptor.code,
                super::AccountVerifyVariant::Activate(UserProfile {
                    email: descriptor.email,
                    first_name,
                    last_name,
                    student_id,
                    role: Role::Student,
                    requested_role,
                    registration_time: Utc::now(),
                    password_sha: digest(password),
                    token_expiration_time: 5,
                }),
            )
            .map_err(ResError)?;
            aw.save();

            info!("account verified: {} (id: {})", aw.email(), aw.id());
            if requested_role.is_some() {
                info!(
                    "account {} requested the class representative role",
                    aw.id()
                );
            }

            Ok(Json(json!({ "account_id": aw.id() })))
        }
        AccountVerifyVariant::ResetPassword(password) => {
            aw.verify(
                descriptor.code,
                super::AccountVerifyVariant::ResetPassword(password),
            )
            .map_err(ResError)?;
            aw.save();

            info!("password reset for {} (id: {})", aw.email(), aw.id());
            Ok(Json(json!({})))
        }
    }
}

/// Login an account with its password, returning a new token.
pub async fn login_account(
    Json(descriptor): Json<AccountLoginDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let b = super::INSTANCE.inner().read();
    let account = b
        .iter()
        .find(|account| account.read().email() == &descriptor.email)
        .ok_or(ResError(Error::TargetAccountNotFound))?;

    let mut aw = account.write();
    let token = aw.login(&descriptor.password).map_err(ResError)?;
    let role = aw.role().map_err(ResError)?;
    aw.save();

    info!("account {} (id: {}) logged in", aw.email(), aw.id());

    Ok(Json(json!({
        "account_id": aw.id(),
        "token": token,
        "role": role,
    })))
}

/// Logout the requesting account, deactivating its token.
pub async fn logout_account(
    ctx: RequirePermissionContext,
) -> axum::response::Result<Json<serde_json::Value>> {
    let index = *super::INSTANCE
        .index()
        .get(&ctx.account_id)
        .ok_or(ResError(Error::AccountNotFound(ctx.account_id)))?;
    let b = super::INSTANCE.inner().read();
    let mut aw = b
        .get(index)
        .ok_or(ResError(Error::AccountNotFound(ctx.account_id)))?
        .write();

    aw.logout(&ctx.token).map_err(ResError)?;
    aw.save();

    info!("account {} (id: {}) logged out", aw.email(), aw.id());
    Ok(Json(json!({})))
}

/// View the requesting account's own profile.
pub async fn view_account(
    ctx: RequirePermissionContext,
) -> axum::response::Result<Json<ViewAccountResult>> {
    ctx.valid(&[]).map_err(ResError)?;

    let index = *super::INSTANCE
        .index()
        .get(&ctx.account_id)
        .ok_or(ResError(Error::AccountNotFound(ctx.account_id)))?;
    let b = super::INSTANCE.inner().read();
    let ar = b
        .get(index)
        .ok_or(ResError(Error::AccountNotFound(ctx.account_id)))?
        .read();

    match ar.deref() {
        Account::Unverified(_) => Err(ResError(Error::UserUnverified).into()),
        Account::Verified { id, profile, .. } => Ok(Json(ViewAccountResult {
            id: *id,
            metadata: ar.metadata().map_err(ResError)?,
            permissions: ar.permissions(),
            registration_time: profile.registration_time,
        })),
    }
}

/// Edit the requesting account's profile.
pub async fn edit_account(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<AccountEditDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    ctx.valid(&[]).map_err(ResError)?;

    let index = *super::INSTANCE
        .index()
        .get(&ctx.account_id)
        .ok_or(ResError(Error::AccountNotFound(ctx.account_id)))?;
    let b = super::INSTANCE.inner().read();
    let mut aw = b
        .get(index)
        .ok_or(ResError(Error::AccountNotFound(ctx.account_id)))?
        .write();

    for variant in descriptor.variants {
        apply_edit_variant(variant, aw.deref_mut()).map_err(ResError)?;
    }
    aw.save();

    Ok(Json(json!({})))
}

pub(super) fn apply_edit_variant(mt: AccountEditVariant, account: &mut Account) -> Result<(), Error> {
    match account {
        Account::Unverified(_) => return Err(Error::UserUnverified),
        Account::Verified { profile, .. } => match mt {
            AccountEditVariant::FirstName(name) => {
                if name.trim().is_empty() {
                    return Err(Error::FieldEmpty("first name"));
                }
                profile.first_name = name
            }
            AccountEditVariant::LastName(name) => {
                if name.trim().is_empty() {
                    return Err(Error::FieldEmpty("last name"));
                }
                profile.last_name = name
            }
            AccountEditVariant::Password { old, new } => {
                if profile.password_sha != digest(old) {
                    return Err(Error::PasswordIncorrect);
                }
                if new.is_empty() {
                    return Err(Error::FieldEmpty("password"));
                }
                profile.password_sha = digest(new)
            }
        },
    }
    Ok(())
}

/// Request a verification code for resetting a forgotten password.
pub async fn reset_password(
    Json(descriptor): Json<ResetPasswordDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let id = {
        let b = super::INSTANCE.inner().read();
        let account = b
            .iter()
            .find(|account| account.read().email() == &descriptor.email)
            .ok_or(ResError(Error::TargetAccountNotFound))?;
        let ar = account.read();
        match ar.deref() {
            Account::Unverified(_) => return Err(ResError(Error::UserUnverified).into()),
            Account::Verified { id, verify, .. } => {
                if !matches!(verify, UserVerifyVariant::None) {
                    return Err(ResError(Error::UnderVerification).into());
                }
                *id
            }
        }
    };

    let cxt = verify::Context::new(descriptor.email).map_err(ResError)?;
    cxt.send_verify().await.map_err(ResError)?;

    let index = *super::INSTANCE
        .index()
        .get(&id)
        .ok_or(ResError(Error::AccountNotFound(id)))?;
    let b = super::INSTANCE.inner().read();
    let mut aw = b
        .get(index)
        .ok_or(ResError(Error::AccountNotFound(id)))?
        .write();
    if let Account::Verified { verify, .. } = aw.deref_mut() {
        *verify = UserVerifyVariant::ForgetPassword(cxt);
    }
    aw.save();

    info!("password reset requested for {}", aw.email());
    Ok(Json(json!({})))
}

pub mod manage {
    use crate::account::{self, Account, Error};
    use crate::{RequirePermissionContext, ResError};
    use axum::Json;
    use serde_json::json;
    use std::ops::{Deref, DerefMut};
    use tracing::info;

    use cira_shared::account::handle::manage::*;
    use cira_shared::account::{Permission, RequestedRole, Role};

    /// List the accounts with a pending role upgrade request.
    pub async fn role_requests(
        ctx: RequirePermissionContext,
    ) -> axum::response::Result<Json<serde_json::Value>> {
        ctx.valid(&[Permission::ManageRoles]).map_err(ResError)?;

        let b = account::INSTANCE.inner().read();
        let mut requests = Vec::new();
        for account in b.iter() {
            let ar = account.read();
            if let Account::Verified { id, profile, .. } = ar.deref() {
                if let Some(requested_role) = profile.requested_role {
                    requests.push(RoleRequestEntry {
                        account_id: *id,
                        email: profile.email.clone(),
                        first_name: profile.first_name.clone(),
                        last_name: profile.last_name.clone(),
                        student_id: profile.student_id.clone(),
                        requested_role,
                    });
                }
            }
        }

        Ok(Json(json!({ "requests": requests })))
    }

    /// Decide on a pending role upgrade request. Approving grants the
    /// requested role, and either way the request is cleared.
    pub async fn review_role(
        ctx: RequirePermissionContext,
        Json(descriptor): Json<ReviewRoleDescriptor>,
    ) -> axum::response::Result<Json<serde_json::Value>> {
        ctx.valid(&[Permission::ManageRoles]).map_err(ResError)?;

        let index = *account::INSTANCE
            .index()
            .get(&descriptor.account_id)
            .ok_or(ResError(Error::AccountNotFound(descriptor.account_id)))?;
        let b = account::INSTANCE.inner().read();
        let mut aw = b
            .get(index)
            .ok_or(ResError(Error::AccountNotFound(descriptor.account_id)))?
            .write();

        match aw.deref_mut() {
            Account::Unverified(_) => return Err(ResError(Error::UserUnverified).into()),
            Account::Verified { profile, .. } => {
                let Some(requested) = profile.requested_role.take() else {
                    return Err(ResError(Error::NoPendingRoleRequest).into());
                };
                if matches!(descriptor.variant, ReviewRoleVariant::Approve) {
                    profile.role = match requested {
                        RequestedRole::ClassRepresentative => Role::ClassRepresentative,
                    };
                }
            }
        }
        aw.save();

        info!(
            "role request of account {} {}",
            descriptor.account_id,
            match descriptor.variant {
                ReviewRoleVariant::Approve => "approved",
                ReviewRoleVariant::Reject => "rejected",
            }
        );

        Ok(Json(json!({})))
    }
}
