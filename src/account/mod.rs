pub mod handle;
pub mod verify;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha256::digest;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

pub use cira_shared::account::*;

/// The static instance of accounts.
pub static INSTANCE: Lazy<AccountManager> = Lazy::new(AccountManager::new);

/// The accepted student id format, two digits, a hyphen, four digits.
static STUDENT_ID_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{4}$").unwrap());

pub fn validate_student_id(student_id: &str) -> Result<(), Error> {
    if STUDENT_ID_FORMAT.is_match(student_id) {
        Ok(())
    } else {
        Err(Error::InvalidStudentId(student_id.to_string()))
    }
}

pub(crate) fn email_to_id(email: &lettre::Address) -> u64 {
    let mut hasher = DefaultHasher::new();
    email.hash(&mut hasher);
    hasher.finish()
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("verification code not match")]
    VerificationCode,
    #[error("user has not been verified")]
    UserUnverified,
    #[error("user already registered")]
    UserRegistered,
    #[error("password incorrect")]
    PasswordIncorrect,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("token incorrect")]
    TokenIncorrect,
    #[error("email domain is not the institution's domain")]
    EmailDomainNotInstitution,
    #[error("student id {0:?} is not in the XX-XXXX format")]
    InvalidStudentId(String),
    #[error("{0} must not be empty")]
    FieldEmpty(&'static str),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("permission denied")]
    PermissionDenied,
    #[error("account {0} not found")]
    AccountNotFound(u64),
    #[error("target account not found")]
    TargetAccountNotFound,
    #[error("target account is already under verification")]
    UnderVerification,
    #[error("no pending role request for this account")]
    NoPendingRoleRequest,
    #[error("date out of range")]
    DateOutOfRange,
    #[error("mail message error: {0}")]
    Mail(lettre::error::Error),
    #[error("error sending verification mail: {0}")]
    Smtp(lettre::transport::smtp::Error),
}

impl crate::AsResCode for Error {
    fn response_code(&self) -> hyper::StatusCode {
        match self {
            Error::AccountNotFound(_) | Error::TargetAccountNotFound => {
                hyper::StatusCode::NOT_FOUND
            }
            Error::UserRegistered | Error::UnderVerification => hyper::StatusCode::CONFLICT,
            Error::NotLoggedIn | Error::TokenIncorrect => hyper::StatusCode::UNAUTHORIZED,
            Error::PasswordMismatch
            | Error::EmailDomainNotInstitution
            | Error::InvalidStudentId(_)
            | Error::FieldEmpty(_) => hyper::StatusCode::BAD_REQUEST,
            Error::DateOutOfRange | Error::Mail(_) | Error::Smtp(_) => {
                hyper::StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => hyper::StatusCode::FORBIDDEN,
        }
    }
}

/// Represent an account, including unverified and verified.
#[derive(Serialize, Deserialize, Debug)]
pub enum Account {
    /// An unverified account waiting for its signup code.
    Unverified(verify::Context),

    /// A verified account.
    Verified {
        /// Identifier of this user.
        id: u64,
        /// Profile of this user.
        profile: UserProfile,
        /// This account's token manager.
        tokens: verify::Tokens,
        /// The verify context of this account, exists in some
        /// conditions (ex. forgot password).
        verify: UserVerifyVariant,
    },
}

/// Profile of a verified user.
#[derive(Serialize, Deserialize, Debug)]
pub struct UserProfile {
    /// Email address of this user.
    pub email: lettre::Address,
    pub first_name: String,
    pub last_name: String,
    /// Student id of this user, in the `XX-XXXX` format.
    pub student_id: String,
    /// Role of this user.
    pub role: Role,
    /// A pending role upgrade request, cleared when an admin
    /// decides on it.
    pub requested_role: Option<RequestedRole>,
    /// The registration time of this user.
    pub registration_time: DateTime<Utc>,
    /// Hash of this user's password.
    pub password_sha: String,
    /// The expiration time of a token in days. `0` means never expire.
    pub token_expiration_time: u16,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum UserVerifyVariant {
    None,
    ForgetPassword(verify::Context),
}

pub(crate) enum AccountVerifyVariant {
    /// Activate an unverified account with the profile built from the
    /// signup form.
    Activate(UserProfile),
    /// Reset a forgotten password.
    ResetPassword(String),
}

impl Account {
    /// Create a new unverified account and dispatch a verification
    /// code to the target address.
    pub async fn new(email: lettre::Address) -> Result<Self, Error> {
        if email.domain() != crate::config::INSTANCE.institution.email_domain {
            return Err(Error::EmailDomainNotInstitution);
        }

        let cxt = verify::Context::new(email)?;
        cxt.send_verify().await?;
        Ok(Self::Unverified(cxt))
    }

    fn verify(&mut self, verify_code: u32, variant: AccountVerifyVariant) -> Result<(), Error> {
        match variant {
            AccountVerifyVariant::Activate(profile) => {
                if let Self::Unverified(cxt) = self {
                    if cxt.code != verify_code {
                        return Err(Error::VerificationCode);
                    }
                    *self = Self::Verified {
                        id: email_to_id(&profile.email),
                        profile,
                        tokens: verify::Tokens::new(),
                        verify: UserVerifyVariant::None,
                    };
                    Ok(())
                } else {
                    Err(Error::UserRegistered)
                }
            }
            AccountVerifyVariant::ResetPassword(password) => {
                if let Self::Verified {
                    profile, verify, ..
                } = self
                {
                    match verify {
                        UserVerifyVariant::None => Err(Error::PermissionDenied),
                        UserVerifyVariant::ForgetPassword(cxt) => {
                            if cxt.code != verify_code {
                                return Err(Error::VerificationCode);
                            }
                            profile.password_sha = digest(password);
                            *verify = UserVerifyVariant::None;
                            Ok(())
                        }
                    }
                } else {
                    Err(Error::UserUnverified)
                }
            }
        }
    }

    /// The only id of this account.
    pub fn id(&self) -> u64 {
        match self {
            Account::Unverified(cxt) => email_to_id(&cxt.email),
            Account::Verified { id, .. } => *id,
        }
    }

    pub fn email(&self) -> &lettre::Address {
        match self {
            Account::Unverified(cxt) => &cxt.email,
            Account::Verified { profile, .. } => &profile.email,
        }
    }

    pub fn metadata(&self) -> Result<UserMetadata, Error> {
        if let Self::Verified { profile, .. } = self {
            Ok(UserMetadata {
                email: profile.email.clone(),
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
                student_id: profile.student_id.clone(),
                role: profile.role,
                requested_role: profile.requested_role,
            })
        } else {
            Err(Error::UserUnverified)
        }
    }

    pub fn role(&self) -> Result<Role, Error> {
        if let Self::Verified { profile, .. } = self {
            Ok(profile.role)
        } else {
            Err(Error::UserUnverified)
        }
    }

    pub fn permissions(&self) -> Permissions {
        match self {
            Account::Unverified(_) => Vec::new(),
            Account::Verified { profile, .. } => profile.role.permissions().to_vec(),
        }
    }

    /// Login into the account and return back a new token.
    pub fn login(&mut self, password: &str) -> Result<String, Error> {
        match self {
            Account::Unverified(_) => Err(Error::UserUnverified),
            Account::Verified {
                id,
                profile,
                tokens,
                ..
            } => {
                if profile.password_sha == digest(password.to_string()) {
                    Ok(tokens.new_token(*id, profile.token_expiration_time))
                } else {
                    Err(Error::PasswordIncorrect)
                }
            }
        }
    }

    /// Logout this account with the target token.
    pub fn logout(&mut self, token: &str) -> Result<(), Error> {
        match self {
            Account::Unverified(_) => Err(Error::UserUnverified),
            Account::Verified { tokens, .. } => {
                if tokens.remove(token) {
                    Ok(())
                } else {
                    Err(Error::TokenIncorrect)
                }
            }
        }
    }

    /// Save this account to the file system.
    pub fn save(&self) {
        #[cfg(not(test))]
        {
            let id = self.id();
            let string = toml::to_string(self);
            tokio::spawn(async move {
                if let Ok(string) = string {
                    let _ = tokio::fs::write(format!("./data/users/{id}.toml"), string).await;
                }
            });
        }
    }

    fn remove(&self) {
        #[cfg(not(test))]
        {
            let id = self.id();
            tokio::spawn(async move {
                let _ = tokio::fs::remove_file(format!("./data/users/{id}.toml")).await;
            });
        }
    }
}

/// A simple account manager.
pub struct AccountManager {
    accounts: RwLock<Vec<RwLock<Account>>>,
    /// An index cache for getting the index from an id.
    index: DashMap<u64, usize>,
}

impl AccountManager {
    /// Read all accounts from `./data/users`. Unreadable records are
    /// skipped so one corrupt file cannot take the store down.
    pub fn new() -> Self {
        #[cfg(not(test))]
        {
            let mut vec = Vec::new();
            match std::fs::read_dir("./data/users") {
                Ok(dir) => {
                    for entry in dir.flatten() {
                        let parsed: Result<Account, _> = std::fs::read_to_string(entry.path())
                            .map_err(|err| err.to_string())
                            .and_then(|string| {
                                toml::from_str(&string).map_err(|err| err.to_string())
                            });
                        match parsed {
                            Ok(account) => vec.push(RwLock::new(account)),
                            Err(err) => tracing::warn!(
                                "skipping unreadable account record {}: {err}",
                                entry.path().display()
                            ),
                        }
                    }
                }
                Err(_) => tracing::warn!("account store missing or unreadable, starting empty"),
            }

            let index = DashMap::new();
            for (i, account) in vec.iter().enumerate() {
                index.insert(account.read().id(), i);
            }

            Self {
                accounts: RwLock::new(vec),
                index,
            }
        }

        #[cfg(test)]
        Self {
            accounts: RwLock::new(Vec::new()),
            index: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &RwLock<Vec<RwLock<Account>>> {
        &self.accounts
    }

    pub fn index(&self) -> &DashMap<u64, usize> {
        &self.index
    }

    /// Push an account to this instance and save it.
    pub fn push(&self, account: Account) {
        account.save();
        let mut w = self.accounts.write();
        self.index.insert(account.id(), w.len());
        w.push(RwLock::new(account));
    }

    /// Update the index cache of this instance.
    pub fn update_index(&self) {
        self.index.clear();
        for (i, account) in self.accounts.read().iter().enumerate() {
            self.index.insert(account.read().id(), i);
        }
    }

    /// Refresh all accounts, removing the unverified ones that
    /// expired already.
    pub fn refresh_all(&self) {
        let mut removal = Vec::new();
        {
            let b = self.accounts.read();
            for account in b.iter() {
                let ar = account.read();
                if let Account::Unverified(cxt) = ar.deref() {
                    if cxt.is_expired() {
                        removal.push(ar.id());
                    }
                }
            }
        }
        for id in removal {
            self.remove(id);
        }
    }

    /// Refresh the target account, removing it when it is an expired
    /// unverified account and clearing its expired tokens otherwise.
    pub fn refresh(&self, id: u64) {
        let mut removal = false;
        if let Some(index) = self.index.get(&id).map(|e| *e.value()) {
            let b = self.accounts.read();
            if let Some(account) = b.get(index) {
                let mut aw = account.write();
                match &mut *aw {
                    Account::Unverified(cxt) => {
                        if cxt.is_expired() {
                            removal = true;
                        }
                    }
                    Account::Verified { tokens, verify, .. } => {
                        tokens.refresh();
                        if let UserVerifyVariant::ForgetPassword(cxt) = verify {
                            if cxt.is_expired() {
                                *verify = UserVerifyVariant::None;
                            }
                        }
                    }
                }
            }
        }
        if removal {
            self.remove(id);
        }
    }

    /// Remove the target account from this instance and the file
    /// system.
    pub fn remove(&self, id: u64) {
        if let Some(index) = self.index.get(&id).map(|e| *e.value()) {
            let mut w = self.accounts.write();
            if w.get(index).is_some() {
                w.remove(index).read().remove();
            }
        }
        self.index.remove(&id);
        self.update_index();
    }

    /// Reset this instance for testing purposes.
    #[cfg(test)]
    pub fn reset(&self) {
        self.accounts.write().clear();
        self.index.clear();
    }
}

/// Seed the initial admin account from the `[bootstrap]` config
/// section when no admin exists yet.
pub fn bootstrap_admin() {
    let Some(bootstrap) = crate::config::INSTANCE.bootstrap.as_ref() else {
        return;
    };

    {
        let b = INSTANCE.inner().read();
        if b.iter().any(|account| {
            matches!(
                account.read().deref(),
                Account::Verified { profile, .. } if profile.role == Role::Admin
            )
        }) {
            return;
        }
    }

    let account = Account::Verified {
        id: email_to_id(&bootstrap.email),
        profile: UserProfile {
            email: bootstrap.email.clone(),
            first_name: "Facility".to_string(),
            last_name: "Admin".to_string(),
            student_id: "00-0000".to_string(),
            role: Role::Admin,
            requested_role: None,
            registration_time: Utc::now(),
            password_sha: digest(bootstrap.password.clone()),
            token_expiration_time: 5,
        },
        tokens: verify::Tokens::new(),
        verify: UserVerifyVariant::None,
    };

    tracing::info!("bootstrap admin account {} seeded", account.email());
    INSTANCE.push(account);
}
