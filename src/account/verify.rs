use rand::Rng;
use serde::{Deserialize, Serialize};

#[cfg(not(test))]
use once_cell::sync::Lazy;

#[cfg(not(test))]
static SENDER_INSTANCE: Lazy<CodeSender> = Lazy::new(CodeSender::from_config);

/// The verification code of the last dispatch, for tests to read
/// back what a real deployment would have mailed out.
#[cfg(test)]
pub static VERIFICATION_CODE: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

/// Represent the verify info of an account.
#[derive(Serialize, Deserialize, Debug)]
pub struct Context {
    /// The email address.
    pub email: lettre::Address,
    /// The pending verification code with 6 digits.
    pub code: u32,
    /// The expire time of this context.
    pub expire_time: chrono::NaiveDateTime,
}

impl Context {
    /// Create a context for the target address with a fresh 6-digit
    /// code, expiring in 15 minutes.
    pub fn new(email: lettre::Address) -> Result<Self, super::Error> {
        Ok(Self {
            email,
            code: rand::thread_rng().gen_range(100000..999999),
            expire_time: match chrono::Utc::now()
                .naive_utc()
                .checked_add_signed(chrono::Duration::minutes(15))
            {
                Some(time) => time,
                _ => return Err(super::Error::DateOutOfRange),
            },
        })
    }

    /// Dispatch the verification code of this context.
    pub async fn send_verify(&self) -> Result<(), super::Error> {
        #[cfg(not(test))]
        SENDER_INSTANCE.send(self).await?;

        #[cfg(test)]
        VERIFICATION_CODE.store(self.code, std::sync::atomic::Ordering::Relaxed);

        tracing::info!("verification code for {} dispatched", self.email);
        Ok(())
    }

    /// Whether this context was expired.
    pub fn is_expired(&self) -> bool {
        self.expire_time <= chrono::Utc::now().naive_utc()
    }
}

/// The delivery channel for verification codes, picked once at
/// startup from the configuration.
#[cfg(not(test))]
enum CodeSender {
    Smtp(crate::config::MailSmtp),
    /// Writes the code to the log instead of mailing it. A
    /// development fallback, not for real deployments.
    Console,
}

#[cfg(not(test))]
impl CodeSender {
    fn from_config() -> Self {
        match &crate::config::INSTANCE.mail_smtp {
            Some(smtp) => Self::Smtp(smtp.clone()),
            None => {
                tracing::warn!(
                    "no [mail_smtp] section configured, verification codes will be logged here"
                );
                Self::Console
            }
        }
    }

    async fn send(&self, cxt: &Context) -> Result<(), super::Error> {
        match self {
            Self::Smtp(smtp) => {
                use lettre::transport::smtp::authentication::Credentials;
                use lettre::AsyncTransport;

                let message = lettre::Message::builder()
                    .from(lettre::message::Mailbox::new(
                        smtp.sender_name.clone(),
                        smtp.address.clone(),
                    ))
                    .to(lettre::message::Mailbox::new(None, cxt.email.clone()))
                    .subject("Your verification code")
                    .body(format!(
                        "Your verification code is {}, expiring in 15 minutes.",
                        cxt.code
                    ))
                    .map_err(super::Error::Mail)?;

                let sender: lettre::AsyncSmtpTransport<lettre::Tokio1Executor> =
                    lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(&smtp.server)
                        .map_err(super::Error::Smtp)?
                        .credentials(Credentials::new(
                            smtp.username.clone(),
                            smtp.password.clone(),
                        ))
                        .port(smtp.port)
                        .build();

                sender.send(message).await.map_err(super::Error::Smtp)?;
                Ok(())
            }
            Self::Console => {
                tracing::warn!("verification code for {}: {}", cxt.email, cxt.code);
                Ok(())
            }
        }
    }
}

/// A simple token manager.
#[derive(Serialize, Deserialize, Debug)]
pub struct Tokens {
    inner: Vec<(Option<chrono::NaiveDateTime>, String)>,
}

impl Tokens {
    /// Max count of active tokens an account can hold. When it is
    /// reached the oldest token is dropped.
    const MAX_ACTIVE: usize = 16;

    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Create a new token for the target account.
    #[must_use = "the token can't be regained"]
    pub fn new_token(&mut self, id: u64, expire_days: u16) -> String {
        let expire_time = if expire_days == 0 {
            None
        } else {
            Some(chrono::Utc::now().naive_utc() + chrono::Days::new(expire_days as u64))
        };
        let token = sha256::digest(format!("{id}-{expire_time:?}-{}", rand::random::<u64>()));
        if self.inner.len() >= Self::MAX_ACTIVE {
            self.inner.remove(0);
        }
        self.inner.push((expire_time, token.clone()));
        token
    }

    /// Remove the target token, returning whether it existed.
    pub fn remove(&mut self, token: &str) -> bool {
        let len = self.inner.len();
        self.inner.retain(|(_, value)| value != token);
        len > self.inner.len()
    }

    /// Whether the target token is usable.
    pub fn token_usable(&self, token: &str) -> bool {
        let now = chrono::Utc::now().naive_utc();
        self.inner
            .iter()
            .filter(|(expire_time, _)| expire_time.map_or(true, |time| time > now))
            .any(|(_, value)| value == token)
    }

    /// Drop the expired tokens of this instance.
    pub fn refresh(&mut self) {
        let now = chrono::Utc::now().naive_utc();
        self.inner
            .retain(|(expire_time, _)| expire_time.map_or(true, |time| time > now));
    }
}
