pub(crate) mod attachment;
pub mod handle;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::ops::Deref;

pub use cira_shared::ticket::*;

/// The static instance of tickets.
pub static INSTANCE: Lazy<TicketManager> = Lazy::new(TicketManager::new);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("attachment error: {0}")]
    Attachment(attachment::Error),
    #[error("ticket id conflicted")]
    Conflict,
    #[error("ticket not found")]
    NotFound,
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("cannot review your own ticket")]
    SelfReview,
    #[error("ticket can only be edited while pending, it is {0} now")]
    NotEditable(TicketStatus),
    #[error("{0} must not be empty")]
    FieldEmpty(&'static str),
}

impl crate::AsResCode for Error {
    fn response_code(&self) -> hyper::StatusCode {
        match self {
            Error::Attachment(err) => err.response_code(),
            Error::Conflict => hyper::StatusCode::CONFLICT,
            Error::NotFound => hyper::StatusCode::NOT_FOUND,
            Error::FieldEmpty(_) => hyper::StatusCode::BAD_REQUEST,
            _ => hyper::StatusCode::FORBIDDEN,
        }
    }
}

/// Save the target ticket to the file system.
pub fn save_ticket(ticket: &Ticket) {
    #[cfg(not(test))]
    {
        let id = ticket.id;
        let string = toml::to_string(ticket);
        tokio::spawn(async move {
            if let Ok(string) = string {
                let _ = tokio::fs::write(format!("./data/tickets/{id}.toml"), string).await;
            }
        });
    }

    #[cfg(test)]
    let _ = ticket;
}

fn remove_ticket_file(id: u64) {
    #[cfg(not(test))]
    tokio::spawn(async move {
        let _ = tokio::fs::remove_file(format!("./data/tickets/{id}.toml")).await;
    });

    #[cfg(test)]
    let _ = id;
}

/// A simple ticket manager.
pub struct TicketManager {
    pub tickets: RwLock<Vec<RwLock<Ticket>>>,
}

impl TicketManager {
    /// Read all tickets from `./data/tickets`. Unreadable records are
    /// skipped so one corrupt file cannot take the store down.
    pub fn new() -> Self {
        #[cfg(not(test))]
        {
            let mut vec = Vec::new();
            match std::fs::read_dir("./data/tickets") {
                Ok(dir) => {
                    for entry in dir.flatten() {
                        let parsed: Result<Ticket, _> = std::fs::read_to_string(entry.path())
                            .map_err(|err| err.to_string())
                            .and_then(|string| {
                                toml::from_str(&string).map_err(|err| err.to_string())
                            });
                        match parsed {
                            Ok(ticket) => vec.push(RwLock::new(ticket)),
                            Err(err) => tracing::warn!(
                                "skipping unreadable ticket record {}: {err}",
                                entry.path().display()
                            ),
                        }
                    }
                }
                Err(_) => tracing::warn!("ticket store missing or unreadable, starting empty"),
            }

            Self {
                tickets: RwLock::new(vec),
            }
        }

        #[cfg(test)]
        Self {
            tickets: RwLock::new(Vec::new()),
        }
    }

    pub fn push(&self, ticket: Ticket) {
        self.tickets.write().push(RwLock::new(ticket));
    }

    /// Indicates if the target id is already contained in this
    /// instance.
    pub fn contains_id(&self, id: u64) -> bool {
        self.tickets.read().iter().any(|ticket| ticket.read().id == id)
    }

    /// Merge changes into the target ticket, refreshing its update
    /// time and saving it. Does nothing and returns `false` when the
    /// id is absent.
    pub fn update(&self, id: u64, f: impl FnOnce(&mut Ticket)) -> bool {
        let b = self.tickets.read();
        match b.iter().find(|ticket| ticket.read().id == id) {
            Some(ticket) => {
                let mut tw = ticket.write();
                f(&mut tw);
                tw.touch();
                save_ticket(tw.deref());
                true
            }
            None => false,
        }
    }

    /// Remove the target ticket, releasing its attachment when no
    /// other ticket references it. Returns `false` when the id is
    /// absent.
    pub fn delete(&self, id: u64) -> bool {
        let image = {
            let mut w = self.tickets.write();
            let Some(index) = w.iter().position(|ticket| ticket.read().id == id) else {
                return false;
            };
            let removed = w.remove(index);
            remove_ticket_file(id);

            let image = removed.read().image;
            image.filter(|hash| {
                !w.iter().any(|ticket| ticket.read().image == Some(*hash))
            })
        };

        if let Some(hash) = image {
            attachment::INSTANCE.unpin(hash);
        }
        true
    }

    /// Whether any ticket references the target attachment.
    pub fn references_image(&self, hash: u64) -> bool {
        self.tickets
            .read()
            .iter()
            .any(|ticket| ticket.read().image == Some(hash))
    }

    /// Reset this instance for testing purposes.
    #[cfg(test)]
    pub fn reset(&self) {
        self.tickets.write().clear();
    }
}
