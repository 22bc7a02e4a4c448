use hyper::StatusCode;
use image::DynamicImage;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    ops::DerefMut,
    sync::atomic::{AtomicBool, Ordering},
};

pub static INSTANCE: Lazy<AttachmentManager> = Lazy::new(AttachmentManager::new);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("image error: {0}")]
    Image(image::ImageError),
    #[error("image too large: {0} bytes, max 8MB")]
    ImgTooLarge(usize),
    #[error("attachment not found")]
    NotFound,
    #[error("attachment unreadable: {0}")]
    Io(std::io::Error),
}

impl crate::AsResCode for Error {
    fn response_code(&self) -> StatusCode {
        match self {
            Error::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ImgTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An uploaded ticket image, addressed by the hash of its bytes.
#[derive(Serialize, Deserialize)]
pub struct Attachment {
    pub hash: u64,
    pub uploader: u64,
    /// Indicates if this attachment is referenced by a ticket.
    /// Unreferenced attachments may be evicted.
    pub pinned: AtomicBool,

    /// The decoded image, only kept until the file is persisted.
    #[serde(skip)]
    pub img: RwLock<Option<DynamicImage>>,
}

impl Attachment {
    const MAX_BYTES: usize = 8_000_000;

    /// Create a new attachment and its hash from image bytes.
    pub fn new(bytes: &[u8], uploader: u64) -> Result<Self, Error> {
        {
            let len = bytes.len();
            if len > Self::MAX_BYTES {
                return Err(Error::ImgTooLarge(len));
            }
        }

        let image = image::load_from_memory(bytes).map_err(Error::Image)?;

        let hash = {
            let mut hasher = DefaultHasher::new();
            bytes.hash(&mut hasher);
            hasher.finish()
        };

        Ok(Self {
            hash,
            uploader,
            pinned: AtomicBool::new(false),
            img: RwLock::new(Some(image)),
        })
    }

    fn save(&self) {
        #[cfg(not(test))]
        {
            let this = Self {
                hash: self.hash,
                uploader: self.uploader,
                pinned: AtomicBool::new(self.pinned.load(Ordering::Acquire)),
                img: RwLock::new(self.img.write().take()),
            };

            tokio::spawn(async move {
                if let Some(img) = this.img.read().as_ref() {
                    if let Err(err) = img.save_with_format(
                        format!("./data/images/{}.png", this.hash),
                        image::ImageFormat::Png,
                    ) {
                        tracing::warn!("failed to persist attachment {}: {err}", this.hash);
                        return;
                    }
                }
                *this.img.write().deref_mut() = None;

                if let Ok(string) = toml::to_string(&this) {
                    let _ = tokio::fs::write(
                        format!("./data/images/{}.toml", this.hash),
                        string,
                    )
                    .await;
                }
            });
        }

        #[cfg(test)]
        {
            *self.img.write().deref_mut() = None;
        }
    }
}

/// A simple attachment manager.
pub struct AttachmentManager {
    pub caches: RwLock<Vec<Attachment>>,
}

impl AttachmentManager {
    /// Max count of unpinned attachments kept around. When it is
    /// reached the oldest unpinned one is evicted.
    const MAX_UNPINNED: usize = 64;

    /// Read all attachment records from `./data/images`.
    pub fn new() -> Self {
        #[cfg(not(test))]
        {
            let mut vec = Vec::new();
            if let Ok(dir) = std::fs::read_dir("./data/images") {
                for entry in dir.flatten() {
                    if entry.path().extension().is_some_and(|ext| ext == "toml") {
                        match std::fs::read_to_string(entry.path())
                            .map_err(|err| err.to_string())
                            .and_then(|string| {
                                toml::from_str::<Attachment>(&string).map_err(|err| err.to_string())
                            }) {
                            Ok(attachment) => vec.push(attachment),
                            Err(err) => tracing::warn!(
                                "skipping unreadable attachment record {}: {err}",
                                entry.path().display()
                            ),
                        }
                    }
                }
            }
            Self {
                caches: RwLock::new(vec),
            }
        }

        #[cfg(test)]
        Self {
            caches: RwLock::new(Vec::new()),
        }
    }

    /// Push and save an attachment, evicting an unpinned one when
    /// the cap is reached.
    pub fn push(&self, attachment: Attachment) {
        let cr = self.caches.read();

        if cr.iter().any(|e| e.hash == attachment.hash) {
            return;
        }

        let unpinned = cr
            .iter()
            .filter(|e| !e.pinned.load(Ordering::Acquire))
            .count();
        if unpinned >= Self::MAX_UNPINNED {
            if let Some((index, evicted)) = cr
                .iter()
                .enumerate()
                .find(|(_, e)| !e.pinned.load(Ordering::Acquire))
            {
                let _ = std::fs::remove_file(format!("./data/images/{}.png", evicted.hash));
                let _ = std::fs::remove_file(format!("./data/images/{}.toml", evicted.hash));
                drop(cr);
                self.caches.write().remove(index);
            } else {
                drop(cr);
            }
        } else {
            drop(cr);
        }

        attachment.save();
        self.caches.write().push(attachment);
    }

    /// Indicates if the target hash is contained in this instance.
    pub fn contains(&self, hash: u64) -> bool {
        self.caches.read().iter().any(|e| e.hash == hash)
    }

    /// Mark the target attachment as referenced by a ticket.
    pub fn pin(&self, hash: u64) -> Result<(), Error> {
        let cr = self.caches.read();
        match cr.iter().find(|e| e.hash == hash) {
            Some(attachment) => {
                attachment.pinned.store(true, Ordering::Release);
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    /// Drop the ticket reference mark of the target attachment.
    pub fn unpin(&self, hash: u64) {
        let cr = self.caches.read();
        if let Some(attachment) = cr.iter().find(|e| e.hash == hash) {
            attachment.pinned.store(false, Ordering::Release);
        }
    }

    #[cfg(test)]
    pub fn reset(&self) {
        *self.caches.write().deref_mut() = Vec::new();
    }
}
