use once_cell::sync::Lazy;
use serde::Deserialize;

/// The static config instance, deserialized from `./data/config.toml`.
pub static INSTANCE: Lazy<Config> = Lazy::new(|| {
    #[cfg(not(test))]
    {
        use std::{fs::File, io::Read};

        return toml::from_str(&{
            let mut string = String::new();
            File::open("./data/config.toml")
                .expect("config file ./data/config.toml not found")
                .read_to_string(&mut string)
                .unwrap();
            string
        })
        .unwrap();
    }

    #[cfg(test)]
    Config::default()
});

/// Describing this server's configuration.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub institution: Institution,
    /// SMTP delivery for verification mails. When this section is
    /// absent the codes are written to the log instead.
    pub mail_smtp: Option<MailSmtp>,
    /// The initial admin account, seeded on startup when no admin
    /// exists yet.
    pub bootstrap: Option<Bootstrap>,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Server {
    pub address: String,
    pub port: u16,
}

impl Server {
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(
            self.address
                .parse()
                .expect("server address in config is not an ip address"),
            self.port,
        )
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Institution {
    /// The mail domain accounts have to sign up with.
    pub email_domain: String,
}

impl Default for Institution {
    fn default() -> Self {
        Self {
            email_domain: "plv.edu.ph".to_string(),
        }
    }
}

/// Describing the mailing configuration.
#[derive(Deserialize, Clone)]
pub struct MailSmtp {
    pub server: String,
    pub port: u16,
    pub address: lettre::Address,
    pub username: String,
    pub password: String,
    /// Display name on outgoing mails.
    pub sender_name: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct Bootstrap {
    pub email: lettre::Address,
    pub password: String,
}
