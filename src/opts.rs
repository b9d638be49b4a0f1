use crate::error::{Error, Result};

/// Connection options for one delegate database.
///
/// Parsed from a `mysql://` URL:
///
/// ```text
/// mysql://host[:port]/schema
/// mysql://localhost:3307/shard_0
/// ```
///
/// The schema (database) name is mandatory: it is what the proxy substitutes
/// into the client's handshake response for this delegate. Credentials in the
/// URL are ignored; authentication is passed through from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateOpts {
    /// Hostname or IP address
    pub host: String,

    /// Port number for the MySQL server
    pub port: u16,

    /// Unix socket path; takes precedence over host/port when set
    pub socket: Option<String>,

    /// Database name on this delegate
    pub schema: String,

    /// Enable TCP_NODELAY to disable Nagle's algorithm
    pub tcp_nodelay: bool,
}

impl DelegateOpts {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<&str> for DelegateOpts {
    type Error = Error;

    fn try_from(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::BadConfig(format!("failed to parse delegate URL: {}", e)))?;

        if parsed.scheme() != "mysql" {
            return Err(Error::BadConfig(format!(
                "invalid URL scheme '{}', expected 'mysql'",
                parsed.scheme()
            )));
        }

        let host = parsed.host_str().unwrap_or_default().to_string();
        let port = parsed.port().unwrap_or(3306);

        let socket = parsed
            .query_pairs()
            .find(|(key, _)| key == "socket")
            .map(|(_, value)| value.into_owned());

        if host.is_empty() && socket.is_none() {
            return Err(Error::BadConfig(format!(
                "delegate URL '{}' has neither host nor socket",
                url
            )));
        }

        let schema = parsed
            .path()
            .strip_prefix('/')
            .filter(|schema| !schema.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::BadConfig(format!(
                    "delegate URL '{}' is missing the database name",
                    url
                ))
            })?;

        Ok(Self {
            host,
            port,
            socket,
            schema,
            tcp_nodelay: true,
        })
    }
}
