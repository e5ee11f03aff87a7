//! Connection and server options.

use std::sync::Arc;

use url::Url;

use crate::buffer_pool::{BufferPool, GLOBAL_BUFFER_POOL};
use crate::error::Error;
use crate::protocol::types::{FetchMode, MAX_BATCH_SIZE};

/// Default port for both client and server.
pub const DEFAULT_PORT: u16 = 9092;

/// Options shared by the clients and the servers.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `""`
    pub host: String,

    /// Port number.
    ///
    /// Default: `9092`
    pub port: u16,

    /// Session default fetch mode: lazy (`true`) or eager (`false`).
    ///
    /// Default: `false`
    pub lazy_query_execution: bool,

    /// Client: batch size used by `Conn::query_collect` and `Conn::query_iter`,
    /// at most `i32::MAX`.
    ///
    /// Default: `100`
    pub fetch_size: u32,

    /// Server: maximum open cursors per session (None = unlimited).
    ///
    /// Default: `None`
    pub max_cursors: Option<usize>,

    /// Server: maximum number of concurrent connections (None = unlimited).
    ///
    /// Default: `None`
    pub max_connections: Option<usize>,

    /// Largest message payload accepted from the peer.
    ///
    /// Default: `16 MiB`
    pub max_message_size: usize,

    /// Pool the connection buffers are drawn from.
    ///
    /// Default: the global pool
    pub buffer_pool: Arc<BufferPool>,
}

impl Opts {
    /// Session default fetch mode.
    pub fn fetch_mode(&self) -> FetchMode {
        FetchMode::from_lazy(self.lazy_query_execution)
    }

    /// `host:port` for binding or connecting.
    pub fn addr(&self) -> String {
        let host = if self.host.is_empty() {
            "localhost"
        } else {
            self.host.as_str()
        };
        format!("{}:{}", host, self.port)
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            lazy_query_execution: false,
            fetch_size: 100,
            max_cursors: None,
            max_connections: None,
            max_message_size: 16 << 20,
            buffer_pool: Arc::clone(&GLOBAL_BUFFER_POOL),
        }
    }
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(
    key: &str,
    value: &str,
) -> Result<T, Error> {
    match value.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(Error::InvalidUsage(format!(
            "Invalid {}: expected a positive integer, got {}",
            key, value
        ))),
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a connection URL.
    ///
    /// Format: `zcursor://host[:port][?param1=value1&param2=value2&..]`
    ///
    /// Supported query parameters:
    /// - `lazy_query_execution`: true/True/1/yes/on or false/False/0/no/off
    /// - `fetch_size`: positive integer
    /// - `max_cursors`: positive integer
    /// - `max_connections`: positive integer
    /// - `max_message_size`: positive integer (bytes)
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if url.scheme() != "zcursor" {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'zcursor://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "lazy_query_execution" => {
                    opts.lazy_query_execution = match value.as_ref() {
                        "true" | "True" | "1" | "yes" | "on" => true,
                        "false" | "False" | "0" | "no" | "off" => false,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid lazy_query_execution: {}",
                                value
                            )));
                        }
                    };
                }
                "fetch_size" => {
                    opts.fetch_size = parse_positive(&key, &value)?;
                    if opts.fetch_size > MAX_BATCH_SIZE {
                        return Err(Error::InvalidUsage(format!(
                            "Invalid fetch_size: at most {}, got {}",
                            MAX_BATCH_SIZE, value
                        )));
                    }
                }
                "max_cursors" => {
                    opts.max_cursors = Some(parse_positive(&key, &value)?);
                }
                "max_connections" => {
                    opts.max_connections = Some(parse_positive(&key, &value)?);
                }
                "max_message_size" => {
                    opts.max_message_size = parse_positive(&key, &value)?;
                }
                _ => {
                    return Err(Error::InvalidUsage(format!(
                        "Unknown connection parameter: {}",
                        key
                    )));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Opts::default();
        assert_eq!(opts.port, 9092);
        assert_eq!(opts.fetch_size, 100);
        assert_eq!(opts.fetch_mode(), FetchMode::Eager);
        assert_eq!(opts.max_message_size, 16 * 1024 * 1024);
        assert_eq!(opts.addr(), "localhost:9092");
    }

    #[test]
    fn test_url() {
        let opts = Opts::try_from(
            "zcursor://db.local:7000?lazy_query_execution=on&fetch_size=7&max_cursors=3",
        )
        .unwrap();
        assert_eq!(opts.host, "db.local");
        assert_eq!(opts.port, 7000);
        assert!(opts.lazy_query_execution);
        assert_eq!(opts.fetch_mode(), FetchMode::Lazy);
        assert_eq!(opts.fetch_size, 7);
        assert_eq!(opts.max_cursors, Some(3));
        assert_eq!(opts.max_connections, None);
    }

    #[test]
    fn test_url_errors() {
        assert!(matches!(
            Opts::try_from("postgres://localhost"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            Opts::try_from("zcursor://localhost?fetch_size=0"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            Opts::try_from("zcursor://localhost?lazy_query_execution=maybe"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            Opts::try_from("zcursor://localhost?sslmode=require"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            Opts::try_from("zcursor://localhost?fetch_size=3000000000"),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(Opts::try_from("not a url"), Err(Error::InvalidUsage(_))));
    }
}
