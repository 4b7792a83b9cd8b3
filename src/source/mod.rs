//! Where the event stream comes from.
//!
//! The capture agent writes newline-delimited JSON. It can be piped in on
//! stdin, replayed from a capture file, or read from a TCP endpoint that
//! streams the same lines.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;

/// A boxed byte stream of event lines.
pub type EventReader = Box<dyn AsyncRead + Unpin + Send>;

/// Ingest input selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    /// A capture file, read once from start to end.
    File(PathBuf),
    /// A TCP endpoint (`host:port`) streaming event lines.
    Tcp(String),
}

impl InputSource {
    /// Pick a source from the `--input` and `--connect` flags.
    ///
    /// `--connect` wins; `-` or no `--input` means stdin.
    ///
    /// ```
    /// use nettopo::InputSource;
    ///
    /// assert_eq!(InputSource::from_args(None, None), InputSource::Stdin);
    /// assert_eq!(InputSource::from_args(Some("-"), None), InputSource::Stdin);
    /// assert_eq!(
    ///     InputSource::from_args(None, Some("capture-host:9000")),
    ///     InputSource::Tcp("capture-host:9000".to_string())
    /// );
    /// ```
    pub fn from_args(input: Option<&str>, connect: Option<&str>) -> Self {
        match (connect, input) {
            (Some(addr), _) => InputSource::Tcp(addr.to_string()),
            (None, None) | (None, Some("-")) => InputSource::Stdin,
            (None, Some(path)) => InputSource::File(PathBuf::from(path)),
        }
    }

    /// Open the stream.
    pub async fn open(&self) -> Result<EventReader> {
        match self {
            InputSource::Stdin => Ok(Box::new(tokio::io::stdin())),
            InputSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open capture file {}", path.display()))?;
                Ok(Box::new(file))
            }
            InputSource::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr)
                    .await
                    .with_context(|| format!("failed to connect to {addr}"))?;
                Ok(Box::new(stream))
            }
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => write!(f, "stdin"),
            InputSource::File(path) => write!(f, "file: {}", path.display()),
            InputSource::Tcp(addr) => write!(f, "tcp: {addr}"),
        }
    }
}
