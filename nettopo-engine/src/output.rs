//! Output sinks for update messages.

use std::path::PathBuf;
use std::sync::Arc;

use nettopo_types::UpdateMessage;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::error::OutputError;

/// Where forwarded updates go.
///
/// Every sink writes one JSON message per line.
#[derive(Debug, Clone)]
pub enum Output {
    /// Write updates to standard output.
    Stdout,

    /// Append updates to a file, creating it if needed.
    File(PathBuf),

    /// Send each update to a TCP server over a fresh connection.
    ///
    /// Best effort: a failed connect is reported and the update is lost.
    Tcp(String),

    /// Hand updates to a caller-owned channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<Arc<UpdateMessage>>),
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use nettopo_engine::Output;
    ///
    /// let output = Output::file("updates.ndjson");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a TCP output.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use nettopo_engine::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // while let Some(update) = rx.recv().await {
    /// //     println!("{}", update.kind());
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<UpdateMessage>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Short name used in log records.
    pub fn describe(&self) -> String {
        match self {
            Output::Stdout => "stdout".to_string(),
            Output::File(path) => format!("file {}", path.display()),
            Output::Tcp(addr) => format!("tcp {addr}"),
            Output::Channel(_) => "channel".to_string(),
        }
    }

    /// Write one update to this output.
    pub async fn emit(&self, update: &Arc<UpdateMessage>) -> Result<(), OutputError> {
        match self {
            Output::Stdout => {
                let line = encode(update)?;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(line.as_bytes()).await?;
                stdout.flush().await?;
            }
            Output::File(path) => {
                let line = encode(update)?;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(line.as_bytes()).await?;
                file.flush().await?;
            }
            Output::Tcp(addr) => {
                let line = encode(update)?;
                let mut stream = tokio::net::TcpStream::connect(addr).await?;
                stream.write_all(line.as_bytes()).await?;
                stream.shutdown().await?;
            }
            Output::Channel(tx) => {
                // Don't wait on a full channel
                tx.try_send(update.clone()).map_err(|err| match err {
                    mpsc::error::TrySendError::Full(_) => OutputError::Full,
                    mpsc::error::TrySendError::Closed(_) => OutputError::Closed,
                })?;
            }
        }
        Ok(())
    }
}

fn encode(update: &UpdateMessage) -> Result<String, OutputError> {
    let mut line = serde_json::to_string(update)?;
    line.push('\n');
    Ok(line)
}
