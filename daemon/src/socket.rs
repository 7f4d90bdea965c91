//! Unix socket server for IPC

use crate::monitor::MonitorEvent;
use crate::protocol::{Request, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

pub struct SocketServer {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketServer {
    pub async fn bind(path: &Path) -> std::io::Result<Self> {
        remove_stale_socket(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        info!("Socket server listening on {:?}", path);
        Ok(Self { path: path.to_path_buf(), listener })
    }

    pub async fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn socket_path() -> PathBuf {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{}/wifiscope.sock", uid))
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        remove_stale_socket(&self.path);
    }
}

fn remove_stale_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove socket {:?}: {}", path, e),
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response).map_err(std::io::Error::other)? + "\n";
    writer.write_all(json.as_bytes()).await
}

/// Serve one client: answer its requests and push every monitor event to it.
/// A client that falls behind skips the events it missed.
pub async fn handle_client<H>(
    stream: UnixStream,
    mut events: broadcast::Receiver<MonitorEvent>,
    handler: Arc<H>,
) where
    H: RequestHandler + Send + Sync + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut subscribed = true;

    loop {
        tokio::select! {
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => break,
                    Ok(_) => {
                        let response = match serde_json::from_str::<Request>(&line) {
                            Ok(request) => handler.handle(request).await,
                            Err(e) => {
                                warn!("Invalid request: {}", e);
                                Response::error(e.to_string())
                            }
                        };
                        if let Err(e) = write_response(&mut writer, &response).await {
                            error!("Failed to write response: {}", e);
                            break;
                        }
                        line.clear();
                    }
                    Err(e) => {
                        error!("Read error: {}", e);
                        break;
                    }
                }
            }
            result = events.recv(), if subscribed => {
                match result {
                    Ok(event) => {
                        if let Err(e) = write_response(&mut writer, &Response::from(event)).await {
                            error!("Failed to broadcast: {}", e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => warn!("Client lagging, dropped {} events", missed),
                    Err(RecvError::Closed) => subscribed = false,
                }
            }
        }
    }
}

#[async_trait::async_trait]
pub trait RequestHandler {
    async fn handle(&self, request: Request) -> Response;
}
