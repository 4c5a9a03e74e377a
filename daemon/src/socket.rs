//! Unix socket server for IPC

use crate::protocol::{Request, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

pub struct SocketServer {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketServer {
    pub async fn bind(path: &Path) -> std::io::Result<Self> {
        let _ = std::fs::remove_file(path);
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

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn socket_path() -> PathBuf {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{}/vigilante.sock", uid))
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Serves newline-delimited JSON requests until the client hangs up.
pub async fn handle_client<H>(stream: UnixStream, handler: Arc<H>)
where
    H: RequestHandler + Send + Sync + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<Request>(&line) {
                    Ok(request) => handler.handle(request).await,
                    Err(e) => {
                        warn!("Invalid request: {}", e);
                        Response::error("invalid_request", e.to_string())
                    }
                };
                let json = match serde_json::to_string(&response) {
                    Ok(json) => json + "\n",
                    Err(e) => {
                        error!("Failed to encode response: {}", e);
                        break;
                    }
                };
                if let Err(e) = writer.write_all(json.as_bytes()).await {
                    error!("Failed to write response: {}", e);
                    break;
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }
    debug!("Client disconnected");
}

#[async_trait::async_trait]
pub trait RequestHandler {
    async fn handle(&self, request: Request) -> Response;
}
