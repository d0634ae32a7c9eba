//! Websocket connection to the request server.
//!
//! The bridge is the client side of this link: it dials the request
//! server, registers itself, then answers every request message with
//! exactly one response message. Each (re)connection gets a bounded
//! number of attempts with a fixed delay; once they are exhausted the
//! failure propagates to the caller so the process can shut down
//! cleanly. The bridge's own state lives elsewhere and survives
//! reconnects.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, warn};

use crate::handler::RequestHandler;
use crate::messages;

const MAX_CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct WsOptions {
    pub server_url: String,
    pub plug_type: String,
    pub name: String,
    pub api_key: String,
}

pub async fn run(options: WsOptions, handler: Arc<RequestHandler>) -> Result<()> {
    loop {
        let stream = connect_with_retries(&options.server_url).await?;
        info!(server = %options.server_url, "connected to the request server");
        if let Err(err) = serve(stream, &options, &handler).await {
            warn!(error = %err, "websocket session ended");
        }
        tokio::time::sleep(CONNECT_RETRY_DELAY).await;
    }
}

async fn connect_with_retries(
    server_url: &str,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let mut last_error = None;
    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match connect_async(server_url).await {
            Ok((stream, _)) => return Ok(stream),
            Err(err) => {
                warn!(server = %server_url, attempt, error = %err, "failed to connect to the request server");
                last_error = Some(err);
            }
        }
        if attempt < MAX_CONNECT_ATTEMPTS {
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        }
    }
    Err(anyhow!(
        "giving up on the request server [{server_url}] after {MAX_CONNECT_ATTEMPTS} connection attempts: {}",
        last_error.map(|err| err.to_string()).unwrap_or_default()
    ))
}

async fn serve(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    options: &WsOptions,
    handler: &RequestHandler,
) -> Result<()> {
    let register = messages::register_message(&options.plug_type, &options.name, &options.api_key);
    stream.send(Message::text(register)).await?;

    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                let response = handler.process_message(text.as_str()).await;
                stream.send(Message::text(response)).await?;
            }
            Message::Ping(payload) => stream.send(Message::Pong(payload)).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}
