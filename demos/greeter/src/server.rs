//! Greeter server implementation.

use crate::protocol::{Greeting, Rejected, Reply};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tether_core::{BasicQuery, Codec, Envelope, HANDSHAKE_PARAM, JsonCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr) -> anyhow::Result<()> {
    // The handshake query rides on the upgrade request URI.
    let mut raw_query = None;
    let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        raw_query = req.uri().query().map(str::to_owned);
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, capture).await?;

    let query = handshake(raw_query.as_deref())?;
    let name = query
        .fields
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(query.id.as_str())
        .to_string();
    tracing::info!("{} connected from {} as {}", query.id, addr, name);

    let (mut sink, mut stream) = ws.split();
    let mut seq = 0;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("WebSocket error: {}", e);
                break;
            }
        };

        let frame = match msg {
            Message::Text(text) => text.as_str().as_bytes().to_vec(),
            Message::Binary(data) => data.to_vec(),
            Message::Close(_) => break,
            // pongs are queued by tungstenite; flush them out
            _ => {
                sink.flush().await?;
                continue;
            }
        };

        let reply = match Envelope::unwrap(&frame, &JsonCodec) {
            Ok(envelope) if envelope.is::<Greeting>() => {
                match envelope.open::<Greeting, _>(&JsonCodec) {
                    Ok(greeting) => {
                        seq += 1;
                        let text = format!("hello {}, you said {:?}", name, greeting.text);
                        Envelope::seal(&Reply { text, seq }, &JsonCodec)?
                    }
                    Err(e) => rejected(format!("bad greeting: {e}"))?,
                }
            }
            Ok(envelope) => rejected(format!("unknown message type {:?}", envelope.discriminator))?,
            Err(e) => rejected(e.to_string())?,
        };

        let text = JsonCodec.encode(&reply)?;
        sink.send(Message::Text(text.into())).await?;
    }

    tracing::info!("{} disconnected after {} greetings", query.id, seq);
    Ok(())
}

fn handshake(raw_query: Option<&str>) -> anyhow::Result<BasicQuery> {
    let raw_query = raw_query.ok_or_else(|| anyhow::anyhow!("missing handshake query"))?;
    let data = url::form_urlencoded::parse(raw_query.as_bytes())
        .find(|(k, _)| k == HANDSHAKE_PARAM)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow::anyhow!("missing {HANDSHAKE_PARAM} parameter"))?;
    Ok(JsonCodec.decode(&data)?)
}

fn rejected(reason: String) -> anyhow::Result<Envelope> {
    tracing::warn!("Rejecting frame: {}", reason);
    Ok(Envelope::seal(&Rejected { reason }, &JsonCodec)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::Message as _;

    #[test]
    fn parses_handshake() {
        let query = handshake(Some("data=%7B%22id%22%3A%22u1%22%2C%22name%22%3A%22Ken%22%7D")).unwrap();
        assert_eq!(query.id.as_str(), "u1");
        assert_eq!(query.fields["name"], "Ken");
    }

    #[test]
    fn rejects_missing_handshake() {
        assert!(handshake(None).is_err());
        assert!(handshake(Some("other=1")).is_err());
        assert!(handshake(Some("data=%7B%7D")).is_err());
    }

    #[test]
    fn reply_discriminators_differ() {
        assert_ne!(Reply::DISCRIMINATOR, Greeting::DISCRIMINATOR);
        assert_ne!(Rejected::DISCRIMINATOR, Reply::DISCRIMINATOR);
    }
}
