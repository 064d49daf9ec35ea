//! Per-connection flows.
//!
//! Each connection runs two independent flows that share no mutable state:
//!
//! - **inbound**: read a frame, normalise it, decode a [`Command`], run it
//!   through [`dispatch::execute`]. Any frame (pongs included) resets the
//!   idle deadline.
//! - **outbound**: drain the connection's bounded queue to the wire with a
//!   per-write deadline, and ping the peer on a fixed interval.
//!
//! The only link between them is the queue, which the hub owns the sending
//! end of. When the hub drops a connection the queue closes and the
//! outbound flow sends a close frame and exits. The inbound flow stops as
//! soon as the outbound flow has ended, so a dropped connection can no
//! longer issue commands.

use std::sync::Arc;
use std::time::Duration;

use learnloop_protocol::{Command, PresenceMessage};
use learnloop_quiz::QuizCatalog;
use learnloop_session::Participant;
use learnloop_transport::{Frame, WebSocketConnection, WsReader, WsWriter};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::dispatch::{self, ConnectionServices};
use crate::{ConnectionConfig, HubHandle, LearnLoopError, Outbound, Session};

/// Serves one authenticated connection until either side goes away.
///
/// Registers with the hub, runs both flows, then unregisters and tells
/// everyone the participant left.
pub async fn serve<S>(
    conn: WebSocketConnection<S>,
    mut participant: Participant,
    hub: HubHandle,
    catalog: Arc<dyn QuizCatalog>,
    config: &ConnectionConfig,
) -> Result<(), LearnLoopError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn_id = conn.id();
    let (reader, writer) = conn.split();
    let (queue_tx, queue_rx) = mpsc::channel(config.send_queue_capacity);

    let session = hub
        .register(conn_id, participant.session_id.clone(), queue_tx)
        .await?;
    let mut outbound = tokio::spawn(run_outbound(writer, queue_rx, config.clone()));

    let services = ConnectionServices::new(conn_id, session.clone(), hub.clone(), catalog);
    let outbound_ended = tokio::select! {
        () = run_inbound(reader, &mut participant, &session, &services, config) => false,
        _ = &mut outbound => {
            tracing::info!(%conn_id, "outbound flow ended, dropping connection");
            true
        }
    };

    hub.unregister(conn_id);
    let notice = PresenceMessage::disconnected(&participant.login, participant.session_id.as_str());
    if let Err(e) = hub.broadcast(&participant.session_id, &notice.into()) {
        tracing::debug!(%conn_id, error = %e, "failed to announce disconnect");
    }

    if !outbound_ended {
        let _ = outbound.await;
    }
    Ok(())
}

/// Reads until the peer closes, errors, or goes quiet for `pong_wait`.
pub(crate) async fn run_inbound<S>(
    mut reader: WsReader<S>,
    participant: &mut Participant,
    session: &Session,
    services: &ConnectionServices,
    config: &ConnectionConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn_id = reader.id();

    loop {
        let frame = match time::timeout(config.pong_wait, reader.recv()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection idle, closing");
                break;
            }
        };

        let Frame::Data(data) = frame else {
            continue;
        };
        let text = normalise(&data);

        let command = match Command::decode(text.as_bytes()) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode message");
                continue;
            }
        };

        let name = command.name();
        if let Err(e) = dispatch::execute(command, participant, session, services).await {
            tracing::debug!(%conn_id, command = name, error = %e, "command failed");
        }
    }
}

/// Writes queued frames and pings until the queue closes or a write
/// fails.
pub(crate) async fn run_outbound<S>(
    mut writer: WsWriter<S>,
    mut queue: mpsc::Receiver<Outbound>,
    config: ConnectionConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn_id = writer.id();
    let first_ping = Instant::now() + config.ping_period + jitter(config.ping_jitter);
    let mut pings = time::interval_at(first_ping, config.ping_period);
    pings.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(frame) = frame else {
                    // The hub dropped us.
                    let _ = time::timeout(config.write_wait, writer.close()).await;
                    break;
                };
                match time::timeout(config.write_wait, writer.send_text(&frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(%conn_id, error = %e, "write failed");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(%conn_id, "write timed out");
                        break;
                    }
                }
            }
            _ = pings.tick() => {
                if !matches!(time::timeout(config.write_wait, writer.ping()).await, Ok(Ok(()))) {
                    tracing::debug!(%conn_id, "ping failed");
                    break;
                }
            }
        }
    }
}

/// Newlines become spaces and surrounding whitespace goes.
fn normalise(data: &[u8]) -> String {
    String::from_utf8_lossy(data).replace('\n', " ").trim().to_owned()
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use learnloop_quiz::{MemoryCatalog, QuizConfig};
    use learnloop_session::{Identity, SessionId};
    use learnloop_transport::Handshake;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use crate::BroadcastScope;

    // =====================================================================
    // Helpers
    // =====================================================================

    /// A server-side connection and the raw client end of the same pipe.
    async fn pipe(session: &str) -> (WebSocketConnection<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let handshake = Handshake {
            session_id: session.into(),
            token: "t".into(),
        };
        (WebSocketConnection::new(server, handshake), client)
    }

    fn participant(session: &str) -> Participant {
        Participant::new(
            Identity {
                user_id: "u".into(),
                instance_name: "i".into(),
            },
            SessionId::new(session),
        )
    }

    fn catalog() -> Arc<dyn QuizCatalog> {
        Arc::new(MemoryCatalog::new())
    }

    async fn wait_for_connections(hub: &HubHandle, expected: usize) {
        while hub.stats().await.unwrap().connections != expected {
            tokio::task::yield_now().await;
        }
    }

    async fn next_json(client: &mut WebSocketStream<DuplexStream>) -> serde_json::Value {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("client read failed: {e}"),
                None => panic!("stream ended"),
            }
        }
    }

    // =====================================================================
    // Tests
    // =====================================================================

    #[test]
    fn test_normalise() {
        assert_eq!(normalise(b"  {\"a\":\n1}\n"), "{\"a\": 1}");
        assert_eq!(normalise(b"\n\n"), "");
    }

    #[test]
    fn test_jitter_stays_in_range() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(Duration::from_secs(2)) <= Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn test_join_and_chat_round_trip() {
        let hub = HubHandle::spawn(QuizConfig::default(), BroadcastScope::Hub);
        let (conn, mut client) = pipe("s-1").await;
        let config = ConnectionConfig::default();

        let server = tokio::spawn({
            let hub = hub.clone();
            async move { serve(conn, participant("s-1"), hub, catalog(), &config).await }
        });

        client
            .send(Message::text("{\"type\":0,\n\"from\":{\"type\":1,\"id\":\"ann\"}}"))
            .await
            .unwrap();
        let joined = next_json(&mut client).await;
        assert_eq!(joined["type"], 0);
        assert_eq!(joined["from"]["id"], "ann");

        client
            .send(Message::text(r#"{"type":2,"msg":"hello"}"#))
            .await
            .unwrap();
        let chat = next_json(&mut client).await;
        assert_eq!(chat["type"], 2);
        assert_eq!(chat["from"]["id"], "ann");
        assert_eq!(chat["msg"], "hello");

        client.close(None).await.unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(hub.stats().await.unwrap().connections, 0);
    }

    #[tokio::test]
    async fn test_bad_messages_keep_connection_open() {
        let hub = HubHandle::spawn(QuizConfig::default(), BroadcastScope::Hub);
        let (conn, mut client) = pipe("s-1").await;
        let config = ConnectionConfig::default();

        tokio::spawn({
            let hub = hub.clone();
            async move { serve(conn, participant("s-1"), hub, catalog(), &config).await }
        });

        for bad in ["not json", r#"{"type":9}"#, r#"{"type":4,"action":42}"#, r#"{"type":2,"msg":"x"}"#] {
            client.send(Message::text(bad)).await.unwrap();
        }
        client
            .send(Message::text(r#"{"type":0,"from":{"type":1,"id":"ann"}}"#))
            .await
            .unwrap();

        let joined = next_json(&mut client).await;
        assert_eq!(joined["from"]["id"], "ann");
        assert_eq!(hub.stats().await.unwrap().connections, 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_announced_to_others() {
        let hub = HubHandle::spawn(QuizConfig::default(), BroadcastScope::Hub);
        let (leaving, mut leaving_client) = pipe("s-1").await;
        let (staying, mut staying_client) = pipe("s-1").await;

        for conn in [leaving, staying] {
            let hub = hub.clone();
            tokio::spawn(async move {
                serve(conn, participant("s-1"), hub, catalog(), &ConnectionConfig::default()).await
            });
        }
        wait_for_connections(&hub, 2).await;

        leaving_client
            .send(Message::text(r#"{"type":0,"from":{"type":1,"id":"ann"}}"#))
            .await
            .unwrap();
        // Two members, one joined: a notice for each.
        next_json(&mut staying_client).await;
        next_json(&mut staying_client).await;

        leaving_client.close(None).await.unwrap();
        let gone = next_json(&mut staying_client).await;
        assert_eq!(gone["type"], 1);
        assert_eq!(gone["from"]["id"], "ann");
        assert_eq!(gone["to"][0]["id"], "s-1");
    }

    #[tokio::test]
    async fn test_forced_removal_stops_inbound_flow() {
        let hub = HubHandle::spawn(QuizConfig::default(), BroadcastScope::Hub);
        let (dropped, mut dropped_client) = pipe("s-1").await;
        let (staying, mut staying_client) = pipe("s-1").await;
        let dropped_id = dropped.id();

        let dropped_server = tokio::spawn({
            let hub = hub.clone();
            async move {
                serve(dropped, participant("s-1"), hub, catalog(), &ConnectionConfig::default()).await
            }
        });
        tokio::spawn({
            let hub = hub.clone();
            async move {
                serve(staying, participant("s-1"), hub, catalog(), &ConnectionConfig::default()).await
            }
        });
        wait_for_connections(&hub, 2).await;

        dropped_client
            .send(Message::text(r#"{"type":0,"from":{"type":1,"id":"ann"}}"#))
            .await
            .unwrap();
        next_json(&mut staying_client).await;
        next_json(&mut staying_client).await;

        // The hub drops the connection while its reader is still open.
        hub.unregister(dropped_id);

        let frame = loop {
            match dropped_client.next().await {
                Some(Ok(Message::Text(_))) => continue,
                other => break other,
            }
        };
        assert!(matches!(frame, Some(Ok(Message::Close(_))) | None), "{frame:?}");
        time::timeout(Duration::from_secs(1), dropped_server)
            .await
            .expect("serve should return once the hub drops the connection")
            .unwrap()
            .unwrap();

        let gone = next_json(&mut staying_client).await;
        assert_eq!(gone["type"], 1);
        assert_eq!(gone["from"]["id"], "ann");
        assert_eq!(hub.stats().await.unwrap().connections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_connection_is_dropped() {
        let hub = HubHandle::spawn(QuizConfig::default(), BroadcastScope::Hub);
        let (conn, _client) = pipe("s-1").await;
        let config = ConnectionConfig {
            pong_wait: Duration::from_secs(5),
            ping_period: Duration::from_secs(60),
            ..ConnectionConfig::default()
        };

        let server = tokio::spawn({
            let hub = hub.clone();
            async move { serve(conn, participant("s-1"), hub, catalog(), &config).await }
        });

        time::sleep(Duration::from_secs(6)).await;
        server.await.unwrap().unwrap();
        assert_eq!(hub.stats().await.unwrap().connections, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_pings_periodically() {
        let (conn, mut client) = pipe("s-1").await;
        let (_reader, writer) = conn.split();
        let (_tx, rx) = mpsc::channel::<Outbound>(4);
        let config = ConnectionConfig {
            ping_period: Duration::from_secs(10),
            ping_jitter: Duration::ZERO,
            ..ConnectionConfig::default()
        };

        tokio::spawn(run_outbound(writer, rx, config));

        let frame = client.next().await.unwrap().unwrap();
        assert!(matches!(frame, Message::Ping(_)));
    }

    #[tokio::test]
    async fn test_closed_queue_closes_socket() {
        let (conn, mut client) = pipe("s-1").await;
        let (_reader, writer) = conn.split();
        let (tx, rx) = mpsc::channel::<Outbound>(4);

        let outbound = tokio::spawn(run_outbound(writer, rx, ConnectionConfig::default()));
        tx.send(Arc::from("{\"type\":2}")).await.unwrap();
        drop(tx);

        let first = client.next().await.unwrap().unwrap();
        assert_eq!(first, Message::text("{\"type\":2}"));
        let second = client.next().await.unwrap().unwrap();
        assert!(matches!(second, Message::Close(_)));
        outbound.await.unwrap();
    }
}
