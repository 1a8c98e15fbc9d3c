//! Acceptor Pool Example
//!
//! This example drives a gateway session pool against in-process
//! counterparties:
//! - An authenticator answers from a tokio task, after the logon was handed
//!   to it
//! - One counterparty is accepted, the other is rejected with a Logout and a
//!   linger before its connection closes
//! - A worker thread takes the accepted session over, sends an execution
//!   report on it and hands it back
//! - The gateway lists its sessions and force-disconnects the survivor
//!
//! Run with `RUST_LOG=debug` to see every state change.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{info, warn};

use fixgate::prelude::*;
use fixgate::session::OutboundHeader;

const BEGIN_STRING: &str = "FIX.4.4";
const GATEWAY_COMP_ID: &str = "GATEWAY";
const REJECT_LINGER_MS: i64 = 100;

/// Initialize logging with tracing-subscriber.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Checks passwords against a directory, off the polling thread.
struct DirectoryAuthenticator {
    passwords: HashMap<String, String>,
}

impl Authenticator for DirectoryAuthenticator {
    fn authenticate(&self, logon: &LogonMessage, proxy: AuthenticationProxy) -> anyhow::Result<()> {
        let expected = logon
            .header
            .sender_comp_id
            .as_ref()
            .and_then(|sender| self.passwords.get(sender))
            .cloned();
        let supplied = logon.password.clone();

        tokio::spawn(async move {
            // Directory round trip.
            tokio::time::sleep(Duration::from_millis(5)).await;
            if expected.is_some() && expected == supplied {
                proxy.accept();
            } else {
                let logout = OutboundMessage::new(MsgType::Logout)
                    .with_field(tags::TEXT, "invalid credentials");
                if let Err(error) = proxy.reject(logout, REJECT_LINGER_MS) {
                    warn!(%error, "could not reject logon");
                }
            }
        });
        Ok(())
    }
}

/// Encodes a counterparty logon.
fn logon(sender: &str, password: &str, clock: &dyn Clock) -> anyhow::Result<Vec<u8>> {
    let header = OutboundHeader {
        sender_comp_id: sender.to_string(),
        target_comp_id: GATEWAY_COMP_ID.to_string(),
        ..Default::default()
    };
    let bytes = OutboundMessage::new(MsgType::Logon)
        .with_field(tags::ENCRYPT_METHOD, 0)
        .with_field(tags::HEART_BT_INT, 30)
        .with_field(tags::USERNAME, sender)
        .with_field(tags::PASSWORD, password)
        .encode(BEGIN_STRING, &header, 1, clock.timestamp(), None)?;
    Ok(bytes.to_vec())
}

/// Message types of every frame in `bytes`.
fn frames(bytes: &[u8]) -> Vec<String> {
    let mut decoder = Decoder::new(bytes);
    let mut types = Vec::new();
    while let Ok(raw) = decoder.decode() {
        types.push(raw.msg_type().to_string());
    }
    types
}

fn report(gateway: &mut GatewaySessions) {
    for event in gateway.drain_events() {
        match event {
            GatewayEvent::LogonRejected {
                connection_id,
                reason,
            } => warn!(%connection_id, %reason, "logon rejected"),
            other => info!(event = ?other, "gateway event"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let session_config = SessionConfig::builder()
        .begin_string(BEGIN_STRING)
        .heartbeat_interval(Duration::from_secs(30))
        .build()?;
    let passwords = HashMap::from([("ALICE".to_string(), "secret".to_string())]);
    let config = EngineBuilder::new()
        .with_session_config(session_config)
        .with_clock(Arc::clone(&clock))
        .with_authenticator(Arc::new(DirectoryAuthenticator { passwords }))
        .with_authentication_timeout(Duration::from_secs(1))
        .build()?;
    let mut gateway = GatewaySessions::new(config);

    let alice_id = ConnectionId::new(1);
    let mallory_id = ConnectionId::new(2);
    let alice = MemoryChannel::new();
    let mallory = MemoryChannel::new();
    gateway.authenticate(
        alice_id,
        &logon("ALICE", "secret", clock.as_ref())?,
        Box::new(alice.clone()),
    )?;
    gateway.authenticate(
        mallory_id,
        &logon("MALLORY", "guess", clock.as_ref())?,
        Box::new(mallory.clone()),
    )?;

    while gateway.pending_logons() > 0 {
        gateway.poll(clock.time_ms());
        report(&mut gateway);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    info!(frames = ?frames(&alice.take_written()), "ALICE received");
    info!(
        frames = ?frames(&mallory.written()),
        closed = mallory.is_closed(),
        "MALLORY received"
    );

    let mut library = gateway.new_library();
    let worker_clock = Arc::clone(&clock);
    let worker = thread::spawn(move || -> anyhow::Result<()> {
        library.request_session(alice_id)?;
        while library.session(alice_id).is_none() {
            library.poll(worker_clock.time_ms());
            if let Some((connection_id, error)) = library.take_failures().pop() {
                return Err(anyhow!("session {connection_id} refused: {error}"));
            }
            thread::sleep(Duration::from_millis(1));
        }

        let execution_report = OutboundMessage::new(MsgType::Application("8".to_string()))
            .with_field(tags::TEXT, "filled");
        let position = library.send(alice_id, &execution_report)?;
        info!(library_id = library.library_id(), position, "execution report sent");
        library.release_to_gateway(alice_id)?;
        Ok(())
    });

    while !worker.is_finished() {
        gateway.poll(clock.time_ms());
        report(&mut gateway);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    worker
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))??;
    gateway.poll(clock.time_ms());
    report(&mut gateway);
    info!(frames = ?frames(&alice.take_written()), "ALICE received");

    for session in gateway.sessions() {
        info!(?session, "live session");
    }

    gateway.force_disconnect(alice_id, DisconnectReason::ApplicationDisconnect)?;
    gateway.poll(clock.time_ms());
    report(&mut gateway);
    info!(
        frames = ?frames(&alice.written()),
        closed = alice.is_closed(),
        "ALICE received"
    );
    Ok(())
}
