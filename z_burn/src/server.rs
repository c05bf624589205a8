//! Zenoh transport for the session router
//!
//! Every client connection gets a router session, an inbox task feeding it
//! messages in arrival order and an outbox task publishing whatever the
//! session's outbound channel yields. A client's liveliness token going away
//! closes its session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use duel_arena::{ConnectionId, Outbound, SessionRouter};
use zenoh::key_expr::KeyExpr;
use zenoh::sample::SampleKind;

use crate::keyexpr::{ClientKeyexpr, Direction, SessionKeyexpr};

/// Inbound queue of one client
struct ClientLink {
    inbox: flume::Sender<String>,
}

/// Inbound queues of the connected clients
#[derive(Default)]
struct Clients {
    links: HashMap<ConnectionId, ClientLink>,
}

impl Clients {
    /// Queue `text` for `id`
    ///
    /// `connect` opens a fresh link on first contact, or when the inbox task
    /// behind the current link is gone.
    fn route(
        &mut self,
        id: ConnectionId,
        text: String,
        connect: impl FnOnce(ConnectionId) -> anyhow::Result<ClientLink>,
    ) -> anyhow::Result<()> {
        let text = match self.links.get(&id) {
            Some(link) => match link.inbox.send(text) {
                Ok(()) => return Ok(()),
                Err(flume::SendError(text)) => {
                    tracing::debug!("Connection '{}' inbox closed, reopening", id);
                    self.links.remove(&id);
                    text
                }
            },
            None => text,
        };

        let link = connect(id.clone())?;
        let _ = link.inbox.send(text);
        self.links.insert(id, link);
        Ok(())
    }

    fn remove(&mut self, id: &ConnectionId) -> bool {
        self.links.remove(id).is_some()
    }

    fn clear(&mut self) {
        self.links.clear();
    }
}

/// Open a router session for `id` fed by a new inbox task
///
/// The session lives as long as the returned link's inbox sender.
fn spawn_inbox(router: &Arc<SessionRouter>, id: ConnectionId) -> (ClientLink, flume::Receiver<Outbound>) {
    let (session, outbound) = router.open_session(id);
    let (inbox, inbox_rx) = flume::unbounded::<String>();

    tokio::spawn(async move {
        while let Ok(text) = inbox_rx.recv_async().await {
            session.handle_text(&text).await;
        }
        // Session drops here and unregisters its connection
    });

    (ClientLink { inbox }, outbound)
}

pub struct BurnServer {
    session: zenoh::Session,
    prefix: KeyExpr<'static>,
    router: Arc<SessionRouter>,
    clients: Clients,
    stats_interval: Duration,
}

impl BurnServer {
    pub fn new(
        session: zenoh::Session,
        prefix: KeyExpr<'static>,
        router: Arc<SessionRouter>,
        stats_interval: Duration,
    ) -> Self {
        Self {
            session,
            prefix,
            router,
            clients: Clients::default(),
            stats_interval,
        }
    }

    /// Serve until Ctrl-C
    pub async fn run(mut self) -> anyhow::Result<()> {
        let inbound_ke: KeyExpr = SessionKeyexpr::new(&self.prefix, None, Direction::In).try_into()?;
        let inbound = self
            .session
            .declare_subscriber(inbound_ke.clone())
            .await
            .map_err(|e| anyhow!("Failed to declare subscriber: {}", e))?;

        let clients_ke: KeyExpr = ClientKeyexpr::new(&self.prefix, None).try_into()?;
        let departures = self
            .session
            .liveliness()
            .declare_subscriber(clients_ke.clone())
            .await
            .map_err(|e| anyhow!("Failed to declare liveliness subscriber: {}", e))?;

        tracing::info!(
            "Burn server listening on '{}', watching '{}', games {:?}",
            inbound_ke,
            clients_ke,
            self.router.games()
        );

        let mut stats_tick = tokio::time::interval(self.stats_interval);
        stats_tick.tick().await;

        loop {
            tokio::select! {
                sample = inbound.recv_async() => {
                    let sample = match sample {
                        Ok(sample) => sample,
                        Err(e) => {
                            tracing::error!("Inbound subscriber closed: {}", e);
                            break;
                        }
                    };
                    let ke = match SessionKeyexpr::try_from(sample.key_expr()) {
                        Ok(ke) => ke,
                        Err(e) => {
                            tracing::warn!("Ignoring sample: {}", e);
                            continue;
                        }
                    };
                    let Some(id) = ke.connection_id().cloned() else {
                        continue;
                    };
                    let text = match sample.payload().try_to_string() {
                        Ok(text) => text.into_owned(),
                        Err(e) => {
                            tracing::warn!("Connection '{}' sent a non UTF-8 payload: {}", id, e);
                            continue;
                        }
                    };
                    self.route(id, text)?;
                }
                sample = departures.recv_async() => {
                    let Ok(sample) = sample else {
                        tracing::error!("Liveliness subscriber closed");
                        break;
                    };
                    if sample.kind() != SampleKind::Delete {
                        continue;
                    }
                    if let Ok(ke) = ClientKeyexpr::try_from(sample.key_expr()) {
                        if let Some(id) = ke.connection_id() {
                            if self.clients.remove(id) {
                                tracing::info!("Connection '{}' left", id);
                            }
                        }
                    }
                }
                _ = stats_tick.tick() => {
                    tracing::info!(
                        "Stats: {} | {} duels, {} connections",
                        self.router.stats().get_stats(),
                        self.router.store().len(),
                        self.router.registry().len()
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.clients.clear();
        Ok(())
    }

    /// Queue `text` for the session of `id`, opening the session on first contact
    fn route(&mut self, id: ConnectionId, text: String) -> anyhow::Result<()> {
        let Self {
            session,
            prefix,
            router,
            clients,
            ..
        } = self;
        clients.route(id, text, |id| connect(session, prefix, router, id))
    }
}

/// Open a session for `id` and publish its outbound messages on `<prefix>/session/<id>/out`
fn connect(
    session: &zenoh::Session,
    prefix: &KeyExpr<'static>,
    router: &Arc<SessionRouter>,
    id: ConnectionId,
) -> anyhow::Result<ClientLink> {
    let out_ke: KeyExpr<'static> =
        SessionKeyexpr::new(prefix, Some(id.clone()), Direction::Out).try_into()?;
    let (link, outbound) = spawn_inbox(router, id.clone());

    let zsession = session.clone();
    tokio::spawn(async move {
        publish_outbound(zsession, out_ke, outbound).await;
        tracing::debug!("Connection '{}' outbox closed", id);
    });

    Ok(link)
}

async fn publish_outbound(
    session: zenoh::Session,
    keyexpr: KeyExpr<'static>,
    outbound: flume::Receiver<Outbound>,
) {
    while let Ok(message) = outbound.recv_async().await {
        if let Err(e) = session.put(&keyexpr, message.to_string()).await {
            tracing::warn!("Publishing to '{}' failed: {}", keyexpr, e);
        }
    }
}
