/*!
 * Emulated Network
 *
 * Alias registry standing in for a signalling service: maps `ip:port` aliases
 * to bound and listening sockets, queues inbound connections per listener and
 * hands out ephemeral client aliases.
 */

use super::stream::StreamEnd;
use super::EmulatedConfig;
use crate::core::limits::{
    EADDRINUSE, EADDRNOTAVAIL, ECONNREFUSED, EINVAL, EPHEMERAL_PORT_FIRST, EPHEMERAL_PORT_LAST,
};
use crate::core::RawStatus;
use crate::net::address::Address;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flume::{Receiver, Sender, TrySendError};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, trace};
use uuid::Uuid;

static GLOBAL_NETWORK: OnceLock<Arc<EmulatedNetwork>> = OnceLock::new();

/// A connection waiting in a listener's backlog
pub struct PendingConnection {
    /// Address the client dialled (the listener's alias, or a concrete host for wildcard listeners)
    pub local: Address,
    /// Client alias
    pub peer: Address,
    pub stream: StreamEnd,
}

enum Alias {
    Bound,
    Listening(Sender<PendingConnection>),
}

/// In-process network shared by every emulated socket attached to it
pub struct EmulatedNetwork {
    id: Uuid,
    aliases: DashMap<Address, Alias, RandomState>,
    next_ephemeral: AtomicU32,
    config: EmulatedConfig,
}

impl EmulatedNetwork {
    pub fn new(config: EmulatedConfig) -> Self {
        let id = Uuid::new_v4();
        info!(network = %id, host = %config.host, "emulated network created");
        Self {
            id,
            aliases: DashMap::with_hasher(RandomState::new()),
            next_ephemeral: AtomicU32::new(0),
            config,
        }
    }

    /// Network shared by default-constructed emulated backends
    pub fn global() -> Arc<EmulatedNetwork> {
        Arc::clone(GLOBAL_NETWORK.get_or_init(|| Arc::new(EmulatedNetwork::new(EmulatedConfig::default()))))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EmulatedConfig {
        &self.config
    }

    /// Number of claimed aliases (bound, listening and client)
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_claimed(&self, addr: &Address) -> bool {
        self.aliases.contains_key(addr)
    }

    pub fn is_listening(&self, addr: &Address) -> bool {
        self.aliases
            .get(addr)
            .map(|alias| matches!(alias.value(), Alias::Listening(_)))
            .unwrap_or(false)
    }

    fn conflicts_with_wildcard(&self, addr: &Address) -> bool {
        if addr.is_unspecified() {
            self.aliases.iter().any(|entry| entry.key().port == addr.port)
        } else {
            self.aliases
                .contains_key(&Address::new(Ipv4Addr::UNSPECIFIED, addr.port))
        }
    }

    /// Claim an alias for a bind; port 0 picks an ephemeral port
    pub fn claim(&self, addr: Address) -> Result<Address, RawStatus> {
        if addr.port == 0 {
            return self.claim_ephemeral(addr.ip());
        }
        if self.conflicts_with_wildcard(&addr) {
            debug!(alias = %addr, "alias rejected, wildcard conflict");
            return Err(EADDRINUSE);
        }
        match self.aliases.entry(addr) {
            Entry::Occupied(_) => {
                debug!(alias = %addr, "alias rejected, already claimed");
                Err(EADDRINUSE)
            }
            Entry::Vacant(slot) => {
                slot.insert(Alias::Bound);
                trace!(alias = %addr, "alias claimed");
                Ok(addr)
            }
        }
    }

    fn claim_ephemeral(&self, ip: Ipv4Addr) -> Result<Address, RawStatus> {
        let span = u32::from(EPHEMERAL_PORT_LAST - EPHEMERAL_PORT_FIRST) + 1;
        for _ in 0..span {
            let offset = self.next_ephemeral.fetch_add(1, Ordering::Relaxed) % span;
            let addr = Address::new(ip, EPHEMERAL_PORT_FIRST + offset as u16);
            if self.conflicts_with_wildcard(&addr) {
                continue;
            }
            if let Entry::Vacant(slot) = self.aliases.entry(addr) {
                slot.insert(Alias::Bound);
                trace!(alias = %addr, "ephemeral alias claimed");
                return Ok(addr);
            }
        }
        Err(EADDRNOTAVAIL)
    }

    /// Release an alias; a listener's queue disconnects once its sender is gone
    pub fn release(&self, addr: &Address) {
        if self.aliases.remove(addr).is_some() {
            trace!(alias = %addr, "alias released");
        }
    }

    /// Turn a bound alias into a listener with a queue of `capacity` pending connections
    pub fn listen(&self, addr: &Address, capacity: usize) -> Result<Receiver<PendingConnection>, RawStatus> {
        let mut alias = self.aliases.get_mut(addr).ok_or(EINVAL)?;
        if matches!(alias.value(), Alias::Listening(_)) {
            return Err(EINVAL);
        }
        let (sender, receiver) = flume::bounded(capacity.max(1));
        *alias.value_mut() = Alias::Listening(sender);
        debug!(alias = %addr, capacity, "alias listening");
        Ok(receiver)
    }

    fn listener_for(&self, target: &Address) -> Option<Sender<PendingConnection>> {
        let lookup = |addr: &Address| match self.aliases.get(addr).as_deref() {
            Some(Alias::Listening(sender)) => Some(sender.clone()),
            _ => None,
        };
        lookup(target).or_else(|| lookup(&Address::new(Ipv4Addr::UNSPECIFIED, target.port)))
    }

    /// Open a connection to the listener at `target`
    ///
    /// Returns the client's ephemeral alias and its end of the stream. The
    /// other end waits in the listener's backlog until accepted.
    pub fn connect(&self, target: &Address) -> Result<(Address, StreamEnd), RawStatus> {
        let listener = self.listener_for(target).ok_or(ECONNREFUSED)?;
        let client = self.claim_ephemeral(self.config.host)?;
        let (client_end, server_end) = StreamEnd::pair(self.config.stream_capacity);
        let connection_id = client_end.connection_id();

        let pending = PendingConnection {
            local: *target,
            peer: client,
            stream: server_end,
        };
        match listener.try_send(pending) {
            Ok(()) => {
                debug!(
                    connection = %connection_id,
                    client = %client,
                    server = %target,
                    "connection queued"
                );
                Ok((client, client_end))
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.release(&client);
                debug!(server = %target, "connection refused, backlog full or listener closed");
                Err(ECONNREFUSED)
            }
        }
    }
}
