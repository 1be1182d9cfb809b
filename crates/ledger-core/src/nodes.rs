//! Registry of peer nodes, keyed by normalized `host[:port]`.

use crate::error::{LedgerError, Result};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Reduce `http://host:port/...` or bare `host:port` to `host:port`.
///
/// With a scheme, the URL's network location is kept. Without one the input
/// is read as `host[:port]` and anything from the first `/` on is dropped.
/// A port is kept whenever the input spells one out, even the scheme's
/// default (`https://peer:443` stays `peer:443`), since peers are always
/// dialed over plain http.
///
/// Hosts go through WHATWG host parsing: names are lowercased and
/// IDNA-encoded, so `Node-A:5000` and `node-a:5000` are the same peer.
pub fn normalize_address(address: &str) -> Result<String> {
    let invalid = || LedgerError::InvalidAddress(address.to_string());
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (url, rest) = match trimmed.split_once("://") {
        Some((_, rest)) => (Url::parse(trimmed).map_err(|_| invalid())?, rest),
        None => {
            let authority = trimmed.split('/').next().unwrap_or_default();
            if authority.is_empty() {
                return Err(invalid());
            }
            let url = Url::parse(&format!("http://{authority}")).map_err(|_| invalid())?;
            (url, authority)
        }
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(invalid)?;
    let port = match url.port() {
        Some(port) => Some(port),
        None if spells_port(authority) => url.port_or_known_default(),
        None => None,
    };
    Ok(match port {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

// `[user@]host:digits`; the colons inside an IPv6 literal do not count.
fn spells_port(authority: &str) -> bool {
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    match host_port.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<BTreeSet<String>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer. Registering the same location twice is a no-op.
    pub fn register(&self, address: &str) -> Result<String> {
        let node = normalize_address(address)?;
        if self.nodes.write().insert(node.clone()) {
            info!("Registered node {}", node);
        }
        Ok(node)
    }

    /// Register a batch, all or nothing: one bad address leaves the registry
    /// untouched.
    pub fn register_all<I, S>(&self, addresses: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let nodes = addresses
            .into_iter()
            .map(|address| normalize_address(address.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let mut set = self.nodes.write();
        for node in &nodes {
            if set.insert(node.clone()) {
                info!("Registered node {}", node);
            }
        }
        Ok(nodes)
    }

    /// Snapshot of known peers, in ascending address order.
    pub fn members(&self) -> BTreeSet<String> {
        self.nodes.read().clone()
    }

    pub fn count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn contains(&self, address: &str) -> bool {
        normalize_address(address)
            .map(|node| self.nodes.read().contains(&node))
            .unwrap_or(false)
    }
}
