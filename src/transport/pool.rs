//! Host-keyed connection pool.
//!
//! One `reqwest::Client` per (host, redirect mode); entries are created
//! lazily and reused, so keep-alive connections survive across logical
//! calls to the same host. Idle entries are pruned on the next pool access.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of distinct host entries kept alive.
    pub max_entries: usize,
    /// Entries untouched for longer than this are dropped on next access.
    pub idle_timeout: Duration,
    /// Keep-alive connections per host handed to the underlying client.
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_entries: 8,
            idle_timeout: Duration::from_secs(90),
            max_idle_per_host: 32,
        }
    }
}

struct PoolEntry {
    client: reqwest::Client,
    last_used: Instant,
}

/// Lazily-populated client pool. One mutex guards the map; the critical
/// section only builds or clones a client, never performs I/O.
pub struct ConnectionPool {
    config: PoolConfig,
    entries: Mutex<HashMap<(String, bool), PoolEntry>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch (or create) the client for a URL's host.
    ///
    /// The redirect mode participates in the key because redirect policy is
    /// fixed at client construction time.
    pub fn client_for(&self, url: &str, follow_redirects: bool) -> Result<reqwest::Client> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::InvalidRequest(format!("invalid url {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidRequest(format!("url has no host: {}", url)))?
            .to_string();

        let key = (host, follow_redirects);
        let mut entries = self.entries.lock().unwrap();

        self.prune(&mut entries);

        if let Some(entry) = entries.get_mut(&key) {
            entry.last_used = Instant::now();
            return Ok(entry.client.clone());
        }

        let client = self.build_client(follow_redirects)?;
        if entries.len() >= self.config.max_entries {
            // Make room: drop the least-recently used entry.
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            }
        }
        entries.insert(
            key,
            PoolEntry {
                client: client.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(client)
    }

    /// Number of live entries (after pruning).
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        self.prune(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, entries: &mut HashMap<(String, bool), PoolEntry>) {
        let idle = self.config.idle_timeout;
        entries.retain(|_, e| e.last_used.elapsed() <= idle);
    }

    fn build_client(&self, follow_redirects: bool) -> Result<reqwest::Client> {
        let redirect = if follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        reqwest::Client::builder()
            .redirect(redirect)
            .pool_max_idle_per_host(self.config.max_idle_per_host)
            .pool_idle_timeout(Some(self.config.idle_timeout))
            .build()
            .map_err(Error::Http)
    }
}
