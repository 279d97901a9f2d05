use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use dagshield_core::Result;

/// Curated set of known-malicious addresses and domains, lower-cased on
/// insert. A set that has never been refreshed is distinct from an empty
/// one: pattern checks that depend on it degrade instead of reporting
/// zero matches.
#[derive(Debug, Clone, Default)]
pub struct KnownBadSet {
    entries: HashSet<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl KnownBadSet {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            refreshed_at: Some(Utc::now()),
        }
    }

    pub fn contains(&self, indicator: &str) -> bool {
        self.entries.contains(&indicator.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// False until the first successful refresh.
    pub fn is_loaded(&self) -> bool {
        self.refreshed_at.is_some()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

/// Process-wide holder for the current KnownBadSet snapshot. Readers
/// clone the `Arc`; refresh swaps the whole set so an in-flight analysis
/// always sees one consistent snapshot.
#[derive(Debug, Default)]
pub struct KnownBadStore {
    inner: RwLock<Arc<KnownBadSet>>,
}

impl KnownBadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<KnownBadSet> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn swap(&self, set: KnownBadSet) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(set);
    }
}

/// Pulls known-bad feeds and swaps the store. Feed formats follow the
/// public blocklists: JSON array of entries or `{address}` objects, JSON
/// object keyed by address, or plain newline-separated text.
pub struct KnownBadRefresher {
    client: Client,
    feeds: Vec<String>,
}

impl KnownBadRefresher {
    pub fn new(feeds: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            feeds,
        }
    }

    /// Fetch all feeds and replace the store snapshot. A failing feed is
    /// skipped with a warning; the refresh succeeds with whatever loaded.
    /// If every feed fails the previous snapshot stays in place.
    pub async fn refresh_into(&self, store: &KnownBadStore) -> Result<usize> {
        let mut entries: HashSet<String> = HashSet::new();
        let mut any_ok = false;

        for feed in &self.feeds {
            match self.fetch_feed(feed).await {
                Ok(feed_entries) => {
                    any_ok = true;
                    entries.extend(feed_entries);
                }
                Err(e) => {
                    warn!("Known-bad feed {} failed: {}", feed, e);
                }
            }
        }

        if !any_ok {
            warn!("All known-bad feeds failed; keeping previous snapshot");
            return Ok(store.snapshot().len());
        }

        let count = entries.len();
        store.swap(KnownBadSet::from_entries(entries));
        info!("📊 Known-bad set refreshed: {} entries", count);
        Ok(count)
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| dagshield_core::ShieldError::Network(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| dagshield_core::ShieldError::Network(e.to_string()))?;
        Ok(parse_feed(&body))
    }
}

/// Tolerant feed parser; unknown shapes fall back to line splitting.
fn parse_feed(body: &str) -> Vec<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value {
            serde_json::Value::Array(items) => {
                return items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Object(map) => map
                            .get("address")
                            .and_then(|a| a.as_str())
                            .map(|s| s.to_string()),
                        _ => None,
                    })
                    .collect();
            }
            serde_json::Value::Object(map) => {
                return map.keys().cloned().collect();
            }
            _ => {}
        }
    }

    body.lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_lowercased() {
        let set = KnownBadSet::from_entries(["0xABCDEF", "Evil-Domain.TK"]);
        assert!(set.contains("0xabcdef"));
        assert!(set.contains("0xAbCdEf"));
        assert!(set.contains("evil-domain.tk"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn unloaded_set_is_distinct_from_empty() {
        let unloaded = KnownBadSet::default();
        assert!(!unloaded.is_loaded());

        let loaded_empty = KnownBadSet::from_entries(Vec::<String>::new());
        assert!(loaded_empty.is_loaded());
        assert!(loaded_empty.is_empty());
    }

    #[test]
    fn store_swap_replaces_whole_snapshot() {
        let store = KnownBadStore::new();
        let before = store.snapshot();
        assert!(!before.is_loaded());

        store.swap(KnownBadSet::from_entries(["0xbad"]));
        let after = store.snapshot();
        assert!(after.contains("0xBAD"));

        // Earlier snapshot is untouched by the swap.
        assert!(!before.is_loaded());
    }

    #[test]
    fn parse_feed_json_array_of_objects() {
        let body = r#"[{"address": "0xAAA", "comment": "drainer"}, {"address": "0xBBB"}]"#;
        let entries = parse_feed(body);
        assert_eq!(entries, vec!["0xAAA".to_string(), "0xBBB".to_string()]);
    }

    #[test]
    fn parse_feed_json_object_keys() {
        let body = r#"{"0xaaa": {"reason": "scam"}, "0xbbb": {}}"#;
        let mut entries = parse_feed(body);
        entries.sort();
        assert_eq!(entries, vec!["0xaaa".to_string(), "0xbbb".to_string()]);
    }

    #[test]
    fn parse_feed_plaintext_lines() {
        let body = "0xaaa\n# comment\n\n0xbbb\n";
        let entries = parse_feed(body);
        assert_eq!(entries, vec!["0xaaa".to_string(), "0xbbb".to_string()]);
    }
}
