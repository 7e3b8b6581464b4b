//! News Feed Polling
//!
//! Fetches registered RSS/Atom sources (through the SSRF guard), parses the
//! entries, and dedups them into `news_feed_articles` by content hash. The
//! daemon runs this every 30 minutes.

use quick_xml::events::Event;
use quick_xml::Reader;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::storage::{now_iso, short_id, Result, Store, StoreError};

/// Per-request fetch timeout
const FETCH_TIMEOUT_SECS: u64 = 20;

/// Entries kept per poll per source
const MAX_ENTRIES_PER_POLL: usize = 50;

// ============================================================================
// TYPES
// ============================================================================

/// A registered feed source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub last_polled: Option<String>,
}

/// One parsed feed entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published: String,
}

/// Poll outcome per source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub source: String,
    pub fetched: usize,
    pub new_articles: usize,
    pub error: Option<String>,
}

// ============================================================================
// SOURCE MANAGEMENT
// ============================================================================

impl Store {
    /// Register a feed source. The URL is validated at registration time as
    /// well as at every poll.
    pub fn feed_source_add(&self, name: &str, url: &str, config: &Config) -> Result<FeedSource> {
        config
            .validate_url(url)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let id = short_id();
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT INTO news_feed_sources (id, name, url, active, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![id, name, url, now_iso()],
            )?;
        }
        self.feed_source(&id)?.ok_or_else(|| StoreError::NotFound(id))
    }

    /// Fetch one source row.
    pub fn feed_source(&self, id: &str) -> Result<Option<FeedSource>> {
        let conn = self.read()?;
        let source = conn
            .query_row(
                "SELECT id, name, url, active, last_polled FROM news_feed_sources WHERE id = ?1",
                [id],
                |row| {
                    Ok(FeedSource {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        url: row.get(2)?,
                        active: row.get::<_, i64>(3)? != 0,
                        last_polled: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(source)
    }

    /// All active sources.
    pub fn feed_sources(&self) -> Result<Vec<FeedSource>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, url, active, last_polled FROM news_feed_sources WHERE active = 1",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FeedSource {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                    last_polled: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Store parsed entries for a source, deduping on the content hash.
    /// Returns how many were new.
    pub fn store_feed_entries(&self, source_id: &str, entries: &[FeedEntry]) -> Result<usize> {
        let mut new_count = 0;
        let conn = self.write()?;
        for entry in entries {
            let hash = hex::encode(Sha256::digest(
                format!("{}|{}", entry.title, entry.url).as_bytes(),
            ));
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO news_feed_articles
                 (id, source_id, title, url, summary, content_hash, published_at, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    short_id(),
                    source_id,
                    entry.title,
                    entry.url,
                    entry.summary,
                    hash,
                    if entry.published.is_empty() { None } else { Some(entry.published.clone()) },
                    now_iso(),
                ],
            )?;
            new_count += inserted;
        }
        conn.execute(
            "UPDATE news_feed_sources SET last_polled = ?1 WHERE id = ?2",
            params![now_iso(), source_id],
        )?;
        Ok(new_count)
    }

    /// Articles fetched since `since` (RFC 3339), newest first.
    pub fn recent_articles(&self, since: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.read()?;
        let mut stmt = conn.prepare(
            "SELECT title, url FROM news_feed_articles
             WHERE fetched_at >= ?1 ORDER BY fetched_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

// ============================================================================
// POLLING
// ============================================================================

/// Poll every active source. Per-source failures are recorded, not raised.
pub fn poll_all(store: &Store, config: &Config) -> Result<Vec<PollResult>> {
    let sources = store.feed_sources()?;
    let mut results = Vec::with_capacity(sources.len());

    for source in sources {
        match poll_source(store, config, &source) {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!("Feed poll failed for {}: {}", source.name, e);
                results.push(PollResult {
                    source: source.name,
                    fetched: 0,
                    new_articles: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    Ok(results)
}

fn poll_source(store: &Store, config: &Config, source: &FeedSource) -> Result<PollResult> {
    config
        .validate_url(&source.url)
        .map_err(|e| StoreError::Validation(e.to_string()))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(concat!("jaybrain/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| StoreError::Init(format!("http client: {e}")))?;

    let body = client
        .get(&source.url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .map_err(|e| StoreError::Init(format!("fetch {}: {e}", source.url)))?;

    let entries = parse_feed(&body);
    let new_articles = store.store_feed_entries(&source.id, &entries)?;
    Ok(PollResult {
        source: source.name.clone(),
        fetched: entries.len(),
        new_articles,
        error: None,
    })
}

// ============================================================================
// FEED PARSING
// ============================================================================

/// Parse RSS `<item>` or Atom `<entry>` elements. Tolerant by design: bad
/// XML yields whatever was parsed before the error.
pub fn parse_feed(xml: &str) -> Vec<FeedEntry> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => current = Some(FeedEntry::default()),
                    b"title" if current.is_some() => field = Some("title"),
                    b"link" if current.is_some() => {
                        // Atom puts the URL in href; RSS in the element text
                        if let Some(entry) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"href" {
                                    entry.url = String::from_utf8_lossy(&attr.value).to_string();
                                }
                            }
                        }
                        field = Some("link");
                    }
                    b"description" | b"summary" if current.is_some() => field = Some("summary"),
                    b"pubDate" | b"published" | b"updated" if current.is_some() => {
                        field = Some("published")
                    }
                    _ => field = None,
                }
            }
            Ok(Event::Text(ref t)) => {
                if let (Some(entry), Some(field_name)) = (current.as_mut(), field) {
                    let text = t.unescape().unwrap_or_default().to_string();
                    match field_name {
                        "title" => entry.title = text,
                        "link" if entry.url.is_empty() => entry.url = text,
                        "summary" => entry.summary = text,
                        "published" => entry.published = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::CData(ref t)) => {
                if let (Some(entry), Some(field_name)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(t.as_ref()).to_string();
                    match field_name {
                        "title" => entry.title = text,
                        "summary" => entry.summary = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => {
                        if let Some(entry) = current.take() {
                            if !entry.title.is_empty() {
                                entries.push(entry);
                                if entries.len() >= MAX_ENTRIES_PER_POLL {
                                    break;
                                }
                            }
                        }
                    }
                    _ => field = None,
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!("Feed parse error, keeping partial result: {}", e);
                break;
            }
            _ => {}
        }
    }

    entries
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.store")).unwrap();
        (store, dir)
    }

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example Feed</title>
  <item>
    <title>First article</title>
    <link>https://example.com/1</link>
    <description>Summary one</description>
    <pubDate>Mon, 02 Mar 2026 10:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Second article</title>
    <link>https://example.com/2</link>
    <description><![CDATA[Summary <b>two</b>]]></description>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <entry>
    <title>Atom entry</title>
    <link href="https://example.com/atom-1"/>
    <summary>Atom summary</summary>
    <updated>2026-03-02T10:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let entries = parse_feed(RSS);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "First article");
        assert_eq!(entries[0].url, "https://example.com/1");
        assert_eq!(entries[0].summary, "Summary one");
        assert!(!entries[0].published.is_empty());
        assert!(entries[1].summary.contains("two"));
    }

    #[test]
    fn test_parse_atom_entries() {
        let entries = parse_feed(ATOM);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Atom entry");
        assert_eq!(entries[0].url, "https://example.com/atom-1");
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_feed("this is not xml at all").is_empty());
    }

    #[test]
    fn test_store_entries_dedups_by_hash() {
        let (store, _dir) = test_store();
        {
            // Insert the source row directly; the URL guard blocks example.com
            // only if DNS fails, so bypass registration in tests
            let conn = store.write().unwrap();
            conn.execute(
                "INSERT INTO news_feed_sources (id, name, url, active, created_at)
                 VALUES ('src1', 'Example', 'https://example.com/feed', 1, ?1)",
                [now_iso()],
            )
            .unwrap();
        }

        let entries = parse_feed(RSS);
        let first = store.store_feed_entries("src1", &entries).unwrap();
        assert_eq!(first, 2);
        let second = store.store_feed_entries("src1", &entries).unwrap();
        assert_eq!(second, 0);

        let source = store.feed_source("src1").unwrap().unwrap();
        assert!(source.last_polled.is_some());
    }

    #[test]
    fn test_source_add_rejects_private_url() {
        let (store, _dir) = test_store();
        let config = Config::from_env();
        assert!(store
            .feed_source_add("local", "http://127.0.0.1/feed", &config)
            .is_err());
    }
}
