//! Network Relationship Decay
//!
//! Contacts live as `person` entities in the knowledge graph, with contact
//! metadata (`last_contact`, `decay_threshold_days`, `contact_count`) in the
//! properties JSON. No extra tables.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::graph::EntityUpsert;
use crate::notify::Notifier;
use crate::storage::{Result, Store};

/// Default outreach threshold in days
pub const DEFAULT_DECAY_DAYS: i64 = 60;

// ============================================================================
// TYPES
// ============================================================================

/// One contact with computed staleness
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: String,
    pub company: String,
    pub role: String,
    pub contact_type: String,
    pub last_contact: DateTime<Utc>,
    pub days_since_contact: i64,
    pub threshold: i64,
    /// Positive means the contact is overdue
    pub overdue_by: i64,
    pub contact_count: i64,
    pub last_note: String,
}

/// Network health rollup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    pub total_contacts: usize,
    pub healthy_count: usize,
    pub stale_count: usize,
    pub contacts: Vec<Contact>,
    pub most_neglected: Option<Contact>,
}

/// Heartbeat outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCheck {
    pub triggered: bool,
    pub stale_count: usize,
    pub message: String,
}

// ============================================================================
// CONTACT OPS
// ============================================================================

/// Add a contact as a `person` entity. Merges into an existing entity of the
/// same name.
pub fn add_contact(
    store: &Store,
    name: &str,
    contact_type: &str,
    company: &str,
    role: &str,
    how_met: &str,
    decay_threshold_days: Option<i64>,
) -> Result<EntityUpsert> {
    let description = match (role.is_empty(), company.is_empty()) {
        (false, false) => format!("{role} at {company}"),
        (false, true) => role.to_string(),
        (true, false) => company.to_string(),
        (true, true) => String::new(),
    };
    let mut properties = serde_json::Map::new();
    properties.insert("contact_type".into(), json!(contact_type));
    properties.insert("company".into(), json!(company));
    properties.insert("role".into(), json!(role));
    properties.insert("how_met".into(), json!(how_met));
    properties.insert(
        "decay_threshold_days".into(),
        json!(decay_threshold_days.unwrap_or(DEFAULT_DECAY_DAYS)),
    );
    properties.insert("last_contact".into(), json!(Utc::now().to_rfc3339()));
    properties.insert("contact_count".into(), json!(0));

    store.add_entity(name, "person", &description, &[], &[], Some(&properties))
}

/// Record an interaction: bumps `last_contact` and `contact_count`.
/// Returns `None` when no matching contact exists.
pub fn log_interaction(store: &Store, name: &str, note: &str) -> Result<Option<EntityUpsert>> {
    let matches = store.search_entities(name, Some("person"), 5)?;
    if matches.is_empty() {
        return Ok(None);
    }
    let contact = matches
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
        .unwrap_or(&matches[0]);

    let contact_count = contact
        .properties
        .get("contact_count")
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        + 1;

    let mut update = serde_json::Map::new();
    update.insert("last_contact".into(), json!(Utc::now().to_rfc3339()));
    update.insert("contact_count".into(), json!(contact_count));
    if !note.is_empty() {
        update.insert("last_note".into(), json!(note));
    }

    store
        .add_entity(&contact.name, "person", "", &[], &[], Some(&update))
        .map(Some)
}

/// All contacts with contact metadata, most overdue first.
pub fn get_stale_contacts(store: &Store, threshold_override: Option<i64>) -> Result<Vec<Contact>> {
    let people = store.list_entities(Some("person"), 1000)?;
    let now = Utc::now();

    let mut contacts = Vec::new();
    for person in people {
        let Some(last_contact) = person
            .properties
            .get("last_contact")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
        else {
            continue;
        };

        let days_since = (now - last_contact).num_days();
        let threshold = threshold_override.unwrap_or_else(|| {
            person
                .properties
                .get("decay_threshold_days")
                .and_then(|v| v.as_i64())
                .unwrap_or(DEFAULT_DECAY_DAYS)
        });

        let get_str = |key: &str| {
            person
                .properties
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        contacts.push(Contact {
            name: person.name.clone(),
            company: get_str("company"),
            role: get_str("role"),
            contact_type: get_str("contact_type"),
            last_contact,
            days_since_contact: days_since,
            threshold,
            overdue_by: days_since - threshold,
            contact_count: person
                .properties
                .get("contact_count")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            last_note: get_str("last_note"),
        });
    }

    contacts.sort_by_key(|c| std::cmp::Reverse(c.overdue_by));
    Ok(contacts)
}

/// Health summary: totals plus the most neglected contact.
pub fn get_network_health(store: &Store) -> Result<NetworkHealth> {
    let contacts = get_stale_contacts(store, None)?;
    let stale: Vec<&Contact> = contacts.iter().filter(|c| c.overdue_by > 0).collect();
    let most_neglected = stale.first().map(|c| (*c).clone());
    Ok(NetworkHealth {
        total_contacts: contacts.len(),
        healthy_count: contacts.len() - stale.len(),
        stale_count: stale.len(),
        most_neglected,
        contacts,
    })
}

/// Weekly heartbeat: nudge about overdue contacts.
pub fn check_network_decay(store: &Store, notifier: &dyn Notifier) -> Result<NetworkCheck> {
    let contacts = get_stale_contacts(store, None)?;
    let overdue: Vec<&Contact> = contacts.iter().filter(|c| c.overdue_by > 0).collect();

    if overdue.is_empty() {
        return Ok(NetworkCheck {
            triggered: false,
            stale_count: 0,
            message: String::new(),
        });
    }

    let mut lines = vec![format!("{} contact(s) need attention:", overdue.len())];
    for contact in overdue.iter().take(5) {
        let company = if contact.company.is_empty() {
            String::new()
        } else {
            format!(" ({})", contact.company)
        };
        lines.push(format!(
            "  - {}{company}, {} days overdue",
            contact.name, contact.overdue_by
        ));
    }
    if overdue.len() > 5 {
        lines.push(format!("  ...and {} more", overdue.len() - 5));
    }

    let message = lines.join("\n");
    crate::heartbeat::dispatch_notification(store, notifier, "network_decay", &message);
    Ok(NetworkCheck {
        triggered: true,
        stale_count: overdue.len(),
        message,
    })
}

// ============================================================================
// TESTS
// ============================================================================
