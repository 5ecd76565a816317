//! Recovery of test identity from rendered ticket bodies.
//!
//! The marker line written by the renderer is the only link between a ticket
//! and the catalog test it tracks. Changing [`ID_MARKER`] orphans every
//! ticket created by earlier runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::model::Ticket;

/// Fixed phrase preceding the test identifier in a ticket body.
pub const ID_MARKER: &str = "Secureframe ID";

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}: ([A-Za-z0-9_-]+)", regex::escape(ID_MARKER)))
        .expect("invalid identity marker pattern")
});

/// The line embedded in every rendered body for `test_id`.
#[must_use]
pub fn marker_line(test_id: &str) -> String {
    format!("{ID_MARKER}: {test_id}")
}

/// Return the first test identifier embedded in `body`, if any.
///
/// Identifiers are ASCII word characters and hyphens; the token ends at the
/// first other character.
#[must_use]
pub fn extract_test_id(body: &str) -> Option<&str> {
    ID_PATTERN
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Tickets keyed by the test ID recovered from their bodies.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    tickets: BTreeMap<String, Ticket>,
    unmarked: usize,
    duplicates: usize,
}

impl IdentityIndex {
    /// Index `tickets` by recovered test ID.
    ///
    /// Tickets without a marker are dropped. When several tickets carry the
    /// same ID, the most recently updated one is kept and ties go to the
    /// lowest issue number, so the result does not depend on listing order.
    #[must_use]
    pub fn build(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let mut index = Self::default();

        for ticket in tickets {
            let Some(test_id) = extract_test_id(&ticket.body).map(ToOwned::to_owned) else {
                index.unmarked += 1;
                continue;
            };

            match index.tickets.get(&test_id) {
                None => {
                    index.tickets.insert(test_id, ticket);
                }
                Some(current) => {
                    index.duplicates += 1;
                    let replace = prefer(&ticket, current);
                    let (keep, ignored) = if replace {
                        (ticket.number, current.number)
                    } else {
                        (current.number, ticket.number)
                    };
                    warn!(
                        test_id = %test_id,
                        keep,
                        ignored,
                        "multiple issues track the same test"
                    );
                    if replace {
                        index.tickets.insert(test_id, ticket);
                    }
                }
            }
        }

        index
    }

    #[must_use]
    pub fn get(&self, test_id: &str) -> Option<&Ticket> {
        self.tickets.get(test_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Tickets that carried no recognizable marker.
    #[must_use]
    pub const fn unmarked(&self) -> usize {
        self.unmarked
    }

    /// Tickets shadowed by another ticket with the same test ID.
    #[must_use]
    pub const fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Open tickets whose test ID is absent from `seen`, ordered by test ID.
    pub fn orphans<'a>(
        &'a self,
        seen: &'a HashSet<String>,
    ) -> impl Iterator<Item = (&'a str, &'a Ticket)> + 'a {
        self.tickets
            .iter()
            .filter(move |(id, ticket)| ticket.is_open() && !seen.contains(id.as_str()))
            .map(|(id, ticket)| (id.as_str(), ticket))
    }
}

fn prefer(candidate: &Ticket, current: &Ticket) -> bool {
    candidate.updated_at > current.updated_at
        || (candidate.updated_at == current.updated_at && candidate.number < current.number)
}
