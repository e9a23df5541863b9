//! Paginated message lists cached by query key.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use shared::{
    domain::{MessageId, MessageWithMember},
    protocol::MessagePage,
};

/// The cached result of an infinite (cursor-paged) query. `pages[0]` holds
/// the newest messages. `fetched` stays false while the entry only holds
/// messages seeded by socket events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfiniteMessages {
    pub pages: Vec<MessagePage>,
    pub fetched: bool,
}

impl InfiniteMessages {
    /// The newest server page, keeping any live messages it does not contain
    /// ahead of it.
    pub fn first_page(seeded: Option<&InfiniteMessages>, page: MessagePage) -> Self {
        let mut items: Vec<MessageWithMember> = seeded
            .into_iter()
            .flat_map(|seeded| seeded.pages.iter())
            .flat_map(|seeded| seeded.items.iter())
            .filter(|live| !page.items.iter().any(|item| item.id == live.id))
            .cloned()
            .collect();
        items.extend(page.items);

        Self {
            pages: vec![MessagePage {
                items,
                next_cursor: page.next_cursor,
            }],
            fetched: true,
        }
    }

    pub fn last_cursor(&self) -> Option<&MessageId> {
        self.pages.last().and_then(|page| page.next_cursor.as_ref())
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.pages
            .iter()
            .any(|page| page.items.iter().any(|item| &item.id == id))
    }

    pub fn message_count(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }
}

/// Shared cache handle. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<String, Arc<InfiniteMessages>>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_query_data(&self, key: &str) -> Option<Arc<InfiniteMessages>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Replaces the entry under `key` with whatever `updater` derives from the
    /// current value. Returning `None` removes the entry.
    pub fn set_query_data<F>(&self, key: &str, updater: F)
    where
        F: FnOnce(Option<&InfiniteMessages>) -> Option<InfiniteMessages>,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match updater(entries.get(key).map(Arc::as_ref)) {
            Some(next) => {
                entries.insert(key.to_string(), Arc::new(next));
            }
            None => {
                entries.remove(key);
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Arc<InfiniteMessages>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Stores a fetched page. The first one replaces whatever socket events
    /// seeded; later ones extend history.
    pub fn append_page(&self, key: &str, page: MessagePage) {
        self.set_query_data(key, |old| match old {
            Some(old) if old.fetched => {
                let mut next = old.clone();
                next.pages.push(page);
                Some(next)
            }
            seeded => Some(InfiniteMessages::first_page(seeded, page)),
        });
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Swaps in `message` wherever an item with the same id appears. An absent
/// or page-less entry is returned unchanged.
pub fn apply_message_update(
    old: Option<&InfiniteMessages>,
    message: &MessageWithMember,
) -> Option<InfiniteMessages> {
    let old = old?;
    if old.pages.is_empty() {
        return Some(old.clone());
    }

    let pages = old
        .pages
        .iter()
        .map(|page| MessagePage {
            items: page
                .items
                .iter()
                .map(|item| {
                    if item.id == message.id {
                        message.clone()
                    } else {
                        item.clone()
                    }
                })
                .collect(),
            next_cursor: page.next_cursor.clone(),
        })
        .collect();
    Some(InfiniteMessages {
        pages,
        fetched: old.fetched,
    })
}

/// Puts `message` at the head of the newest page, or seeds a one-page entry
/// when there is nothing cached yet. A message already cached is left alone.
pub fn apply_message_create(
    old: Option<&InfiniteMessages>,
    message: &MessageWithMember,
) -> Option<InfiniteMessages> {
    let Some(old) = old.filter(|old| !old.pages.is_empty()) else {
        return Some(InfiniteMessages {
            pages: vec![MessagePage {
                items: vec![message.clone()],
                next_cursor: None,
            }],
            fetched: false,
        });
    };
    if old.contains(&message.id) {
        return Some(old.clone());
    }

    let mut pages = old.pages.clone();
    pages[0].items.insert(0, message.clone());
    Some(InfiniteMessages {
        pages,
        fetched: old.fetched,
    })
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
