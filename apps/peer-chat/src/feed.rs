//! Polling feed over the message table for one conversation.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chatstore::{Filter, MessageRow, Query, RowId, Store, MESSAGES_TABLE};
use realtime::{Feed, LinkEvent};
use tokio::sync::{mpsc, Mutex};

pub struct PollingFeed<S> {
    store: S,
    user: String,
    peer: String,
    interval: Duration,
    // Survives reconnects so a resumed feed does not replay history.
    cursor: Mutex<Cursor>,
}

/// Newest `created_at` emitted so far and the ids stamped with it.
#[derive(Debug, Default)]
struct Cursor {
    newest: Option<String>,
    at_newest: HashSet<RowId>,
}

impl Cursor {
    /// True when `msg` has not been emitted yet; moves the cursor forward.
    fn advance(&mut self, msg: &MessageRow) -> bool {
        let Some(stamp) = msg.created_at.as_deref() else {
            return false;
        };
        match self.newest.as_deref().map(|newest| stamp.cmp(newest)) {
            Some(Ordering::Less) => false,
            Some(Ordering::Equal) => self.at_newest.insert(msg.id.clone()),
            Some(Ordering::Greater) | None => {
                self.newest = Some(stamp.to_owned());
                self.at_newest.clear();
                self.at_newest.insert(msg.id.clone());
                true
            }
        }
    }
}

impl<S: Store> PollingFeed<S> {
    pub fn new(store: S, user: &str, peer: &str, interval: Duration) -> Self {
        Self {
            store,
            user: user.to_owned(),
            peer: peer.to_owned(),
            interval,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// Rows at or after the cursor; ties are settled by id in `advance`.
    async fn query(&self) -> Query {
        let query = Query::new()
            .filter(MessageRow::conversation_filter(&self.user, &self.peer))
            .order_asc("created_at");
        let newest = self.cursor.lock().await.newest.clone();
        match newest {
            Some(newest) => query.filter(Filter::gte("created_at", newest)),
            None => query,
        }
    }
}

#[async_trait]
impl<S: Store> Feed for PollingFeed<S> {
    type Item = MessageRow;

    async fn open(&self, events: mpsc::Sender<LinkEvent<MessageRow>>) {
        let mut subscribed = false;
        loop {
            if events.is_closed() {
                return;
            }
            let query = self.query().await;
            let rows = match self.store.fetch(MESSAGES_TABLE, &query).await {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = events.send(LinkEvent::Error(e.to_string())).await;
                    return;
                }
            };
            if !subscribed {
                subscribed = true;
                if events.send(LinkEvent::Subscribed).await.is_err() {
                    return;
                }
            }
            for raw in &rows {
                let msg = match MessageRow::from_row(raw) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping undecodable row");
                        continue;
                    }
                };
                if msg.created_at.is_none() {
                    tracing::debug!(id = %msg.id, "skipping row without created_at");
                    continue;
                }
                if !self.cursor.lock().await.advance(&msg) {
                    continue;
                }
                if events.send(LinkEvent::Message(msg)).await.is_err() {
                    return;
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
