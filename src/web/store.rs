//! In-memory session storage with a size cap.
//!
//! Each session can carry a whole generated PNG, so records are swept once
//! they expire and the store never holds more than `max_sessions` of them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store;
use tower_sessions::{ExpiredDeletion, SessionStore};
use tracing::debug;

#[derive(Clone, Debug)]
pub(crate) struct PageStore {
    records: Arc<Mutex<HashMap<Id, Record>>>,
    max_sessions: usize,
}

impl PageStore {
    pub(crate) fn new(max_sessions: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

fn is_active(record: &Record, now: OffsetDateTime) -> bool {
    record.expiry_date > now
}

/// Makes room for one more record, dropping expired ones first and then the
/// ones that would expire soonest.
fn make_room(records: &mut HashMap<Id, Record>, max_sessions: usize) {
    let now = OffsetDateTime::now_utc();
    records.retain(|_, record| is_active(record, now));
    while records.len() >= max_sessions {
        let Some(oldest) = records
            .values()
            .min_by_key(|record| record.expiry_date)
            .map(|record| record.id)
        else {
            break;
        };
        debug!("Session store full, dropping session {}", oldest);
        records.remove(&oldest);
    }
}

#[async_trait]
impl SessionStore for PageStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.records.lock().await;
        make_room(&mut records, self.max_sessions);
        while records.contains_key(&record.id) {
            record.id = Id::default();
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let mut records = self.records.lock().await;
        if !records.contains_key(&record.id) {
            make_room(&mut records, self.max_sessions);
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.lock().await;
        if records
            .get(session_id)
            .is_some_and(|record| !is_active(record, now))
        {
            records.remove(session_id);
        }
        Ok(records.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.records.lock().await.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for PageStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| is_active(record, now));
        if records.len() < before {
            debug!("Swept {} expired sessions", before - records.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn record(expires_in: Duration) -> Record {
        Record {
            id: Id::default(),
            data: Default::default(),
            expiry_date: OffsetDateTime::now_utc() + expires_in,
        }
    }

    #[tokio::test]
    async fn sweep_drops_expired_sessions() {
        let store = PageStore::new(16);
        let mut live = record(Duration::minutes(30));
        store.create(&mut live).await.unwrap();
        store.save(&record(Duration::seconds(-1))).await.unwrap();
        assert_eq!(store.len().await, 2);

        store.delete_expired().await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(&live.id).await.unwrap(), Some(live));
    }

    #[tokio::test]
    async fn loading_an_expired_session_forgets_it() {
        let store = PageStore::new(16);
        let stale = record(Duration::seconds(-1));
        store.save(&stale).await.unwrap();

        assert_eq!(store.load(&stale.id).await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn full_store_drops_the_session_closest_to_expiry() {
        let store = PageStore::new(2);
        let mut first = record(Duration::minutes(10));
        let mut second = record(Duration::minutes(20));
        let mut third = record(Duration::minutes(30));
        for entry in [&mut first, &mut second, &mut third] {
            store.create(entry).await.unwrap();
        }

        assert_eq!(store.len().await, 2);
        assert_eq!(store.load(&first.id).await.unwrap(), None);
        assert!(store.load(&second.id).await.unwrap().is_some());
        assert!(store.load(&third.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn saving_a_known_session_never_evicts() {
        let store = PageStore::new(2);
        let mut first = record(Duration::minutes(10));
        let mut second = record(Duration::minutes(20));
        store.create(&mut first).await.unwrap();
        store.create(&mut second).await.unwrap();

        first.expiry_date = OffsetDateTime::now_utc() + Duration::minutes(40);
        store.save(&first).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.load(&second.id).await.unwrap().is_some());
    }
}
