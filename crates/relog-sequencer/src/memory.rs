use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, SequencerError};
use crate::event::{RepoEvent, Seq, SeqEvent};
use crate::source::EventSource;

/// In-memory event log.
///
/// Intended for tests and embedding. Events are held behind a `RwLock` and
/// cloned on read.
#[derive(Default)]
pub struct MemorySequencer {
    events: RwLock<Vec<SeqEvent>>,
}

impl MemorySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from events, numbering them `1..=n`.
    pub fn from_events(events: impl IntoIterator<Item = RepoEvent>) -> Self {
        let log = Self::new();
        for event in events {
            log.push(event);
        }
        log
    }

    /// Append an event with the next sequence number.
    pub fn push(&self, event: RepoEvent) -> Seq {
        let mut events = self.events.write().expect("lock poisoned");
        let seq = events.last().map_or(1, |e| e.seq + 1);
        events.push(SeqEvent::new(seq, event));
        seq
    }

    /// Append an already sequenced event. Sequence numbers may skip but must
    /// increase.
    pub fn insert(&self, event: SeqEvent) -> Result<()> {
        let mut events = self.events.write().expect("lock poisoned");
        if let Some(last) = events.last() {
            if event.seq <= last.seq {
                return Err(SequencerError::NonMonotonicSeq {
                    last: last.seq,
                    got: event.seq,
                });
            }
        }
        events.push(event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSource for MemorySequencer {
    async fn fetch_range(&self, after: Seq, limit: usize) -> Result<Vec<SeqEvent>> {
        let events = self.events.read().expect("lock poisoned");
        let start = events.partition_point(|e| e.seq <= after);
        Ok(events[start..].iter().take(limit).cloned().collect())
    }

    async fn last_seq(&self) -> Result<Option<Seq>> {
        Ok(self.events.read().expect("lock poisoned").last().map(|e| e.seq))
    }
}

impl std::fmt::Debug for MemorySequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySequencer")
            .field("event_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AccountEvt, AccountStatus};
    use proptest::prelude::*;
    use relog_types::AccountId;

    fn deleted(name: &str) -> RepoEvent {
        RepoEvent::Account(AccountEvt {
            account: AccountId::new(format!("did:plc:{name}")).unwrap(),
            status: AccountStatus::Deleted,
        })
    }

    #[tokio::test]
    async fn pages_through_log() {
        let log = MemorySequencer::from_events((0..5).map(|i| deleted(&format!("a{i}"))));
        let first = log.fetch_range(0, 2).await.unwrap();
        assert_eq!(first.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
        let second = log.fetch_range(2, 2).await.unwrap();
        assert_eq!(second.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
        let third = log.fetch_range(4, 2).await.unwrap();
        assert_eq!(third.len(), 1);
        assert!(log.fetch_range(5, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cursor_between_sparse_seqs() {
        let log = MemorySequencer::new();
        log.insert(SeqEvent::new(10, deleted("a"))).unwrap();
        log.insert(SeqEvent::new(20, deleted("b"))).unwrap();
        let page = log.fetch_range(15, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].seq, 20);
        assert_eq!(log.last_seq().await.unwrap(), Some(20));
    }

    #[test]
    fn insert_rejects_non_increasing() {
        let log = MemorySequencer::new();
        log.insert(SeqEvent::new(3, deleted("a"))).unwrap();
        assert!(matches!(
            log.insert(SeqEvent::new(3, deleted("b"))),
            Err(SequencerError::NonMonotonicSeq { last: 3, got: 3 })
        ));
    }

    #[tokio::test]
    async fn rereads_are_identical() {
        let log = MemorySequencer::from_events([deleted("a"), deleted("b")]);
        assert_eq!(
            log.fetch_range(0, 10).await.unwrap(),
            log.fetch_range(0, 10).await.unwrap()
        );
    }

    proptest! {
        #[test]
        fn paging_visits_every_event_once(
            gaps in proptest::collection::vec(1u64..5, 0..40),
            page in 1usize..8,
        ) {
            let log = MemorySequencer::new();
            let mut seq = 0;
            let mut expected = Vec::new();
            for (i, gap) in gaps.iter().enumerate() {
                seq += gap;
                log.insert(SeqEvent::new(seq, deleted(&format!("a{i}")))).unwrap();
                expected.push(seq);
            }

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let mut cursor = 0;
            let mut seen = Vec::new();
            loop {
                let batch = rt.block_on(log.fetch_range(cursor, page)).unwrap();
                if batch.is_empty() {
                    break;
                }
                prop_assert!(batch.len() <= page);
                cursor = batch.last().unwrap().seq;
                seen.extend(batch.iter().map(|e| e.seq));
            }
            prop_assert_eq!(seen, expected);
        }
    }
}
