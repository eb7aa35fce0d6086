//! Cascade resolver: an ordered fallback chain over other resolvers.
//!
//! Members are queried strictly in configured order and the first record
//! wins; this is a short-circuiting fallback chain, not a merging
//! aggregator. Every member after the first is queried with the fallback
//! flag raised, whether or not the first actually failed. Member
//! lifecycles belong to their owner; the cascade only dispatches lookup
//! and refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::record::GeoRecord;
use crate::resolver::{Resolver, CASCADE_SOURCE};

pub struct CascadeResolver {
    members: Vec<Arc<dyn Resolver>>,
    stop_on_error: bool,
}

impl CascadeResolver {
    pub fn new(stop_on_error: bool, members: Vec<Arc<dyn Resolver>>) -> Self {
        CascadeResolver {
            members,
            stop_on_error,
        }
    }
}

#[async_trait]
impl Resolver for CascadeResolver {
    fn name(&self) -> &str {
        CASCADE_SOURCE
    }

    async fn start(&self) -> Result<()> {
        // members are already started by their owner
        Ok(())
    }

    async fn lookup(&self, address: &str, _as_fallback: bool) -> Result<Option<GeoRecord>> {
        for (index, member) in self.members.iter().enumerate() {
            match member.lookup(address, index != 0).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => continue,
                Err(err) if self.stop_on_error => return Err(err),
                Err(err) => {
                    warn!(source = member.name(), %err, "lookup failed, moving on to the next source");
                }
            }
        }
        Ok(None)
    }

    async fn refresh(&self) -> Result<()> {
        for member in &self.members {
            member.refresh().await?;
        }
        Ok(())
    }

    async fn shutdown(&self) {
        // members are shut down by their owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoError;
    use std::sync::Mutex;

    enum Reply {
        Found,
        NotFound,
        Fail,
    }

    struct MockResolver {
        name: &'static str,
        reply: Reply,
        refresh_fails: bool,
        /// `as_fallback` values this member was queried with.
        lookups: Mutex<Vec<bool>>,
        refreshes: Mutex<u32>,
    }

    impl MockResolver {
        fn new(name: &'static str, reply: Reply) -> Arc<Self> {
            Arc::new(MockResolver {
                name,
                reply,
                refresh_fails: false,
                lookups: Mutex::new(Vec::new()),
                refreshes: Mutex::new(0),
            })
        }

        fn failing_refresh(name: &'static str) -> Arc<Self> {
            Arc::new(MockResolver {
                name,
                reply: Reply::NotFound,
                refresh_fails: true,
                lookups: Mutex::new(Vec::new()),
                refreshes: Mutex::new(0),
            })
        }

        fn lookup_flags(&self) -> Vec<bool> {
            self.lookups.lock().unwrap().clone()
        }

        fn refresh_count(&self) -> u32 {
            *self.refreshes.lock().unwrap()
        }
    }

    #[async_trait]
    impl Resolver for MockResolver {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn lookup(&self, address: &str, as_fallback: bool) -> Result<Option<GeoRecord>> {
            self.lookups.lock().unwrap().push(as_fallback);
            match self.reply {
                Reply::Found => Ok(Some(GeoRecord::new(address, self.name, as_fallback))),
                Reply::NotFound => Ok(None),
                Reply::Fail => Err(GeoError::SourceRead("corrupt index".to_string())),
            }
        }

        async fn refresh(&self) -> Result<()> {
            *self.refreshes.lock().unwrap() += 1;
            if self.refresh_fails {
                Err(GeoError::Configuration("refresh broken".to_string()))
            } else {
                Ok(())
            }
        }

        async fn shutdown(&self) {}
    }

    fn cascade_of(
        stop_on_error: bool,
        members: &[Arc<MockResolver>],
    ) -> CascadeResolver {
        CascadeResolver::new(
            stop_on_error,
            members
                .iter()
                .map(|m| Arc::clone(m) as Arc<dyn Resolver>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let a = MockResolver::new("a", Reply::Found);
        let b = MockResolver::new("b", Reply::Found);
        let cascade = cascade_of(true, &[Arc::clone(&a), Arc::clone(&b)]);

        let record = cascade.lookup("192.0.2.1", false).await.unwrap().unwrap();
        assert_eq!(record.source, "a");
        assert!(!record.is_fallback);
        assert_eq!(a.lookup_flags(), vec![false]);
        assert!(b.lookup_flags().is_empty(), "second member must not be queried");
    }

    #[tokio::test]
    async fn test_second_member_answers_as_fallback() {
        let a = MockResolver::new("a", Reply::NotFound);
        let b = MockResolver::new("b", Reply::Found);
        let cascade = cascade_of(true, &[Arc::clone(&a), Arc::clone(&b)]);

        let record = cascade.lookup("192.0.2.1", false).await.unwrap().unwrap();
        assert_eq!(record.source, "b");
        assert!(record.is_fallback);
        assert_eq!(a.lookup_flags(), vec![false]);
        assert_eq!(b.lookup_flags(), vec![true]);
    }

    #[tokio::test]
    async fn test_stop_on_error_propagates_and_halts() {
        let a = MockResolver::new("a", Reply::Fail);
        let b = MockResolver::new("b", Reply::Found);
        let cascade = cascade_of(true, &[Arc::clone(&a), Arc::clone(&b)]);

        let err = cascade.lookup("192.0.2.1", false).await.unwrap_err();
        assert!(matches!(err, GeoError::SourceRead(_)));
        assert!(b.lookup_flags().is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_continues_past_a_broken_member() {
        let a = MockResolver::new("a", Reply::Fail);
        let b = MockResolver::new("b", Reply::Found);
        let cascade = cascade_of(false, &[Arc::clone(&a), Arc::clone(&b)]);

        let record = cascade.lookup("192.0.2.1", false).await.unwrap().unwrap();
        assert_eq!(record.source, "b");
        assert!(record.is_fallback);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_not_found() {
        let a = MockResolver::new("a", Reply::NotFound);
        let b = MockResolver::new("b", Reply::NotFound);
        let cascade = cascade_of(false, &[Arc::clone(&a), Arc::clone(&b)]);

        assert!(cascade.lookup("192.0.2.1", false).await.unwrap().is_none());
        assert_eq!(a.lookup_flags(), vec![false]);
        assert_eq!(b.lookup_flags(), vec![true]);
    }

    #[tokio::test]
    async fn test_refresh_forwards_in_order_and_aborts_on_failure() {
        let a = MockResolver::new("a", Reply::NotFound);
        let b = MockResolver::failing_refresh("b");
        let c = MockResolver::new("c", Reply::NotFound);
        let cascade = cascade_of(false, &[Arc::clone(&a), Arc::clone(&b), Arc::clone(&c)]);

        assert!(cascade.refresh().await.is_err());
        assert_eq!(a.refresh_count(), 1);
        assert_eq!(b.refresh_count(), 1);
        assert_eq!(c.refresh_count(), 0, "refresh must abort at the first failure");
    }
}
