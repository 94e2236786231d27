//! Typed, single-writer view over one record-store collection.

use parking_lot::Mutex;
use salon_core::{LoyaltyResult, RecordStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Collection keys used by the loyalty subsystem.
pub mod keys {
    pub const TIERS: &str = "loyalty_tiers";
    pub const MEMBERS: &str = "members";
    pub const PURCHASES: &str = "purchase_events";
    pub const REFERRALS: &str = "referral_ledger";
    pub const GRANTS: &str = "point_grants";
    pub const PLANS: &str = "membership_plans";
}

/// Every write holds `write_lock` across load, mutate and save, so two
/// writers can never interleave a read-modify-write of the same collection.
/// Readers do not take the lock; they see the last saved collection.
pub struct Collection<T> {
    store: Arc<dyn RecordStore>,
    workspace: String,
    key: &'static str,
    write_lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(
        store: Arc<dyn RecordStore>,
        workspace: impl Into<String>,
        key: &'static str,
    ) -> Self {
        Self {
            store,
            workspace: workspace.into(),
            key,
            write_lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn load(&self) -> LoyaltyResult<Vec<T>> {
        self.store
            .load_collection(&self.workspace, self.key)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }

    /// Read-modify-write under the writer lock. The collection is saved only
    /// when `apply` returns `Ok`; on error the stored collection is untouched.
    pub fn update<R>(
        &self,
        apply: impl FnOnce(&mut Vec<T>) -> LoyaltyResult<R>,
    ) -> LoyaltyResult<R> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let out = apply(&mut records)?;
        self.save_locked(&records)?;
        Ok(out)
    }

    /// Atomic whole-collection replace.
    pub fn replace(&self, records: &[T]) -> LoyaltyResult<()> {
        let _guard = self.write_lock.lock();
        self.save_locked(records)
    }

    fn save_locked(&self, records: &[T]) -> LoyaltyResult<()> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.save_collection(&self.workspace, self.key, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salon_core::store::InMemoryStore;
    use salon_core::LoyaltyError;

    fn collection(store: &Arc<InMemoryStore>) -> Collection<u32> {
        Collection::new(store.clone() as Arc<dyn RecordStore>, "ws", "numbers")
    }

    #[test]
    fn test_update_saves_on_ok() {
        let store = Arc::new(InMemoryStore::new());
        let numbers = collection(&store);
        numbers.update(|v| {
            v.push(1);
            v.push(2);
            Ok(())
        })
        .unwrap();
        assert_eq!(numbers.load().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let numbers = collection(&store);
        numbers.replace(&[7]).unwrap();

        let result: LoyaltyResult<()> = numbers.update(|v| {
            v.clear();
            v.push(99);
            Err(LoyaltyError::Validation("rejected".into()))
        });
        assert!(result.is_err());
        assert_eq!(numbers.load().unwrap(), vec![7]);
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_updates() {
        let store = Arc::new(InMemoryStore::new());
        let numbers = collection(&store);
        std::thread::scope(|s| {
            for i in 0..8u32 {
                let numbers = &numbers;
                s.spawn(move || {
                    for j in 0..25u32 {
                        numbers
                            .update(|v| {
                                v.push(i * 100 + j);
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(numbers.load().unwrap().len(), 200);
    }
}
