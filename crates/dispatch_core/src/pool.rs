//! Concurrency-safe entity storage keyed by id.
//!
//! An [`EntityPool`] owns one kind of entity and enforces its lifecycle
//! state machine on every status change. Each pool is linearizable on its
//! own; coordinating two pools is the dispatcher's job.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{DispatchError, DispatchResult};

/// A status enum with a transition table.
pub trait Lifecycle: Copy + Eq + Hash + fmt::Debug {
    fn can_transition_to(self, next: Self) -> bool;
    fn is_terminal(self) -> bool;
    fn name(self) -> &'static str;
}

/// An entity that can live in an [`EntityPool`].
pub trait PoolEntity: Clone {
    type Id: Copy + Ord + Hash + fmt::Display + From<u64> + Into<u64>;
    type Status: Lifecycle;

    /// Entity name used in error messages.
    const KIND: &'static str;

    fn id(&self) -> Self::Id;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status, now_ms: u64);
}

pub struct EntityPool<T: PoolEntity> {
    entities: RwLock<BTreeMap<T::Id, T>>,
    next_id: AtomicU64,
}

impl<T: PoolEntity> EntityPool<T> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<T::Id, T>> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<T::Id, T>> {
        self.entities.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a fresh id and store the entity built for it.
    ///
    /// Ids are monotonic per pool and never reused.
    pub fn insert(&self, build: impl FnOnce(T::Id) -> T) -> T::Id {
        let id = T::Id::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entity = build(id);
        self.write().insert(id, entity);
        id
    }

    pub fn get(&self, id: T::Id) -> Option<T> {
        self.read().get(&id).cloned()
    }

    /// Drop an entity outright. Only used to undo an insert that was never
    /// published; lifecycle endings go through [`EntityPool::update_status`].
    pub fn remove(&self, id: T::Id) -> Option<T> {
        self.write().remove(&id)
    }

    /// Current status, if the entity exists.
    pub fn status_of(&self, id: T::Id) -> Option<T::Status> {
        self.read().get(&id).map(PoolEntity::status)
    }

    /// Check a transition without applying it.
    pub fn check_transition(&self, id: T::Id, next: T::Status) -> DispatchResult<()> {
        let guard = self.read();
        let entity = guard
            .get(&id)
            .ok_or_else(|| DispatchError::StaleEntity(format!("{} {id} vanished", T::KIND)))?;
        ensure_transition::<T>(entity, next)
    }

    /// Apply a status change, rejecting transitions the state machine forbids.
    pub fn update_status(&self, id: T::Id, next: T::Status, now_ms: u64) -> DispatchResult<T> {
        let mut guard = self.write();
        let entity = guard
            .get_mut(&id)
            .ok_or_else(|| DispatchError::StaleEntity(format!("{} {id} vanished", T::KIND)))?;
        ensure_transition::<T>(entity, next)?;
        entity.set_status(next, now_ms);
        Ok(entity.clone())
    }

    /// Mutate non-status fields in place. Returns `None` for unknown ids.
    pub fn update<R>(&self, id: T::Id, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.write().get_mut(&id).map(f)
    }

    /// Entities with the given status, ordered by id.
    pub fn list_by_status(&self, status: T::Status) -> Vec<T> {
        self.read()
            .values()
            .filter(|entity| entity.status() == status)
            .cloned()
            .collect()
    }

    /// Every entity, ordered by id.
    pub fn snapshot(&self) -> Vec<T> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<T: PoolEntity> Default for EntityPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PoolEntity> fmt::Debug for EntityPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityPool")
            .field("kind", &T::KIND)
            .field("len", &self.len())
            .finish()
    }
}

fn ensure_transition<T: PoolEntity>(entity: &T, next: T::Status) -> DispatchResult<()> {
    let current = entity.status();
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(DispatchError::InvalidTransition {
            entity: T::KIND,
            id: entity.id().into(),
            from: current.name(),
            to: next.name(),
        })
    }
}
