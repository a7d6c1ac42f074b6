use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use goods_core::{Good, GoodChanges, GoodId, NewGood, Pagination, Priority, ProjectId};

use super::{GoodsStore, StoreError};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<GoodId, Good>,
    last_id: i64,
}

impl Table {
    fn active_mut(&mut self, id: GoodId, project_id: ProjectId) -> Option<&mut Good> {
        self.rows
            .get_mut(&id)
            .filter(|g| g.project_id == project_id && g.is_active())
    }
}

/// In-memory primary store.
///
/// Intended for tests/dev. All writes of the whole store are serialized by one
/// mutex that is never held across an await point, which gives every mutation
/// the same all-or-nothing visibility a database transaction would.
///
/// `reads()` counts entity loads through `get`, so tests can tell whether a
/// lookup was served from the cache.
#[derive(Debug, Default)]
pub struct InMemoryGoodsStore {
    table: Mutex<Table>,
    reads: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryGoodsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls that reached the store.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `StoreError::Database`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every row, removed ones included (tests).
    pub fn snapshot(&self) -> Vec<Good> {
        self.table
            .lock()
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn with_table<T>(
        &self,
        f: impl FnOnce(&mut Table) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected store failure".to_string()));
        }
        let mut table = self
            .table
            .lock()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))?;
        f(&mut table)
    }
}

#[async_trait]
impl GoodsStore for InMemoryGoodsStore {
    async fn create(&self, new_good: NewGood) -> Result<Good, StoreError> {
        self.with_table(|table| {
            let max = table
                .rows
                .values()
                .filter(|g| g.project_id == new_good.project_id && g.is_active())
                .map(|g| g.priority.get())
                .max()
                .unwrap_or(0);
            let priority = max
                .checked_add(1)
                .ok_or(StoreError::PriorityOverflow(new_good.project_id.get()))?;

            table.last_id += 1;
            let good = Good {
                id: GoodId::from_raw(table.last_id),
                project_id: new_good.project_id,
                name: new_good.name,
                description: new_good.description,
                priority: Priority::from_raw(priority),
                removed: false,
                created_at: Utc::now(),
            };
            table.rows.insert(good.id, good.clone());
            Ok(good)
        })
    }

    async fn exists(&self, id: GoodId, project_id: ProjectId) -> Result<bool, StoreError> {
        self.with_table(|table| Ok(table.active_mut(id, project_id).is_some()))
    }

    async fn get(&self, id: GoodId, project_id: ProjectId) -> Result<Option<Good>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.with_table(|table| Ok(table.active_mut(id, project_id).map(|g| g.clone())))
    }

    async fn update(
        &self,
        id: GoodId,
        project_id: ProjectId,
        changes: GoodChanges,
    ) -> Result<Good, StoreError> {
        self.with_table(|table| {
            let good = table.active_mut(id, project_id).ok_or(StoreError::NotFound)?;
            good.name = changes.name;
            good.description = changes.description;
            Ok(good.clone())
        })
    }

    async fn mark_removed(&self, id: GoodId, project_id: ProjectId) -> Result<Good, StoreError> {
        self.with_table(|table| {
            let good = table.active_mut(id, project_id).ok_or(StoreError::NotFound)?;
            good.removed = true;
            Ok(good.clone())
        })
    }

    async fn reprioritize(
        &self,
        id: GoodId,
        project_id: ProjectId,
        new_priority: Priority,
    ) -> Result<Vec<Good>, StoreError> {
        self.with_table(|table| {
            if table.active_mut(id, project_id).is_none() {
                return Err(StoreError::NotFound);
            }

            let shifted = |good: &Good| {
                good.id != id
                    && good.project_id == project_id
                    && good.is_active()
                    && good.priority >= new_priority
            };
            // Check every shift before touching a row so a failure leaves no partial writes.
            if table
                .rows
                .values()
                .any(|g| shifted(g) && g.priority.next().is_none())
            {
                return Err(StoreError::PriorityOverflow(project_id.get()));
            }
            for good in table.rows.values_mut() {
                if shifted(good) {
                    if let Some(next) = good.priority.next() {
                        good.priority = next;
                    }
                }
            }
            if let Some(target) = table.active_mut(id, project_id) {
                target.priority = new_priority;
            }

            let mut affected: Vec<Good> = table
                .rows
                .values()
                .filter(|g| {
                    g.project_id == project_id && g.is_active() && g.priority >= new_priority
                })
                .cloned()
                .collect();
            affected.sort_by_key(|g| (g.priority, g.id));
            Ok(affected)
        })
    }

    async fn list(&self, page: Pagination) -> Result<Vec<Good>, StoreError> {
        self.with_table(|table| {
            let mut active: Vec<&Good> = table.rows.values().filter(|g| g.is_active()).collect();
            active.sort_by_key(|g| (g.project_id, g.priority, g.id));
            Ok(active
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .cloned()
                .collect())
        })
    }

    async fn total_count(&self) -> Result<u64, StoreError> {
        self.with_table(|table| Ok(table.rows.values().filter(|g| g.is_active()).count() as u64))
    }

    async fn removed_count(&self) -> Result<u64, StoreError> {
        self.with_table(|table| Ok(table.rows.values().filter(|g| g.removed).count() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: i64) -> ProjectId {
        ProjectId::from_raw(id)
    }

    async fn seed(store: &InMemoryGoodsStore, project_id: ProjectId, names: &[&str]) -> Vec<Good> {
        let mut out = Vec::new();
        for name in names {
            out.push(
                store
                    .create(NewGood::new(project_id, *name, "").unwrap())
                    .await
                    .unwrap(),
            );
        }
        out
    }

    fn priorities(store: &InMemoryGoodsStore, project_id: ProjectId) -> Vec<(i64, i64)> {
        let mut v: Vec<_> = store
            .snapshot()
            .into_iter()
            .filter(|g| g.project_id == project_id && g.is_active())
            .map(|g| (g.id.get(), g.priority.get()))
            .collect();
        v.sort();
        v
    }

    #[tokio::test]
    async fn creation_appends_after_the_highest_active_priority() {
        let store = InMemoryGoodsStore::new();
        let goods = seed(&store, project(1), &["a", "b", "c"]).await;
        let ranks: Vec<_> = goods.iter().map(|g| g.priority.get()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);

        // Priorities of other projects are independent.
        let other = seed(&store, project(2), &["x"]).await;
        assert_eq!(other[0].priority.get(), 1);

        // A removed top item frees its rank for the next creation.
        store.mark_removed(goods[2].id, project(1)).await.unwrap();
        let next = seed(&store, project(1), &["d"]).await;
        assert_eq!(next[0].priority.get(), 3);
    }

    #[tokio::test]
    async fn reprioritize_onto_occupied_rank_shifts_the_tail() {
        let store = InMemoryGoodsStore::new();
        let goods = seed(&store, project(1), &["a", "b", "c"]).await;
        let (a, b, c) = (goods[0].id, goods[1].id, goods[2].id);

        let affected = store
            .reprioritize(a, project(1), Priority::from_raw(3))
            .await
            .unwrap();

        let items: Vec<_> = affected.iter().map(|g| (g.id, g.priority.get())).collect();
        assert_eq!(items, vec![(a, 3), (c, 4)]);
        assert_eq!(
            priorities(&store, project(1)),
            vec![(a.get(), 3), (b.get(), 2), (c.get(), 4)]
        );
    }

    #[tokio::test]
    async fn reprioritize_leaves_other_projects_alone() {
        let store = InMemoryGoodsStore::new();
        let goods = seed(&store, project(1), &["a", "b"]).await;
        seed(&store, project(2), &["x", "y", "z"]).await;
        let before = priorities(&store, project(2));

        store
            .reprioritize(goods[1].id, project(1), Priority::from_raw(1))
            .await
            .unwrap();

        assert_eq!(priorities(&store, project(2)), before);
    }

    #[tokio::test]
    async fn missing_or_removed_targets_are_not_found_and_unchanged() {
        let store = InMemoryGoodsStore::new();
        let goods = seed(&store, project(1), &["a", "b"]).await;
        let before = priorities(&store, project(1));

        let err = store
            .reprioritize(GoodId::from_raw(99), project(1), Priority::from_raw(1))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);

        // Wrong project.
        let err = store
            .reprioritize(goods[0].id, project(2), Priority::from_raw(1))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert_eq!(priorities(&store, project(1)), before);

        store.mark_removed(goods[0].id, project(1)).await.unwrap();
        assert_eq!(
            store.mark_removed(goods[0].id, project(1)).await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            store
                .update(goods[0].id, project(1), GoodChanges::new("n", "d").unwrap())
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn list_pages_active_goods_in_rank_order() {
        let store = InMemoryGoodsStore::new();
        let goods = seed(&store, project(1), &["a", "b", "c", "d"]).await;
        store.mark_removed(goods[1].id, project(1)).await.unwrap();

        let page = store.list(Pagination { limit: 2, offset: 1 }).await.unwrap();
        let names: Vec<_> = page.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d"]);

        assert_eq!(store.total_count().await.unwrap(), 3);
        assert_eq!(store.removed_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ranks_near_the_top_of_i64_fail_without_poisoning_the_table() {
        let store = InMemoryGoodsStore::new();
        let goods = seed(&store, project(1), &["a", "b"]).await;

        store
            .reprioritize(goods[0].id, project(1), Priority::from_raw(i64::MAX))
            .await
            .unwrap();
        let err = store
            .create(NewGood::new(project(1), "c", "").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::PriorityOverflow(1));

        let before = priorities(&store, project(1));
        let err = store
            .reprioritize(goods[1].id, project(1), Priority::from_raw(i64::MAX))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::PriorityOverflow(1));
        assert_eq!(priorities(&store, project(1)), before);

        // Other projects keep working.
        let other = store
            .create(NewGood::new(project(2), "x", "").unwrap())
            .await
            .unwrap();
        assert_eq!(other.priority, Priority::from_raw(1));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_database_errors() {
        let store = InMemoryGoodsStore::new();
        store.set_failing(true);
        let err = store
            .create(NewGood::new(project(1), "a", "").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
