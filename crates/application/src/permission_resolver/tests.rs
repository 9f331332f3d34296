use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use adrbac_core::{AppResult, EmployeeId, GroupId, PermissionId, RoleId};
use adrbac_domain::{AssignableRef, EffectivePermissionSet};

use crate::PermissionCache;
use crate::test_support::{FakePermissionCache, Fixture, InMemoryRbacStore};

use super::{PermissionResolver, PermissionResolverConfig};

const ALICE: EmployeeId = EmployeeId::new(1);

#[tokio::test]
async fn resolves_all_three_paths() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Permission(PermissionId::new(102)), None)
        .await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Role(RoleId::new(11)), None)
        .await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Group(GroupId::new(5)), None)
        .await;

    let permissions = fixture
        .resolver
        .effective_permissions(ALICE)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(
        permissions.into_vec(),
        vec!["posts.edit", "posts.publish", "posts.read"]
    );
}

#[tokio::test]
async fn duplicate_paths_collapse_to_one_permission() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Role(RoleId::new(10)), None)
        .await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Group(GroupId::new(5)), None)
        .await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Permission(PermissionId::new(100)), None)
        .await;

    let permissions = fixture
        .resolver
        .effective_permissions(ALICE)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(permissions.len(), 1);
}

#[tokio::test]
async fn expired_assignment_grants_nothing() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(
            1,
            AssignableRef::Role(RoleId::new(10)),
            Some(Utc::now() - Duration::minutes(1)),
        )
        .await;

    assert!(
        !fixture
            .resolver
            .has_permission(ALICE, "posts.edit")
            .await
            .unwrap_or_else(|_| unreachable!())
    );
}

#[tokio::test]
async fn cache_miss_populates_and_hit_skips_sources() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Role(RoleId::new(10)), None)
        .await;

    for _ in 0..3 {
        assert!(
            fixture
                .resolver
                .has_permission(ALICE, "posts.edit")
                .await
                .unwrap_or_else(|_| unreachable!())
        );
    }

    assert_eq!(fixture.store.breakdown_reads.load(Ordering::SeqCst), 1);
    assert!(
        fixture
            .cache
            .cached(ALICE)
            .await
            .is_some_and(|permissions| permissions.contains("posts.edit"))
    );
}

#[tokio::test]
async fn cache_read_failure_recomputes() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Role(RoleId::new(10)), None)
        .await;
    fixture.cache.fail_reads.store(true, Ordering::SeqCst);

    let granted = fixture.resolver.has_permission(ALICE, "posts.edit").await;
    assert!(matches!(granted, Ok(true)));
}

#[tokio::test]
async fn failed_invalidation_bypasses_stale_entry_until_recovered() {
    let fixture = Fixture::seeded().await;
    fixture
        .cache
        .seed(ALICE, ["posts.read"].into_iter().collect())
        .await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Role(RoleId::new(10)), None)
        .await;

    fixture.cache.fail_invalidations.store(true, Ordering::SeqCst);
    fixture.resolver.invalidate(ALICE).await;

    let edit = fixture.resolver.has_permission(ALICE, "posts.edit").await;
    let read = fixture.resolver.has_permission(ALICE, "posts.read").await;
    assert!(matches!(edit, Ok(true)));
    assert!(matches!(read, Ok(false)));

    fixture
        .cache
        .fail_invalidations
        .store(false, Ordering::SeqCst);
    let permissions = fixture
        .resolver
        .effective_permissions(ALICE)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(permissions.into_vec(), vec!["posts.edit"]);
    assert!(
        fixture
            .cache
            .cached(ALICE)
            .await
            .is_some_and(|cached| cached.contains("posts.edit"))
    );
}

#[tokio::test]
async fn any_and_all_use_set_semantics() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Role(RoleId::new(11)), None)
        .await;
    let none: [&str; 0] = [];

    let any = fixture
        .resolver
        .any_permission(ALICE, &["posts.edit", "posts.read"])
        .await;
    let all = fixture
        .resolver
        .all_permissions(ALICE, &["posts.edit", "posts.read"])
        .await;
    let any_empty = fixture.resolver.any_permission(ALICE, &none).await;
    let all_empty = fixture.resolver.all_permissions(ALICE, &none).await;

    assert!(matches!(any, Ok(true)));
    assert!(matches!(all, Ok(false)));
    assert!(matches!(any_empty, Ok(false)));
    assert!(matches!(all_empty, Ok(true)));
}

#[tokio::test]
async fn breakdown_groups_permissions_by_path() {
    let fixture = Fixture::seeded().await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Group(GroupId::new(5)), None)
        .await;
    fixture
        .store
        .insert_raw(1, AssignableRef::Permission(PermissionId::new(102)), None)
        .await;

    let breakdown = fixture
        .resolver
        .permission_breakdown(ALICE)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(breakdown.direct.len(), 1);
    assert!(breakdown.through_roles.is_empty());
    assert_eq!(breakdown.through_groups.len(), 1);
    assert_eq!(breakdown.through_groups[0].roles[0].role.slug, "editor");
}

/// Runs an invalidation for another employee while a set is being stored.
struct InterleavingCache {
    inner: FakePermissionCache,
    resolver: OnceLock<PermissionResolver>,
}

#[async_trait]
impl PermissionCache for InterleavingCache {
    async fn get(&self, employee_id: EmployeeId) -> AppResult<Option<EffectivePermissionSet>> {
        self.inner.get(employee_id).await
    }

    async fn put(
        &self,
        employee_id: EmployeeId,
        permissions: &EffectivePermissionSet,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        self.inner.put(employee_id, permissions, ttl_seconds).await?;
        if let Some(resolver) = self.resolver.get() {
            resolver.invalidate(EmployeeId::new(2)).await;
        }
        Ok(())
    }

    async fn invalidate(&self, employee_id: EmployeeId) -> AppResult<()> {
        self.inner.invalidate(employee_id).await
    }
}

#[tokio::test]
async fn set_stored_across_an_invalidation_is_dropped() {
    let store = Arc::new(InMemoryRbacStore::default());
    store.add_permission(100, "posts", "edit").await;
    store
        .insert_raw(1, AssignableRef::Permission(PermissionId::new(100)), None)
        .await;
    let cache = Arc::new(InterleavingCache {
        inner: FakePermissionCache::default(),
        resolver: OnceLock::new(),
    });
    let resolver = PermissionResolver::new(
        store.clone(),
        cache.clone(),
        PermissionResolverConfig::default(),
    );
    let _ = cache.resolver.set(resolver.clone());

    let granted = resolver.has_permission(ALICE, "posts.edit").await;

    assert!(matches!(granted, Ok(true)));
    assert!(cache.inner.cached(ALICE).await.is_none());
}

#[tokio::test]
async fn zero_ttl_disables_caching() {
    let store = Arc::new(InMemoryRbacStore::default());
    let cache = Arc::new(FakePermissionCache::default());
    let resolver = PermissionResolver::new(
        store.clone(),
        cache.clone(),
        PermissionResolverConfig {
            cache_ttl_seconds: 0,
        },
    );

    let _ = resolver.effective_permissions(ALICE).await;
    assert!(cache.cached(ALICE).await.is_none());
}
