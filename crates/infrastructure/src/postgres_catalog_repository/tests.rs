use adrbac_application::{CatalogRepository, NewGroup, NewPermission, NewRole};
use adrbac_core::{AppError, GroupId, PermissionId};
use adrbac_domain::{Group, Permission, PermissionKey, Role};
use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresCatalogRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres catalog tests: {error}");
    }

    Some(pool)
}

fn unique_suffix() -> String {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string()
}

async fn group(
    repository: &PostgresCatalogRepository,
    slug: &str,
    parent_id: Option<GroupId>,
) -> Group {
    repository
        .create_group(NewGroup {
            name: slug.to_owned(),
            slug: format!("{slug}-{}", unique_suffix()),
            description: None,
            parent_id,
            is_system: false,
        })
        .await
        .unwrap_or_else(|error| panic!("failed to create group: {error}"))
}

async fn role(repository: &PostgresCatalogRepository, slug: &str) -> Role {
    repository
        .create_role(NewRole {
            name: slug.to_owned(),
            slug: format!("{slug}-{}", unique_suffix()),
            description: None,
            group_id: None,
            is_system: false,
        })
        .await
        .unwrap_or_else(|error| panic!("failed to create role: {error}"))
}

async fn permission(repository: &PostgresCatalogRepository, module: &str, action: &str) -> Permission {
    let key = PermissionKey::new(module, action).unwrap_or_else(|_| unreachable!());
    repository
        .create_permission(NewPermission {
            key,
            name: None,
            description: None,
            is_system: false,
        })
        .await
        .unwrap_or_else(|error| panic!("failed to create permission: {error}"))
}

#[tokio::test]
async fn reparenting_under_a_descendant_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresCatalogRepository::new(pool);
    let root = group(&repository, "root", None).await;
    let child = group(&repository, "child", Some(root.id)).await;
    let grandchild = group(&repository, "grandchild", Some(child.id)).await;

    let cycle = repository
        .set_group_parent(root.id, Some(grandchild.id))
        .await;
    assert!(matches!(cycle, Err(AppError::CircularReference(_))));

    let unchanged = repository
        .find_group(root.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(unchanged.and_then(|group| group.parent_id), None);

    let moved = repository
        .set_group_parent(grandchild.id, Some(root.id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(moved.parent_id, Some(root.id));
}

#[tokio::test]
async fn duplicate_slug_and_key_map_to_domain_errors() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresCatalogRepository::new(pool);
    let existing = role(&repository, "auditor").await;
    let duplicate_role = repository
        .create_role(NewRole {
            name: "Auditor".to_owned(),
            slug: existing.slug.clone(),
            description: None,
            group_id: None,
            is_system: false,
        })
        .await;
    assert!(matches!(duplicate_role, Err(AppError::Conflict(_))));

    let module = format!("Ledger{}", unique_suffix());
    let created = permission(&repository, module.as_str(), "post").await;
    assert_eq!(created.name, format!("Post {module}"));

    let duplicate_key = repository
        .create_permission(NewPermission {
            key: PermissionKey::new(module.as_str(), "POST").unwrap_or_else(|_| unreachable!()),
            name: None,
            description: None,
            is_system: false,
        })
        .await;
    assert!(matches!(
        duplicate_key,
        Err(AppError::DuplicatePermission { .. })
    ));
}

#[tokio::test]
async fn attach_and_detach_report_only_changed_links() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresCatalogRepository::new(pool);
    let module = format!("reports{}", unique_suffix());
    let read = permission(&repository, module.as_str(), "read").await;
    let export = permission(&repository, module.as_str(), "export").await;
    let analyst = role(&repository, "analyst").await;

    let attached = repository
        .attach_role_permissions(analyst.id, &[read.id])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(attached, vec![read.id]);

    let attached_again = repository
        .attach_role_permissions(analyst.id, &[read.id, export.id, export.id])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(attached_again, vec![export.id]);

    let dependents = repository
        .count_permission_dependents(read.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(dependents.roles, 1);

    let detached = repository
        .detach_role_permissions(analyst.id, &[read.id, PermissionId::new(i64::MAX)])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(detached, vec![read.id]);

    let remaining = repository
        .role_permission_ids(analyst.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(remaining, vec![export.id]);
}

#[tokio::test]
async fn soft_deleted_group_frees_its_slug_and_reports_dependents() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresCatalogRepository::new(pool);
    let parent = group(&repository, "ops", None).await;
    let child = group(&repository, "ops-oncall", Some(parent.id)).await;

    let dependents = repository
        .count_group_dependents(parent.id)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(dependents.child_groups, 1);
    assert_eq!(dependents.roles, 0);

    let deleted = repository.soft_delete_group(child.id).await;
    assert!(deleted.is_ok());
    assert!(
        repository
            .find_group(child.id)
            .await
            .unwrap_or_else(|_| unreachable!())
            .is_none()
    );

    let recreated = repository
        .create_group(NewGroup {
            name: "ops-oncall".to_owned(),
            slug: child.slug.clone(),
            description: None,
            parent_id: None,
            is_system: false,
        })
        .await;
    assert!(recreated.is_ok());
}
