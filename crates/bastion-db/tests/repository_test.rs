//! Integration tests for the Organization repository using in-memory SurrealDB.

use bastion_core::error::BastionError;
use bastion_core::models::organization::{CreateOrganization, UpdateOrganization};
use bastion_core::repository::{OrganizationRepository, Pagination};
use bastion_db::repository::SurrealOrganizationRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    bastion_db::run_migrations(&db).await.unwrap();
    db
}

fn org(name: &str, slug: &str) -> CreateOrganization {
    CreateOrganization {
        name: name.into(),
        slug: slug.into(),
        domain: None,
        settings: None,
    }
}

#[tokio::test]
async fn create_and_get_organization() {
    let repo = SurrealOrganizationRepository::new(setup().await);

    let created = repo.create(org("ACME Corp", "acme")).await.unwrap();
    assert_eq!(created.name, "ACME Corp");
    assert_eq!(created.slug, "acme");
    assert!(created.domain.is_none());
    assert!(created.settings.is_object());

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.slug, created.slug);
}

#[tokio::test]
async fn get_organization_by_slug() {
    let repo = SurrealOrganizationRepository::new(setup().await);

    let created = repo
        .create(CreateOrganization {
            domain: Some("acme.example.com".into()),
            settings: Some(serde_json::json!({ "theme": "dark" })),
            ..org("ACME", "acme")
        })
        .await
        .unwrap();

    let fetched = repo.get_by_slug("acme").await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.domain.as_deref(), Some("acme.example.com"));
    assert_eq!(fetched.settings["theme"], "dark");

    let missing = repo.get_by_slug("nope").await;
    assert!(matches!(missing, Err(BastionError::NotFound { .. })));
}

#[tokio::test]
async fn update_organization() {
    let repo = SurrealOrganizationRepository::new(setup().await);

    let created = repo
        .create(CreateOrganization {
            domain: Some("old.example.com".into()),
            ..org("Before", "update-test")
        })
        .await
        .unwrap();

    let updated = repo
        .update(
            created.id,
            UpdateOrganization {
                name: Some("After".into()),
                domain: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "After");
    assert_eq!(updated.slug, "update-test");
    assert!(updated.domain.is_none());
    assert!(updated.updated_at >= created.updated_at);
}

#[tokio::test]
async fn delete_organization() {
    let repo = SurrealOrganizationRepository::new(setup().await);

    let created = repo.create(org("Doomed", "doomed")).await.unwrap();
    repo.delete(created.id).await.unwrap();

    assert!(repo.get_by_id(created.id).await.is_err());
}

#[tokio::test]
async fn list_organizations_with_pagination() {
    let repo = SurrealOrganizationRepository::new(setup().await);

    for i in 0..5 {
        repo.create(org(&format!("Org {i}"), &format!("org-{i}")))
            .await
            .unwrap();
    }

    let page1 = repo
        .list(Pagination {
            offset: 0,
            limit: 3,
        })
        .await
        .unwrap();
    assert_eq!(page1.items.len(), 3);
    assert_eq!(page1.total, 5);

    let page2 = repo
        .list(Pagination {
            offset: 3,
            limit: 3,
        })
        .await
        .unwrap();
    assert_eq!(page2.items.len(), 2);
    assert_eq!(page2.total, 5);
}

#[tokio::test]
async fn duplicate_organization_slug_rejected() {
    let repo = SurrealOrganizationRepository::new(setup().await);

    repo.create(org("First", "dup")).await.unwrap();
    let result = repo.create(org("Second", "dup")).await;

    assert!(
        matches!(result, Err(BastionError::AlreadyExists { .. })),
        "duplicate slug should be rejected, got {result:?}"
    );
}
