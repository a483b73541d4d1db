//! Integration tests for the User repository using in-memory SurrealDB.

use bastion_core::error::BastionError;
use bastion_core::models::organization::CreateOrganization;
use bastion_core::models::role::CreateRole;
use bastion_core::models::user::{CreateUser, UpdateUser};
use bastion_core::repository::{
    OrganizationRepository, RoleRepository, TwoFactorRepository, UserRepository,
};
use bastion_db::repository::{
    SurrealOrganizationRepository, SurrealRoleRepository, SurrealTwoFactorRepository,
    SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

async fn setup() -> (Surreal<surrealdb::engine::local::Db>, Uuid) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    bastion_db::run_migrations(&db).await.unwrap();

    let org = SurrealOrganizationRepository::new(db.clone())
        .create(CreateOrganization {
            name: "Test Org".into(),
            slug: "test-org".into(),
            domain: None,
            settings: None,
        })
        .await
        .unwrap();

    (db, org.id)
}

fn user(organization_id: Option<Uuid>, email: &str) -> CreateUser {
    CreateUser {
        organization_id,
        email: email.into(),
        name: Some("Alice".into()),
        password_hash: "$argon2id$stub".into(),
    }
}

#[tokio::test]
async fn create_and_get_user() {
    let (db, org_id) = setup().await;
    let repo = SurrealUserRepository::new(db);

    let created = repo
        .create(user(Some(org_id), "alice@example.com"))
        .await
        .unwrap();

    assert_eq!(created.organization_id, Some(org_id));
    assert_eq!(created.email, "alice@example.com");
    assert_eq!(created.password_hash, "$argon2id$stub");
    assert!(!created.two_factor_enabled);
    assert!(created.two_factor_secret.is_none());

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn email_lookup_is_scoped_to_organization() {
    let (db, org_id) = setup().await;
    let repo = SurrealUserRepository::new(db);

    let scoped = repo
        .create(user(Some(org_id), "same@example.com"))
        .await
        .unwrap();
    let global = repo.create(user(None, "same@example.com")).await.unwrap();
    assert!(global.is_cross_tenant());

    let found = repo
        .get_by_email(Some(org_id), "same@example.com")
        .await
        .unwrap();
    assert_eq!(found.id, scoped.id);

    let found = repo.get_by_email(None, "same@example.com").await.unwrap();
    assert_eq!(found.id, global.id);
}

#[tokio::test]
async fn duplicate_email_in_organization_rejected() {
    let (db, org_id) = setup().await;
    let repo = SurrealUserRepository::new(db);

    repo.create(user(Some(org_id), "dup@example.com"))
        .await
        .unwrap();
    let result = repo.create(user(Some(org_id), "dup@example.com")).await;

    assert!(matches!(result, Err(BastionError::AlreadyExists { .. })));
}

#[tokio::test]
async fn update_user_fields() {
    let (db, org_id) = setup().await;
    let repo = SurrealUserRepository::new(db);

    let created = repo
        .create(user(Some(org_id), "bob@example.com"))
        .await
        .unwrap();

    let updated = repo
        .update(
            created.id,
            UpdateUser {
                name: Some(None),
                password_hash: Some("$argon2id$rotated".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.email, "bob@example.com");
    assert!(updated.name.is_none());
    assert_eq!(updated.password_hash, "$argon2id$rotated");
}

#[tokio::test]
async fn delete_user_removes_assignments_and_codes() {
    let (db, org_id) = setup().await;
    let users = SurrealUserRepository::new(db.clone());
    let roles = SurrealRoleRepository::new(db.clone());
    let two_factor = SurrealTwoFactorRepository::new(db.clone());

    let created = users
        .create(user(Some(org_id), "carol@example.com"))
        .await
        .unwrap();
    let role = roles
        .create(CreateRole {
            organization_id: Some(org_id),
            slug: "member".into(),
            name: "Member".into(),
            description: None,
            is_default: false,
        })
        .await
        .unwrap();
    roles.assign_to_user(created.id, role.id, None).await.unwrap();
    two_factor
        .enable(created.id, "SECRET".into(), vec!["AAAA111111".into()])
        .await
        .unwrap();

    users.delete(created.id).await.unwrap();

    assert!(users.get_by_id(created.id).await.is_err());
    assert!(roles.get_user_assignments(created.id).await.unwrap().is_empty());
    assert_eq!(two_factor.count_unused(created.id).await.unwrap(), 0);
    // The role itself survives.
    assert!(roles.get_by_id(role.id).await.is_ok());
}
