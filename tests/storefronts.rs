mod support;

use std::collections::HashSet;
use std::sync::Arc;

use reseller_payment_server::{
    db::Database,
    error::AppError,
    models::{
        store::{CreateStoreRequest, StoreSettingsPatch, StoreStatus, UpdateDomainRequest},
        user::{AccountStatus, Role, User},
    },
    services::{
        store_service,
        subdomain::{MAX_ALLOCATION_ATTEMPTS, allocate_subdomain},
    },
};
use support::{Harness, principal, seed_reseller, seed_user, settings};

fn named(name: &str) -> CreateStoreRequest {
    CreateStoreRequest {
        name: name.to_string(),
        description: None,
        settings: StoreSettingsPatch::default(),
    }
}

async fn open_store(h: &Harness, owner: &User, name: &str) -> String {
    store_service::create_store(h.db.as_ref(), &principal(owner), named(name))
        .await
        .unwrap()
        .subdomain
}

#[tokio::test]
async fn taken_subdomain_gets_next_counter() {
    let h = Harness::new();
    let first = seed_reseller(&h.db, "first@example.com", 0).await;
    let second = seed_reseller(&h.db, "second@example.com", 0).await;

    assert_eq!(open_store(&h, &first, "My Shop").await, "my-shop");
    assert_eq!(open_store(&h, &second, "My Shop!!").await, "my-shop1");
}

#[tokio::test]
async fn new_store_is_active_with_default_settings() {
    let h = Harness::new();
    let owner = seed_user(&h.db, "new@example.com", Role::Reseller, AccountStatus::Pending).await;

    let store = store_service::create_store(
        h.db.as_ref(),
        &principal(&owner),
        CreateStoreRequest {
            name: "  Gamer Zone ".to_string(),
            description: Some("Diamonds and UC".to_string()),
            settings: StoreSettingsPatch {
                default_markup: Some(15.0),
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();

    assert_eq!(store.name, "Gamer Zone");
    assert_eq!(store.subdomain, "gamer-zone");
    assert_eq!(store.status, StoreStatus::Active);
    assert_eq!(store.settings.default_markup, 15.0);
    assert_eq!(store.settings.minimum_markup, 10.0);
    assert_eq!(store.settings.maximum_markup, 50.0);
    assert!(store.custom_domain.is_none());

    let fetched = store_service::get_store(h.db.as_ref(), &principal(&owner))
        .await
        .unwrap();
    assert_eq!(fetched.id, store.id);
}

#[tokio::test]
async fn one_store_per_reseller() {
    let h = Harness::new();
    let owner = seed_reseller(&h.db, "owner@example.com", 0).await;
    open_store(&h, &owner, "First").await;

    let err = store_service::create_store(h.db.as_ref(), &principal(&owner), named("Second"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.db.stores().await.len(), 1);
}

#[tokio::test]
async fn unusable_names_are_rejected() {
    let h = Harness::new();
    let owner = seed_reseller(&h.db, "owner@example.com", 0).await;

    let too_long = "x".repeat(51);
    for name in ["!!!", "", too_long.as_str()] {
        let err = store_service::create_store(h.db.as_ref(), &principal(&owner), named(name))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{name:?}");
    }
    assert!(h.db.stores().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_are_distinct() {
    let h = Arc::new(Harness::new());
    let mut owners = Vec::new();
    for i in 0..8 {
        owners.push(seed_reseller(&h.db, &format!("r{i}@example.com"), 0).await);
    }

    let mut tasks = tokio::task::JoinSet::new();
    for owner in owners {
        let h = h.clone();
        tasks.spawn(async move { open_store(&h, &owner, "Top Up BD").await });
    }

    let mut subdomains = HashSet::new();
    while let Some(result) = tasks.join_next().await {
        assert!(subdomains.insert(result.unwrap()));
    }
    assert_eq!(subdomains.len(), 8);
    assert!(subdomains.contains("top-up-bd"));
}

#[tokio::test]
async fn allocation_gives_up_after_bounded_attempts() {
    let h = Harness::new();
    for i in 0..MAX_ALLOCATION_ATTEMPTS {
        let owner = seed_reseller(&h.db, &format!("r{i}@example.com"), 0).await;
        open_store(&h, &owner, "busy").await;
    }
    let late = seed_reseller(&h.db, "late@example.com", 0).await;

    let err = store_service::create_store(h.db.as_ref(), &principal(&late), named("busy"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AllocationExhausted));

    // A different base is unaffected
    let mut tx = h.db.begin().await.unwrap();
    assert_eq!(
        allocate_subdomain(&mut *tx, "quiet", None).await.unwrap(),
        "quiet"
    );
}

#[tokio::test]
async fn custom_domain_issues_dns_challenge() {
    let h = Harness::new();
    let owner = seed_reseller(&h.db, "owner@example.com", 0).await;
    open_store(&h, &owner, "Gamer Zone").await;

    let store = store_service::update_domain_settings(
        h.db.as_ref(),
        &settings(),
        &principal(&owner),
        UpdateDomainRequest {
            subdomain: None,
            custom_domain: Some("Shop.GamerZone.bd".to_string()),
        },
    )
    .await
    .unwrap();

    assert_eq!(store.custom_domain.as_deref(), Some("shop.gamerzone.bd"));
    assert!(!store.custom_domain_verified);
    let challenge = store.dns_challenge.clone().unwrap();
    assert_eq!(challenge.a_record, "203.0.113.10");
    assert_eq!(challenge.cname_record, "stores.topup.test");
    assert_eq!(challenge.verification_token.len(), 32);
    assert!(challenge.verification_token.chars().all(|c| c.is_ascii_hexdigit()));

    // Posting the same domain keeps its challenge
    let again = store_service::update_domain_settings(
        h.db.as_ref(),
        &settings(),
        &principal(&owner),
        UpdateDomainRequest {
            subdomain: None,
            custom_domain: Some("shop.gamerzone.bd".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(again.dns_challenge, Some(challenge.clone()));

    // A different domain gets a fresh one
    let moved = store_service::update_domain_settings(
        h.db.as_ref(),
        &settings(),
        &principal(&owner),
        UpdateDomainRequest {
            subdomain: None,
            custom_domain: Some("gamerzone.com.bd".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(moved.custom_domain.as_deref(), Some("gamerzone.com.bd"));
    assert_ne!(
        moved.dns_challenge.unwrap().verification_token,
        challenge.verification_token
    );

    // Empty removes it
    let removed = store_service::update_domain_settings(
        h.db.as_ref(),
        &settings(),
        &principal(&owner),
        UpdateDomainRequest {
            subdomain: None,
            custom_domain: Some(String::new()),
        },
    )
    .await
    .unwrap();
    assert!(removed.custom_domain.is_none());
    assert!(removed.dns_challenge.is_none());
}

#[tokio::test]
async fn domains_must_be_valid_and_free() {
    let h = Harness::new();
    let first = seed_reseller(&h.db, "first@example.com", 0).await;
    let second = seed_reseller(&h.db, "second@example.com", 0).await;
    open_store(&h, &first, "Alpha").await;
    open_store(&h, &second, "Beta").await;

    store_service::update_domain_settings(
        h.db.as_ref(),
        &settings(),
        &principal(&first),
        UpdateDomainRequest {
            subdomain: None,
            custom_domain: Some("alpha.example.com".to_string()),
        },
    )
    .await
    .unwrap();

    let cases = [
        (None, Some("alpha.example.com"), "conflict"),
        (None, Some("https://beta.example.com"), "validation"),
        (None, Some("beta.example.com."), "validation"),
        (Some("alpha"), None, "conflict"),
        (Some("-beta"), None, "validation"),
    ];
    for (subdomain, custom_domain, expected) in cases {
        let err = store_service::update_domain_settings(
            h.db.as_ref(),
            &settings(),
            &principal(&second),
            UpdateDomainRequest {
                subdomain: subdomain.map(str::to_string),
                custom_domain: custom_domain.map(str::to_string),
            },
        )
        .await
        .unwrap_err();
        match expected {
            "conflict" => assert!(matches!(err, AppError::Conflict(_)), "{err}"),
            _ => assert!(matches!(err, AppError::Validation(_)), "{err}"),
        }
    }

    let beta = store_service::get_store(h.db.as_ref(), &principal(&second))
        .await
        .unwrap();
    assert_eq!(beta.subdomain, "beta");
    assert!(beta.custom_domain.is_none());

    // Its own current subdomain is not a clash
    let renamed = store_service::update_domain_settings(
        h.db.as_ref(),
        &settings(),
        &principal(&second),
        UpdateDomainRequest {
            subdomain: Some("Beta-Store".to_string()),
            custom_domain: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.subdomain, "beta-store");
}

#[tokio::test]
async fn settings_update_keeps_markups_ordered() {
    let h = Harness::new();
    let owner = seed_reseller(&h.db, "owner@example.com", 0).await;
    open_store(&h, &owner, "Shop").await;

    let err = store_service::update_store_settings(
        h.db.as_ref(),
        &principal(&owner),
        StoreSettingsPatch {
            default_markup: Some(80.0),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let store = store_service::update_store_settings(
        h.db.as_ref(),
        &principal(&owner),
        StoreSettingsPatch {
            default_markup: Some(80.0),
            maximum_markup: Some(90.0),
            auto_fulfillment: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(store.settings.default_markup, 80.0);
    assert_eq!(store.settings.maximum_markup, 90.0);
    assert!(!store.settings.auto_fulfillment);
}

#[tokio::test]
async fn suspended_reseller_cannot_touch_store() {
    let h = Harness::new();
    let suspended =
        seed_user(&h.db, "gone@example.com", Role::Reseller, AccountStatus::Suspended).await;

    let err = store_service::create_store(h.db.as_ref(), &principal(&suspended), named("Shop"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}
