//! Storefront setup, domain settings and pricing settings.

use crate::{
    config::ServiceSettings,
    db::Database,
    error::AppError,
    models::{
        store::{
            CreateStoreRequest, DnsChallenge, NewStorefront, StoreSettings, StoreSettingsPatch,
            StoreStatus, Storefront, UpdateDomainRequest,
        },
        user::Principal,
    },
    services::subdomain,
};

/// Insert attempts when a concurrent allocation takes the chosen subdomain
/// between our check and our insert.
const MAX_CREATE_ATTEMPTS: u32 = 10;

const MAX_STORE_NAME_LEN: usize = 50;

/// Create the calling reseller's storefront, with a subdomain allocated from
/// its name.
///
/// # Errors
///
/// - `Conflict`: the reseller already has a store
/// - `Validation`: bad name or settings
/// - `AllocationExhausted`: no free subdomain for the name
pub async fn create_store(
    db: &dyn Database,
    principal: &Principal,
    request: CreateStoreRequest,
) -> Result<Storefront, AppError> {
    let reseller_id = principal.reseller_id()?;

    let name = request.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_STORE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Store name must be between 1 and {MAX_STORE_NAME_LEN} characters"
        )));
    }
    let description = request
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let mut settings = StoreSettings::default();
    settings.apply(&request.settings);
    settings.validate()?;

    let mut attempt = 1;
    loop {
        let mut tx = db.begin().await?;

        if tx.fetch_store_for_reseller(reseller_id).await?.is_some() {
            return Err(AppError::Conflict("Store already exists".to_string()));
        }

        let allocated = subdomain::allocate_subdomain(&mut *tx, &name, None).await?;
        let inserted = tx
            .insert_store(&NewStorefront {
                reseller_id,
                name: name.clone(),
                description: description.clone(),
                subdomain: allocated.clone(),
                settings: settings.clone(),
                status: StoreStatus::Active,
            })
            .await;

        match inserted {
            Ok(store) => {
                tx.commit().await?;
                tracing::info!(
                    store_id = %store.id,
                    reseller_id = %reseller_id,
                    subdomain = %store.subdomain,
                    "store created"
                );
                return Ok(store);
            }
            Err(AppError::Conflict(_)) if attempt < MAX_CREATE_ATTEMPTS => {
                tracing::warn!(subdomain = %allocated, attempt, "subdomain taken concurrently, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn get_store(db: &dyn Database, principal: &Principal) -> Result<Storefront, AppError> {
    let reseller_id = principal.reseller_id()?;
    let mut tx = db.begin().await?;
    let store = tx
        .fetch_store_for_reseller(reseller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Store".to_string()))?;
    tx.commit().await?;
    Ok(store)
}

/// Change the subdomain and/or custom domain.
///
/// Setting a new custom domain resets its verification and issues a fresh
/// DNS challenge; posting the current one again keeps both. An empty custom
/// domain removes it.
pub async fn update_domain_settings(
    db: &dyn Database,
    settings: &ServiceSettings,
    principal: &Principal,
    request: UpdateDomainRequest,
) -> Result<Storefront, AppError> {
    let reseller_id = principal.reseller_id()?;

    let requested_subdomain = request.subdomain.map(|s| s.trim().to_lowercase());
    if let Some(sub) = &requested_subdomain {
        if !subdomain::is_valid_subdomain(sub) {
            return Err(AppError::Validation("Invalid subdomain".to_string()));
        }
    }
    let requested_domain = request.custom_domain.map(|d| d.trim().to_lowercase());
    if let Some(domain) = requested_domain.as_deref().filter(|d| !d.is_empty()) {
        if !subdomain::validate_custom_domain(domain) {
            return Err(AppError::Validation("Invalid domain format".to_string()));
        }
    }

    let mut tx = db.begin().await?;
    let mut store = tx
        .fetch_store_for_reseller(reseller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Store".to_string()))?;

    if let Some(sub) = requested_subdomain {
        if sub != store.subdomain {
            if tx.subdomain_taken(&sub, Some(store.id)).await? {
                return Err(AppError::Conflict("Subdomain is already taken".to_string()));
            }
            store.subdomain = sub;
        }
    }

    match requested_domain {
        Some(domain) if domain.is_empty() => {
            store.custom_domain = None;
            store.custom_domain_verified = false;
            store.dns_challenge = None;
        }
        Some(domain) if store.custom_domain.as_deref() == Some(domain.as_str()) => {}
        Some(domain) => {
            if tx.custom_domain_taken(&domain, Some(store.id)).await? {
                return Err(AppError::Conflict("Domain is already in use".to_string()));
            }
            store.custom_domain = Some(domain);
            store.custom_domain_verified = false;
            store.dns_challenge = Some(DnsChallenge {
                a_record: settings.dns_a_record.clone(),
                cname_record: settings.dns_cname_record.clone(),
                verification_token: verification_token(),
            });
        }
        None => {}
    }

    tx.update_store(&store).await?;
    tx.commit().await?;

    tracing::info!(
        store_id = %store.id,
        subdomain = %store.subdomain,
        custom_domain = ?store.custom_domain,
        "domain settings updated"
    );

    Ok(store)
}

fn verification_token() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Apply a partial settings update; the merged result must validate.
pub async fn update_store_settings(
    db: &dyn Database,
    principal: &Principal,
    patch: StoreSettingsPatch,
) -> Result<Storefront, AppError> {
    let reseller_id = principal.reseller_id()?;

    let mut tx = db.begin().await?;
    let mut store = tx
        .fetch_store_for_reseller(reseller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Store".to_string()))?;

    store.settings.apply(&patch);
    store.settings.validate()?;

    tx.update_store(&store).await?;
    tx.commit().await?;

    tracing::info!(store_id = %store.id, "store settings updated");

    Ok(store)
}
