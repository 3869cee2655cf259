//! Accounts: registration, login and self-service profile operations.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::gate::ensure_owner;
use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::auth::Identity;
use crate::models::{NewUser, Role, User};
use crate::services::with_timeout;
use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Names only. A `role` field is accepted so that an attempt to change it
/// gets a clear error instead of being silently dropped.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn invalid_credentials() -> AppError {
    AppError::AuthError("invalid email or password".to_string())
}

fn required_name(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::ValidationError(format!("invalid email '{raw}'"))),
    }
}

/// Argon2 is deliberately slow; keep it off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::InternalServerError(format!("blocking task failed: {e}")))
}

pub async fn register(state: &AppState, request: RegisterRequest) -> Result<AuthResponse, AppError> {
    // Role first: an unknown role must fail before anything is written.
    let role: Role = request.role.parse()?;
    let first_name = required_name("first_name", &request.first_name)?;
    let last_name = required_name("last_name", &request.last_name)?;
    let email = normalize_email(&request.email)?;
    validate_password(&request.password)?;

    let password = request.password;
    let password_hash = blocking(move || hash_password(&password)).await??;

    let user = state
        .store
        .insert_user(NewUser {
            first_name,
            last_name,
            email,
            role,
            password_hash,
        })
        .await?;

    let token = state.claims.issue(user.id, user.role)?;
    info!(user_id = %user.id, role = %user.role, "User registered");
    Ok(AuthResponse { token, user })
}

pub async fn login(state: &AppState, request: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = request.email.trim().to_lowercase();
    let user = state
        .store
        .user_by_email(&email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let password = request.password;
    let stored = user.password_hash.clone();
    if !blocking(move || verify_password(&password, &stored)).await? {
        return Err(invalid_credentials());
    }

    let token = state.claims.issue(user.id, user.role)?;
    info!(user_id = %user.id, "User logged in");
    Ok(AuthResponse { token, user })
}

pub async fn get_user(state: &AppState, identity: &Identity, id: Uuid) -> Result<User, AppError> {
    ensure_owner(identity, id, "account")?;
    state
        .store
        .user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

pub async fn update_user(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    request: UpdateUserRequest,
) -> Result<User, AppError> {
    ensure_owner(identity, id, "account")?;

    if let Some(role) = request.role.as_deref() {
        if role.parse::<Role>()? != identity.role {
            return Err(AppError::ValidationError("role cannot be changed".to_string()));
        }
    }

    let current = get_user(state, identity, id).await?;
    let first_name = match request.first_name.as_deref() {
        Some(name) => required_name("first_name", name)?,
        None => current.first_name,
    };
    let last_name = match request.last_name.as_deref() {
        Some(name) => required_name("last_name", name)?,
        None => current.last_name,
    };

    state
        .store
        .update_user_names(id, &first_name, &last_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

/// Refused while the user still holds a booking or organizes a conference.
pub async fn delete_user(state: &AppState, identity: &Identity, id: Uuid) -> Result<(), AppError> {
    ensure_owner(identity, id, "account")?;
    with_timeout(state.tx_timeout, remove_user(state.store.as_ref(), id)).await?;
    info!(user_id = %id, "User deleted");
    Ok(())
}

async fn remove_user(store: &dyn Store, id: Uuid) -> Result<(), AppError> {
    let mut uow = store.begin().await?;

    let (bookings, conferences) = uow
        .user_dependents(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    if bookings > 0 || conferences > 0 {
        return Err(AppError::Conflict(format!(
            "account still has {bookings} active booking(s) and {conferences} conference(s)"
        )));
    }

    // Live bookings block the delete even if they appeared after the count.
    if !uow.delete_user(id).await? {
        return Err(AppError::Conflict(
            "account still has active bookings".to_string(),
        ));
    }
    uow.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::auth::ClaimIssuer;
    use crate::store::MemoryStore;

    fn state(store: &MemoryStore) -> AppState {
        AppState::new(
            Arc::new(store.clone()),
            ClaimIssuer::new("user-tests-secret-0123456789abcdef").unwrap(),
            Duration::from_secs(5),
        )
    }

    fn registration(email: &str, role: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password: "analytical-engine".to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("ada.example.com").is_err());
        assert!(normalize_email("@example.com").is_err());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = MemoryStore::new();
        let state = state(&store);

        let registered = register(&state, registration("ada@example.com", "customer"))
            .await
            .unwrap();
        let identity = state.claims.verify(&registered.token).unwrap();
        assert_eq!(identity.user_id, registered.user.id);
        assert_eq!(identity.role, Role::Customer);

        let logged_in = login(
            &state,
            LoginRequest {
                email: "ADA@example.com".to_string(),
                password: "analytical-engine".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn test_admin_role_rejected_before_any_write() {
        let store = MemoryStore::new();
        let err = register(&state(&store), registration("root@example.com", "admin"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(store.user_by_email("root@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        let state = state(&store);
        register(&state, registration("ada@example.com", "customer")).await.unwrap();

        let err = register(&state, registration("ada@example.com", "organizer"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref msg) if msg == "email already exists"));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_alike() {
        let store = MemoryStore::new();
        let state = state(&store);
        register(&state, registration("ada@example.com", "customer")).await.unwrap();

        let wrong = login(
            &state,
            LoginRequest {
                email: "ada@example.com".to_string(),
                password: "difference-engine".to_string(),
            },
        )
        .await
        .unwrap_err();
        let unknown = login(
            &state,
            LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "analytical-engine".to_string(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_role_is_immutable_and_names_update() {
        let store = MemoryStore::new();
        let state = state(&store);
        let user = register(&state, registration("ada@example.com", "customer"))
            .await
            .unwrap()
            .user;
        let me = Identity {
            user_id: user.id,
            role: Role::Customer,
        };

        let err = update_user(
            &state,
            &me,
            user.id,
            UpdateUserRequest {
                first_name: None,
                last_name: None,
                role: Some("organizer".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let updated = update_user(
            &state,
            &me,
            user.id,
            UpdateUserRequest {
                first_name: Some("Augusta".to_string()),
                last_name: None,
                role: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.first_name, "Augusta");
        assert_eq!(updated.last_name, "Lovelace");
        assert_eq!(updated.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_users_only_see_themselves() {
        let store = MemoryStore::new();
        let state = state(&store);
        let user = register(&state, registration("ada@example.com", "customer"))
            .await
            .unwrap()
            .user;
        let stranger = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
        };

        assert!(matches!(
            get_user(&state, &stranger, user.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            delete_user(&state, &stranger, user.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_blocked_while_organizing() {
        let store = MemoryStore::new();
        let state = state(&store);
        let user = register(&state, registration("grace@example.com", "organizer"))
            .await
            .unwrap()
            .user;
        let me = Identity {
            user_id: user.id,
            role: Role::Organizer,
        };
        store
            .insert_conference(crate::models::NewConference {
                title: "RustConf".to_string(),
                description: String::new(),
                location: "Portland".to_string(),
                event_time: chrono::Utc::now(),
                total_tickets: 5,
                organizer_id: user.id,
            })
            .await
            .unwrap();

        let err = delete_user(&state, &me, user.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.user_by_id(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_self() {
        let store = MemoryStore::new();
        let state = state(&store);
        let user = register(&state, registration("ada@example.com", "customer"))
            .await
            .unwrap()
            .user;
        let me = Identity {
            user_id: user.id,
            role: Role::Customer,
        };

        delete_user(&state, &me, user.id).await.unwrap();
        assert!(store.user_by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_takes_cancelled_bookings_along() {
        let store = MemoryStore::new();
        let state = state(&store);
        let organizer = register(&state, registration("grace@example.com", "organizer"))
            .await
            .unwrap()
            .user;
        let user = register(&state, registration("ada@example.com", "customer"))
            .await
            .unwrap()
            .user;
        let conference = store
            .insert_conference(crate::models::NewConference {
                title: "RustConf".to_string(),
                description: String::new(),
                location: "Portland".to_string(),
                event_time: chrono::Utc::now(),
                total_tickets: 5,
                organizer_id: organizer.id,
            })
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        let cancelled = uow
            .insert_booking(crate::models::NewBooking {
                user_id: user.id,
                conference_id: conference.id,
                tickets_booked: 2,
                status: crate::models::BookingStatus::Cancelled,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let me = Identity {
            user_id: user.id,
            role: Role::Customer,
        };
        delete_user(&state, &me, user.id).await.unwrap();

        assert!(store.user_by_id(user.id).await.unwrap().is_none());
        assert!(store.booking_by_id(cancelled.id).await.unwrap().is_none());
    }
}
