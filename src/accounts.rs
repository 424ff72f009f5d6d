//! Signup, login, own profile, the admin user list and the notification inbox.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::{require_role, Principal, TokenKeys};
use crate::error::AppError;
use crate::models::{NewUser, Notification, ProfileUpdate, Role, User, UserSummary};
use crate::store::Store;

const HASH_COST: u32 = 10;

const DUPLICATE_EMAIL: &str = "a user with this email already exists";
const EMAIL_IN_USE: &str = "this email is already in use";
const USER_HAS_BOOKINGS: &str = "cannot delete user with bookings";

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub struct Accounts {
    store: Arc<dyn Store>,
    keys: Arc<TokenKeys>,
    hash_cost: u32,
}

impl Accounts {
    pub fn new(store: Arc<dyn Store>, keys: Arc<TokenKeys>) -> Self {
        Accounts {
            store,
            keys,
            hash_cost: HASH_COST,
        }
    }

    #[cfg(test)]
    fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// New accounts are always clients; roles are changed by an admin.
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&request.email)?;
        if request.name.trim().is_empty() {
            return Err(AppError::invalid("name is required"));
        }
        if request.password.len() < 6 {
            return Err(AppError::invalid("password must have at least 6 characters"));
        }
        if self.store.email_taken(&email, None).await? {
            return Err(AppError::conflict(DUPLICATE_EMAIL));
        }

        let password_hash = hash_password(request.password, self.hash_cost).await?;
        let user = self
            .store
            .insert_user(&NewUser {
                name: request.name.trim().to_string(),
                email,
                phone: request.phone,
                password_hash,
            })
            .await
            .map_err(|e| AppError::on_constraint(e, DUPLICATE_EMAIL))?;
        info!("User {} signed up", user.id);

        let token = self.keys.issue(Principal { id: user.id, role: user.role })?;
        Ok(AuthResponse { token, user })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let invalid = || AppError::Unauthorized("invalid credentials".into());

        let email = request.email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(request.password, user.password_hash.clone()).await? {
            return Err(invalid());
        }

        let token = self.keys.issue(Principal { id: user.id, role: user.role })?;
        Ok(AuthResponse { token, user })
    }

    pub async fn profile(&self, principal: &Principal) -> Result<User, AppError> {
        self.store
            .find_user(principal.id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }

    pub async fn update_profile(&self, principal: &Principal, update: ProfileUpdate) -> Result<User, AppError> {
        if update.name.trim().is_empty() || update.phone.trim().is_empty() {
            return Err(AppError::invalid("please fill in all fields"));
        }
        let update = ProfileUpdate {
            email: normalize_email(&update.email)?,
            name: update.name.trim().to_string(),
            phone: update.phone.trim().to_string(),
        };
        if self.store.email_taken(&update.email, Some(principal.id)).await? {
            return Err(AppError::conflict(EMAIL_IN_USE));
        }
        self.store
            .update_profile(principal.id, &update)
            .await
            .map_err(|e| AppError::on_constraint(e, EMAIL_IN_USE))?
            .ok_or_else(|| AppError::not_found("user"))
    }

    pub async fn notifications(&self, principal: &Principal) -> Result<Vec<Notification>, AppError> {
        Ok(self.store.list_notifications(principal.id).await?)
    }

    pub async fn list_users(&self, principal: &Principal) -> Result<Vec<UserSummary>, AppError> {
        require_role(principal, Role::Admin)?;
        Ok(self.store.list_user_summaries().await?)
    }

    pub async fn change_role(&self, principal: &Principal, user_id: i32, role: &str) -> Result<Role, AppError> {
        require_role(principal, Role::Admin)?;
        let role: Role = role.parse().map_err(AppError::InvalidInput)?;
        if !self.store.set_role(user_id, role).await? {
            return Err(AppError::not_found(format!("user {}", user_id)));
        }
        info!("User {} is now {} (by admin {})", user_id, role, principal.id);
        Ok(role)
    }

    /// Users that appear on any booking are kept so the history stays whole.
    pub async fn delete_user(&self, principal: &Principal, user_id: i32) -> Result<(), AppError> {
        require_role(principal, Role::Admin)?;
        if self.store.user_has_bookings(user_id).await? {
            return Err(AppError::conflict(USER_HAS_BOOKINGS));
        }
        let deleted = self
            .store
            .delete_user(user_id)
            .await
            .map_err(|e| AppError::on_constraint(e, USER_HAS_BOOKINGS))?;
        if !deleted {
            return Err(AppError::not_found(format!("user {}", user_id)));
        }
        warn!("User {} deleted by admin {}", user_id, principal.id);
        Ok(())
    }
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::invalid("a valid email is required")),
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(e.to_string()))
}
