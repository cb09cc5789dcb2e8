use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Datelike;
use serde::Deserialize;
use tracing::info;

use skillz_core::{
    management::group_by_manager,
    profile::user_view,
    scoring::{group_skills_by_domain, rank_by_score, total_score, web_users},
    types::{
        ManagedUser, ManagementGroup, UserProfile, UserRecord, UserRef, UserUpdates, UserView,
        WebUser, MANAGER_ROLE,
    },
    updates::group_updates,
    validation::{self, ValidationError},
};
use skillz_storage::{Database, NewUser, UserChanges};

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::problem::{observe, ProblemResponse, ServiceError};
use crate::router::{AppState, Clock};

/// Optional role restriction for user listings (`?with_roles=Manager`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub with_roles: Option<String>,
}

impl UserFilter {
    fn role(&self) -> Option<&str> {
        self.with_roles
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
    }
}

/// Registration payload before validation and hashing.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub diploma: Option<String>,
}

/// Identity fields a client may change on a user; absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub diploma: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneChange {
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddressChange {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManagerAssignment {
    pub manager_id: Option<i64>,
}

#[derive(Clone)]
pub struct UserService {
    database: Database,
    clock: Clock,
}

impl UserService {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    fn current_year(&self) -> i32 {
        (self.clock)().year()
    }

    async fn records(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, ServiceError> {
        let users = self.database.users();
        let records = match filter.role() {
            Some(role) => users.get_users_with_roles(role).await?,
            None => users.get_users().await?,
        };
        Ok(records)
    }

    async fn find_record(&self, user_id: i64) -> Result<UserRecord, ServiceError> {
        self.database
            .users()
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    pub async fn get_users(&self, filter: &UserFilter) -> Result<Vec<UserView>, ServiceError> {
        let year = self.current_year();
        Ok(self
            .records(filter)
            .await?
            .iter()
            .map(|record| user_view(record, year))
            .collect())
    }

    /// Users expanded with their roles and their skills grouped by domain.
    pub async fn get_users_mobile_version(
        &self,
        filter: &UserFilter,
    ) -> Result<Vec<UserProfile>, ServiceError> {
        let records = self.records(filter).await?;
        let mut profiles = Vec::with_capacity(records.len());
        for record in records {
            profiles.push(self.profile_of(record).await?);
        }
        Ok(profiles)
    }

    /// Users with their per-domain scores, best scores first.
    pub async fn get_users_web_version(
        &self,
        filter: &UserFilter,
    ) -> Result<Vec<WebUser>, ServiceError> {
        let rows = self.database.users().get_web_users(filter.role()).await?;
        let mut users = web_users(rows, self.current_year());
        rank_by_score(&mut users);
        Ok(users)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<ManagedUser, ServiceError> {
        let record = self.find_record(user_id).await?;
        self.attach_manager(user_view(&record, self.current_year()))
            .await
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<UserProfile, ServiceError> {
        let record = self.find_record(user_id).await?;
        self.profile_of(record).await
    }

    /// Looks up the manager of `user`, if any, and attaches its id and name.
    pub async fn attach_manager(&self, user: UserView) -> Result<ManagedUser, ServiceError> {
        let manager = self.manager_of(user.manager_id).await?;
        Ok(ManagedUser { user, manager })
    }

    async fn manager_of(&self, manager_id: Option<i64>) -> Result<Option<UserRef>, ServiceError> {
        let Some(manager_id) = manager_id else {
            return Ok(None);
        };
        let manager = self.database.users().find_user_by_id(manager_id).await?;
        Ok(manager.map(|manager| UserRef {
            id: manager.id,
            name: manager.name,
        }))
    }

    async fn profile_of(&self, record: UserRecord) -> Result<UserProfile, ServiceError> {
        let skills = self
            .database
            .skills()
            .find_user_skills_by_id(record.id)
            .await?;
        let roles = self.database.users().find_user_roles_by_id(record.id).await?;
        let manager = self.manager_of(record.manager_id).await?;

        let domains = group_skills_by_domain(skills);
        let score = total_score(&domains);
        Ok(UserProfile {
            user: user_view(&record, self.current_year()),
            manager,
            roles,
            domains,
            score,
        })
    }

    pub async fn update_user(&self, user_id: i64, update: UserUpdate) -> Result<(), ServiceError> {
        let changes = UserChanges {
            name: update
                .name
                .as_deref()
                .map(|name| validation::required("name", name))
                .transpose()?,
            email: update
                .email
                .as_deref()
                .map(validation::email)
                .transpose()?,
            diploma: update.diploma.map(|diploma| diploma.trim().to_string()),
        };
        self.database.users().update_user(user_id, &changes).await?;
        Ok(())
    }

    /// Replaces the password once `old_password` verifies against the stored hash.
    pub async fn update_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validation::password(new_password)?;
        let users = self.database.users();
        let stored = users.find_password_hash(user_id).await?;
        let verified = stored
            .as_deref()
            .is_some_and(|hash| verify_password(old_password, hash));
        if !verified {
            return Err(ServiceError::InvalidCredentials);
        }

        let hash = hash_password(new_password)?;
        users.update_password(user_id, &hash).await?;
        Ok(())
    }

    pub async fn update_phone(&self, user_id: i64, phone: Option<&str>) -> Result<(), ServiceError> {
        self.database
            .users()
            .update_phone(user_id, blank_to_none(phone))
            .await?;
        Ok(())
    }

    pub async fn update_address(
        &self,
        user_id: i64,
        address: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.database
            .users()
            .update_address(user_id, blank_to_none(address))
            .await?;
        Ok(())
    }

    pub async fn assign_manager(
        &self,
        user_id: i64,
        manager_id: Option<i64>,
    ) -> Result<(), ServiceError> {
        if manager_id == Some(user_id) {
            return Err(ValidationError::SelfManagement.into());
        }
        self.database
            .users()
            .assign_manager(user_id, manager_id)
            .await?;
        Ok(())
    }

    /// Grants the manager role. Promoting a manager again changes nothing.
    pub async fn promote_to_manager(&self, user_id: i64) -> Result<(), ServiceError> {
        let record = self.find_record(user_id).await?;
        self.database.users().add_role(record.id, MANAGER_ROLE).await?;
        Ok(())
    }

    pub async fn delete_user_by_id(&self, user_id: i64) -> Result<(), ServiceError> {
        self.database.users().delete_user_by_id(user_id).await?;
        Ok(())
    }

    pub async fn get_management(&self) -> Result<Vec<ManagementGroup>, ServiceError> {
        let rows = self.database.users().get_management().await?;
        Ok(group_by_manager(rows))
    }

    pub async fn get_updates(&self, limit: u32) -> Result<Vec<UserUpdates>, ServiceError> {
        let rows = self.database.users().get_updates(limit).await?;
        Ok(group_updates(rows, self.current_year()))
    }

    pub async fn signup(&self, account: NewAccount) -> Result<UserView, ServiceError> {
        let name = validation::required("name", &account.name)?;
        let email = validation::email(&account.email)?;
        validation::password(&account.password)?;
        let password_hash = hash_password(&account.password)?;

        let user = NewUser {
            name,
            email: Some(email),
            password_hash: Some(password_hash),
            diploma: blank_to_none(account.diploma.as_deref()).map(str::to_string),
            created_at: (self.clock)(),
        };
        let user_id = self.database.users().create_user(&user).await?;
        let record = self.find_record(user_id).await?;
        Ok(user_view(&record, self.current_year()))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserView, ServiceError> {
        let email = validation::email(email).map_err(|_| ServiceError::InvalidCredentials)?;
        let credentials = self
            .database
            .users()
            .find_user_by_email(&email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let verified = credentials
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(password, hash));
        if !verified {
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(user_view(&credentials.user, self.current_year()))
    }
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub async fn me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<UserProfile>, ProblemResponse> {
    let profile = observe("get_me", state.users().get_profile(caller.id).await)?;
    Ok(Json(profile))
}

pub async fn change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(change): Json<PasswordChange>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "update_password",
        state
            .users()
            .update_password(caller.id, &change.old_password, &change.new_password)
            .await,
    )?;
    info!(stage = "service", user_id = caller.id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_phone(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(change): Json<PhoneChange>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "update_phone",
        state
            .users()
            .update_phone(caller.id, change.phone.as_deref())
            .await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_address(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(change): Json<AddressChange>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "update_address",
        state
            .users()
            .update_address(caller.id, change.address.as_deref())
            .await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<AppState>,
    _caller: AuthUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<UserView>>, ProblemResponse> {
    Ok(Json(observe(
        "get_users",
        state.users().get_users(&filter).await,
    )?))
}

pub async fn list_users_mobile(
    State(state): State<AppState>,
    _caller: AuthUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<UserProfile>>, ProblemResponse> {
    Ok(Json(observe(
        "get_users_mobile",
        state.users().get_users_mobile_version(&filter).await,
    )?))
}

pub async fn list_users_web(
    State(state): State<AppState>,
    _caller: AuthUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<WebUser>>, ProblemResponse> {
    Ok(Json(observe(
        "get_users_web",
        state.users().get_users_web_version(&filter).await,
    )?))
}

pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<ManagedUser>, ProblemResponse> {
    Ok(Json(observe("get_user", state.users().get_user(user_id).await)?))
}

pub async fn update_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> Result<StatusCode, ProblemResponse> {
    observe("update_user", state.users().update_user(user_id, update).await)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    observe("delete_user", state.users().delete_user_by_id(user_id).await)?;
    info!(stage = "service", user_id, by = %caller.name, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_manager(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<i64>,
    Json(assignment): Json<ManagerAssignment>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "assign_manager",
        state
            .users()
            .assign_manager(user_id, assignment.manager_id)
            .await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn promote_to_manager(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "promote_to_manager",
        state.users().promote_to_manager(user_id).await,
    )?;
    info!(stage = "service", user_id, by = caller.id, "user promoted to manager");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn management(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<ManagementGroup>>, ProblemResponse> {
    Ok(Json(observe(
        "get_management",
        state.users().get_management().await,
    )?))
}

pub async fn updates(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<UserUpdates>>, ProblemResponse> {
    let limit = state.updates_limit();
    Ok(Json(observe(
        "get_updates",
        state.users().get_updates(limit).await,
    )?))
}
