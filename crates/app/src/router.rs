use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use skillz_storage::Database;

use crate::auth::{self, TokenService};
use crate::domains::{self, DomainService};
use crate::skills::{self, SkillService};
use crate::telemetry;
use crate::users::{self, UserService};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Clock,
    tokens: TokenService,
    users: UserService,
    domains: DomainService,
    skills: SkillService,
    updates_limit: u32,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        jwt_secret: &[u8],
        token_ttl: Duration,
        updates_limit: u32,
    ) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        Self {
            metrics,
            tokens: TokenService::new(jwt_secret, token_ttl),
            users: UserService::new(storage.clone(), clock.clone()),
            domains: DomainService::new(storage.clone()),
            skills: SkillService::new(storage.clone(), clock.clone()),
            storage,
            clock,
            updates_limit,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.users = UserService::new(self.storage.clone(), clock.clone());
        self.skills = SkillService::new(self.storage.clone(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    #[cfg(test)]
    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn domains(&self) -> &DomainService {
        &self.domains
    }

    pub fn skills(&self) -> &SkillService {
        &self.skills
    }

    pub fn updates_limit(&self) -> u32 {
        self.updates_limit
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/me", get(users::me))
        .route("/me/password", put(users::change_password))
        .route("/me/phone", put(users::change_phone))
        .route("/me/address", put(users::change_address))
        .route("/me/skills", post(skills::set_my_skill))
        .route("/me/skills/:user_skill_id", delete(skills::remove_my_skill))
        .route("/users", get(users::list_users))
        .route("/users/mobile", get(users::list_users_mobile))
        .route("/users/web", get(users::list_users_web))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/manager", put(users::assign_manager))
        .route("/users/:id/promote", post(users::promote_to_manager))
        .route("/users/:id/skills", get(skills::list_user_skills))
        .route("/management", get(users::management))
        .route("/updates", get(users::updates))
        .route("/domains", get(domains::list).post(domains::create))
        .route("/domains/:id", put(domains::update).delete(domains::remove))
        .route("/domains/:id/skills/:skill_id", put(domains::assign_skill))
        .route("/skills", get(skills::list))
        .route("/skills/:id/users", get(skills::users_with_skill))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
