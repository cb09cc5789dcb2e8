use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Datelike;
use serde::Deserialize;

use skillz_core::{
    profile::user_view,
    types::{SkillSummary, SkilledUser, UserSkillRecord},
    validation,
};
use skillz_storage::{Database, UserSkillInput};

use crate::auth::AuthUser;
use crate::problem::{observe, ProblemResponse, ServiceError};
use crate::router::{AppState, Clock};

/// A user's self-assessment for a skill, identified by name.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillInput {
    pub name: String,
    pub level: i64,
    #[serde(default)]
    pub interested: bool,
}

#[derive(Clone)]
pub struct SkillService {
    database: Database,
    clock: Clock,
}

impl SkillService {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    pub async fn list(&self) -> Result<Vec<SkillSummary>, ServiceError> {
        Ok(self.database.skills().list_summaries().await?)
    }

    pub async fn find_user_skills_by_id(
        &self,
        user_id: i64,
    ) -> Result<Vec<UserSkillRecord>, ServiceError> {
        if self.database.users().find_user_by_id(user_id).await?.is_none() {
            return Err(ServiceError::NotFound("user"));
        }
        Ok(self.database.skills().find_user_skills_by_id(user_id).await?)
    }

    pub async fn users_with_skill(&self, skill_id: i64) -> Result<Vec<SkilledUser>, ServiceError> {
        let skills = self.database.skills();
        if skills.find_skill(skill_id).await?.is_none() {
            return Err(ServiceError::NotFound("skill"));
        }

        let year = (self.clock)().year();
        Ok(skills
            .find_users_by_skill(skill_id)
            .await?
            .into_iter()
            .map(|holder| SkilledUser {
                user: user_view(&holder.user, year),
                level: holder.level,
                interested: holder.interested,
            })
            .collect())
    }

    /// Creates or updates the user's level and interest for a skill, dated now.
    /// Returns the user's skills after the change.
    pub async fn set_user_skill(
        &self,
        user_id: i64,
        input: SkillInput,
    ) -> Result<Vec<UserSkillRecord>, ServiceError> {
        let record = UserSkillInput {
            name: validation::required("name", &input.name)?,
            level: validation::skill_level(input.level)?,
            interested: input.interested,
            date: (self.clock)(),
        };
        let skills = self.database.skills();
        skills.upsert_user_skill(user_id, &record).await?;
        Ok(skills.find_user_skills_by_id(user_id).await?)
    }

    pub async fn remove_user_skill(
        &self,
        user_id: i64,
        user_skill_id: i64,
    ) -> Result<(), ServiceError> {
        Ok(self
            .database
            .skills()
            .delete_user_skill(user_id, user_skill_id)
            .await?)
    }
}

pub async fn list(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<SkillSummary>>, ProblemResponse> {
    Ok(Json(observe("get_skills", state.skills().list().await)?))
}

pub async fn list_user_skills(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<UserSkillRecord>>, ProblemResponse> {
    Ok(Json(observe(
        "get_user_skills",
        state.skills().find_user_skills_by_id(user_id).await,
    )?))
}

pub async fn users_with_skill(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(skill_id): Path<i64>,
) -> Result<Json<Vec<SkilledUser>>, ProblemResponse> {
    Ok(Json(observe(
        "get_skill_users",
        state.skills().users_with_skill(skill_id).await,
    )?))
}

pub async fn set_my_skill(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(input): Json<SkillInput>,
) -> Result<Json<Vec<UserSkillRecord>>, ProblemResponse> {
    Ok(Json(observe(
        "set_skill",
        state.skills().set_user_skill(caller.id, input).await,
    )?))
}

pub async fn remove_my_skill(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(user_skill_id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "remove_skill",
        state
            .skills()
            .remove_user_skill(caller.id, user_skill_id)
            .await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_support::{fixed_now, read_json, send, setup_state, signup};
    use crate::users::NewAccount;
    use skillz_core::validation::ValidationError;

    fn input(name: &str, level: i64, interested: bool) -> SkillInput {
        SkillInput {
            name: name.to_string(),
            level,
            interested,
        }
    }

    async fn new_user(state: &AppState, name: &str, email: &str) -> i64 {
        state
            .users()
            .signup(NewAccount {
                name: name.to_string(),
                email: email.to_string(),
                password: "secret-password".to_string(),
                diploma: Some("2012".to_string()),
            })
            .await
            .expect("signup")
            .id
    }

    #[tokio::test]
    async fn set_user_skill_creates_then_updates() {
        let state = setup_state().await;
        let user = new_user(&state, "Julien", "julien@xebia.fr").await;
        let service = state.skills();

        let skills = service
            .set_user_skill(user, input("Rust", 1, false))
            .await
            .expect("create");
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].level, 1);
        assert_eq!(skills[0].date, fixed_now());

        let skills = service
            .set_user_skill(user, input(" Rust ", 3, true))
            .await
            .expect("update");
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].level, 3);
        assert!(skills[0].interested);

        let catalogue = service.list().await.unwrap();
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue[0].name, "Rust");
        assert_eq!(catalogue[0].user_count, 1);
    }

    #[tokio::test]
    async fn set_user_skill_validates_input() {
        let state = setup_state().await;
        let user = new_user(&state, "Julien", "julien@xebia.fr").await;
        let service = state.skills();

        assert!(matches!(
            service.set_user_skill(user, input("Rust", 4, false)).await,
            Err(ServiceError::Validation(ValidationError::InvalidLevel(4)))
        ));
        assert!(matches!(
            service.set_user_skill(user, input("", 1, false)).await,
            Err(ServiceError::Validation(ValidationError::Empty("name")))
        ));
        assert!(matches!(
            service.set_user_skill(user + 100, input("Rust", 1, false)).await,
            Err(ServiceError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn users_with_skill_lists_holders() {
        let state = setup_state().await;
        let julien = new_user(&state, "Julien", "julien@xebia.fr").await;
        let alban = new_user(&state, "Alban", "alban@xebia.fr").await;
        let service = state.skills();

        let skills = service
            .set_user_skill(julien, input("Java", 3, true))
            .await
            .unwrap();
        service
            .set_user_skill(alban, input("Java", 1, false))
            .await
            .unwrap();

        let holders = service.users_with_skill(skills[0].skill_id).await.unwrap();
        assert_eq!(holders.len(), 2);
        let julien_entry = holders
            .iter()
            .find(|holder| holder.user.id == julien)
            .expect("julien holds java");
        assert_eq!(julien_entry.level, 3);
        assert_eq!(julien_entry.user.experience_counter, 4);

        assert!(matches!(
            service.users_with_skill(skills[0].skill_id + 100).await,
            Err(ServiceError::NotFound("skill"))
        ));
        assert!(matches!(
            service.find_user_skills_by_id(alban + 100).await,
            Err(ServiceError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn users_only_remove_their_own_skills() {
        let state = setup_state().await;
        let (julien, token) = signup(&state, "Julien", "julien@xebia.fr").await;
        let (_, other_token) = signup(&state, "Alban", "alban@xebia.fr").await;

        let response = send(
            &state,
            "POST",
            "/me/skills",
            Some(&token),
            Some(serde_json::json!({ "name": "Scala", "level": 2 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let skills = read_json(response).await;
        let user_skill_id = skills[0]["id"].as_i64().expect("user skill id");
        assert_eq!(skills[0]["interested"], false);

        let uri = format!("/me/skills/{user_skill_id}");
        let response = send(&state, "DELETE", &uri, Some(&other_token), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&state, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let listed = read_json(
            send(&state, "GET", &format!("/users/{julien}/skills"), Some(&token), None).await,
        )
        .await;
        assert_eq!(listed, serde_json::json!([]));
    }
}
