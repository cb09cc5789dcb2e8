use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use skillz_core::{
    scoring::nest_domain_skills,
    types::{Domain, DomainWithSkills},
    validation,
};
use skillz_storage::{Database, NewDomain};

use crate::auth::AuthUser;
use crate::problem::{observe, ProblemResponse, ServiceError};
use crate::router::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct DomainPayload {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl DomainPayload {
    fn validate(&self) -> Result<NewDomain, ServiceError> {
        Ok(NewDomain {
            name: validation::required("name", &self.name)?,
            color: validation::color(self.color.as_deref())?,
        })
    }
}

#[derive(Clone)]
pub struct DomainService {
    database: Database,
}

impl DomainService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Every domain with the skills classified under it.
    pub async fn list(&self) -> Result<Vec<DomainWithSkills>, ServiceError> {
        let rows = self.database.domains().list_with_skills().await?;
        Ok(nest_domain_skills(rows))
    }

    pub async fn create(&self, payload: &DomainPayload) -> Result<Domain, ServiceError> {
        let domain = payload.validate()?;
        Ok(self.database.domains().create(&domain).await?)
    }

    pub async fn update(
        &self,
        domain_id: i64,
        payload: &DomainPayload,
    ) -> Result<Domain, ServiceError> {
        let domain = payload.validate()?;
        Ok(self.database.domains().update(domain_id, &domain).await?)
    }

    pub async fn delete(&self, domain_id: i64) -> Result<(), ServiceError> {
        Ok(self.database.domains().delete(domain_id).await?)
    }

    pub async fn assign_skill(&self, domain_id: i64, skill_id: i64) -> Result<(), ServiceError> {
        Ok(self.database.domains().assign_skill(domain_id, skill_id).await?)
    }
}

pub async fn list(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<DomainWithSkills>>, ProblemResponse> {
    Ok(Json(observe("get_domains", state.domains().list().await)?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<DomainPayload>,
) -> Result<(StatusCode, Json<Domain>), ProblemResponse> {
    let domain = observe("create_domain", state.domains().create(&payload).await)?;
    info!(stage = "service", domain_id = domain.id, by = caller.id, "domain created");
    Ok((StatusCode::CREATED, Json(domain)))
}

pub async fn update(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(domain_id): Path<i64>,
    Json(payload): Json<DomainPayload>,
) -> Result<Json<Domain>, ProblemResponse> {
    Ok(Json(observe(
        "update_domain",
        state.domains().update(domain_id, &payload).await,
    )?))
}

pub async fn remove(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(domain_id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    observe("delete_domain", state.domains().delete(domain_id).await)?;
    info!(stage = "service", domain_id, by = caller.id, "domain deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_skill(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path((domain_id, skill_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ProblemResponse> {
    observe(
        "assign_skill",
        state.domains().assign_skill(domain_id, skill_id).await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_support::{read_json, send, setup_state, signup};
    use skillz_core::validation::ValidationError;

    fn payload(name: &str, color: Option<&str>) -> DomainPayload {
        DomainPayload {
            name: name.to_string(),
            color: color.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_trims_name_and_normalizes_color() {
        let state = setup_state().await;
        let domain = state
            .domains()
            .create(&payload("  Cloud ", Some("#ABC")))
            .await
            .expect("create");
        assert_eq!(domain.name, "Cloud");
        assert_eq!(domain.color.as_deref(), Some("#abc"));

        let listed = state.domains().list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].skills.is_empty());
    }

    #[tokio::test]
    async fn invalid_domains_are_rejected() {
        let state = setup_state().await;
        let service = state.domains();

        assert!(matches!(
            service.create(&payload(" ", None)).await,
            Err(ServiceError::Validation(ValidationError::Empty("name")))
        ));
        assert!(matches!(
            service.create(&payload("Back", Some("black"))).await,
            Err(ServiceError::Validation(ValidationError::InvalidColor(_)))
        ));

        service.create(&payload("Back", None)).await.unwrap();
        assert!(matches!(
            service.create(&payload("back", None)).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.update(999, &payload("Front", None)).await,
            Err(ServiceError::NotFound("domain"))
        ));
    }

    #[tokio::test]
    async fn http_domain_lifecycle() {
        let state = setup_state().await;
        let (_, token) = signup(&state, "Julien", "julien@xebia.fr").await;

        let response = send(
            &state,
            "POST",
            "/domains",
            Some(&token),
            Some(serde_json::json!({ "name": "Agile", "color": "#ff0000" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = read_json(response).await;
        let id = created["id"].as_i64().expect("domain id");

        let response = send(
            &state,
            "PUT",
            &format!("/domains/{id}"),
            Some(&token),
            Some(serde_json::json!({ "name": "Craft" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = read_json(response).await;
        assert_eq!(updated["name"], "Craft");
        assert!(updated["color"].is_null());

        let response = send(
            &state,
            "PUT",
            &format!("/domains/{id}/skills/42"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&state, "DELETE", &format!("/domains/{id}"), Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let listed = read_json(send(&state, "GET", "/domains", Some(&token), None).await).await;
        assert_eq!(listed, serde_json::json!([]));

        let response = send(
            &state,
            "POST",
            "/domains",
            Some(&token),
            Some(serde_json::json!({ "name": "" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
