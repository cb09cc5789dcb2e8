use sqlx::SqlitePool;
use thiserror::Error;

use skillz_core::types::{Domain, DomainSkillRow, SkillRef};

use crate::{constraint_violation, Constraint};

/// Repository for competency domains.
#[derive(Clone)]
pub struct DomainRepository {
    pool: SqlitePool,
}

impl DomainRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns every domain joined with its skills, domains ordered by name.
    pub async fn list_with_skills(&self) -> Result<Vec<DomainSkillRow>, DomainError> {
        let rows = sqlx::query_as::<_, DomainSkillDbRow>(
            "SELECT d.id, d.name, d.color, s.id AS skill_id, s.name AS skill_name \
             FROM domains AS d \
             LEFT JOIN skills AS s ON s.domain_id = d.id \
             ORDER BY d.name, d.id, s.name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DomainSkillDbRow::into_domain).collect())
    }

    pub async fn find_by_id(&self, domain_id: i64) -> Result<Option<Domain>, DomainError> {
        let row = sqlx::query_as::<_, DomainRow>("SELECT id, name, color FROM domains WHERE id = ?")
            .bind(domain_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DomainRow::into_domain))
    }

    pub async fn create(&self, domain: &NewDomain) -> Result<Domain, DomainError> {
        let row = sqlx::query_as::<_, DomainRow>(
            "INSERT INTO domains (name, color) VALUES (?, ?) RETURNING id, name, color",
        )
        .bind(&domain.name)
        .bind(&domain.color)
        .fetch_one(&self.pool)
        .await
        .map_err(map_domain_error)?;

        Ok(row.into_domain())
    }

    pub async fn update(&self, domain_id: i64, domain: &NewDomain) -> Result<Domain, DomainError> {
        let row = sqlx::query_as::<_, DomainRow>(
            "UPDATE domains SET name = ?, color = ? WHERE id = ? RETURNING id, name, color",
        )
        .bind(&domain.name)
        .bind(&domain.color)
        .bind(domain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_domain_error)?
        .ok_or(DomainError::NotFound)?;

        Ok(row.into_domain())
    }

    /// Deletes a domain; its skills become unclassified.
    pub async fn delete(&self, domain_id: i64) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM domains WHERE id = ?")
            .bind(domain_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    /// Classifies a skill under the domain.
    pub async fn assign_skill(&self, domain_id: i64, skill_id: i64) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE skills SET domain_id = ? WHERE id = ?")
            .bind(domain_id)
            .bind(skill_id)
            .execute(&self.pool)
            .await
            .map_err(|err| match constraint_violation(&err) {
                Some(Constraint::ForeignKey) => DomainError::NotFound,
                _ => DomainError::Database(err),
            })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::UnknownSkill);
        }
        Ok(())
    }
}

fn map_domain_error(err: sqlx::Error) -> DomainError {
    match constraint_violation(&err) {
        Some(Constraint::Unique) => DomainError::DuplicateName,
        _ => DomainError::Database(err),
    }
}

/// Fields of a domain to create or replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDomain {
    pub name: String,
    pub color: Option<String>,
}

/// Errors that can occur while mutating domains.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain not found")]
    NotFound,
    #[error("a domain with this name already exists")]
    DuplicateName,
    #[error("skill not found")]
    UnknownSkill,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DomainRow {
    id: i64,
    name: String,
    color: Option<String>,
}

impl DomainRow {
    fn into_domain(self) -> Domain {
        Domain {
            id: self.id,
            name: self.name,
            color: self.color,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DomainSkillDbRow {
    #[sqlx(flatten)]
    domain: DomainRow,
    skill_id: Option<i64>,
    skill_name: Option<String>,
}

impl DomainSkillDbRow {
    fn into_domain(self) -> DomainSkillRow {
        let skill = match (self.skill_id, self.skill_name) {
            (Some(id), Some(name)) => Some(SkillRef { id, name }),
            _ => None,
        };
        DomainSkillRow {
            domain: self.domain.into_domain(),
            skill,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;

    fn new_domain(name: &str, color: Option<&str>) -> NewDomain {
        NewDomain {
            name: name.to_string(),
            color: color.map(str::to_string),
        }
    }

    async fn insert_skill(pool: &SqlitePool, name: &str) -> i64 {
        let row: (i64,) = sqlx::query_as("INSERT INTO skills (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(pool)
            .await
            .expect("insert skill");
        row.0
    }

    #[tokio::test]
    async fn create_update_and_delete_domain() {
        let db = setup_db().await;
        let repo = db.domains();

        let created = repo
            .create(&new_domain("Back", Some("#000000")))
            .await
            .expect("create");
        assert_eq!(created.name, "Back");

        let updated = repo
            .update(created.id, &new_domain("Backend", None))
            .await
            .expect("update");
        assert_eq!(updated.name, "Backend");
        assert_eq!(updated.color, None);

        repo.delete(created.id).await.expect("delete");
        assert!(repo.find_by_id(created.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(created.id).await,
            Err(DomainError::NotFound)
        ));
        assert!(matches!(
            repo.update(created.id, &new_domain("X", None)).await,
            Err(DomainError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_case_insensitively() {
        let db = setup_db().await;
        let repo = db.domains();
        repo.create(&new_domain("Data", None)).await.unwrap();

        let err = repo.create(&new_domain("data", None)).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateName));
    }

    #[tokio::test]
    async fn assign_skill_and_list_nested_rows() {
        let db = setup_db().await;
        let repo = db.domains();
        let back = repo.create(&new_domain("Back", None)).await.unwrap();
        repo.create(&new_domain("Cloud", None)).await.unwrap();
        let rust = insert_skill(db.pool(), "Rust").await;

        repo.assign_skill(back.id, rust).await.expect("assign");

        let rows = repo.list_with_skills().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].domain.name, "Back");
        assert_eq!(
            rows[0].skill,
            Some(SkillRef {
                id: rust,
                name: "Rust".to_string()
            })
        );
        assert_eq!(rows[1].skill, None);

        assert!(matches!(
            repo.assign_skill(back.id, 999).await,
            Err(DomainError::UnknownSkill)
        ));
        assert!(matches!(
            repo.assign_skill(999, rust).await,
            Err(DomainError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_domain_unclassifies_its_skills() {
        let db = setup_db().await;
        let repo = db.domains();
        let back = repo.create(&new_domain("Back", None)).await.unwrap();
        let rust = insert_skill(db.pool(), "Rust").await;
        repo.assign_skill(back.id, rust).await.unwrap();

        repo.delete(back.id).await.expect("delete");

        let summaries = db.skills().list_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, rust);
        assert_eq!(summaries[0].domain, None);
    }
}
