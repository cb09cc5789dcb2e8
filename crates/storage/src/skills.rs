use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use skillz_core::types::{Domain, SkillHolder, SkillRef, SkillSummary, UserRecord, UserSkillRecord};

use crate::{constraint_violation, to_rfc3339, Constraint};

/// Repository for the skill catalogue and the skills held by users.
#[derive(Clone)]
pub struct SkillRepository {
    pool: SqlitePool,
}

impl SkillRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists every skill with its domain and the number of users holding it.
    pub async fn list_summaries(&self) -> Result<Vec<SkillSummary>, SkillError> {
        let rows = sqlx::query_as::<_, SkillSummaryRow>(
            r#"
SELECT s.id,
       s.name,
       d.id AS domain_id,
       d.name AS domain_name,
       d.color AS domain_color,
       COUNT(us.id) AS user_count
  FROM skills AS s
  LEFT JOIN domains AS d ON d.id = s.domain_id
  LEFT JOIN user_skills AS us ON us.skill_id = s.id
 GROUP BY s.id
 ORDER BY s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SkillSummaryRow::into_domain).collect())
    }

    pub async fn find_skill(&self, skill_id: i64) -> Result<Option<SkillRef>, SkillError> {
        let row: Option<(i64, String)> = sqlx::query_as("SELECT id, name FROM skills WHERE id = ?")
            .bind(skill_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, name)| SkillRef { id, name }))
    }

    /// Lists the skills of a user with their domain, ordered by domain then skill name.
    pub async fn find_user_skills_by_id(
        &self,
        user_id: i64,
    ) -> Result<Vec<UserSkillRecord>, SkillError> {
        let rows = sqlx::query_as::<_, UserSkillRow>(
            r#"
SELECT us.id,
       s.id AS skill_id,
       s.name,
       us.level,
       us.interested,
       us.updated_at,
       d.id AS domain_id,
       d.name AS domain_name,
       d.color AS domain_color
  FROM user_skills AS us
  JOIN skills AS s ON s.id = us.skill_id
  LEFT JOIN domains AS d ON d.id = s.domain_id
 WHERE us.user_id = ?
 ORDER BY d.name, s.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserSkillRow::into_domain).collect())
    }

    /// Lists the users holding a skill, best level first.
    pub async fn find_users_by_skill(&self, skill_id: i64) -> Result<Vec<SkillHolder>, SkillError> {
        let rows = sqlx::query_as::<_, SkillHolderRow>(
            r#"
SELECT u.id,
       u.name,
       u.email,
       u.diploma,
       u.address,
       u.phone,
       u.manager_id,
       us.level,
       us.interested
  FROM user_skills AS us
  JOIN users AS u ON u.id = us.user_id
 WHERE us.skill_id = ?
 ORDER BY us.level DESC, us.interested DESC, u.name
            "#,
        )
        .bind(skill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SkillHolderRow::into_domain).collect())
    }

    /// Records a user's level and interest for a skill, creating the skill by
    /// name when it does not exist yet. Returns the user skill identifier.
    pub async fn upsert_user_skill(
        &self,
        user_id: i64,
        input: &UserSkillInput,
    ) -> Result<i64, SkillError> {
        let mut tx = self.pool.begin().await?;

        let (skill_id,): (i64,) = sqlx::query_as(
            "INSERT INTO skills (name) VALUES (?) \
             ON CONFLICT(name) DO UPDATE SET name = skills.name \
             RETURNING id",
        )
        .bind(&input.name)
        .fetch_one(&mut *tx)
        .await?;

        let (user_skill_id,): (i64,) = sqlx::query_as(
            "INSERT INTO user_skills (user_id, skill_id, level, interested, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(user_id, skill_id) DO UPDATE \
             SET level = excluded.level, \
                 interested = excluded.interested, \
                 updated_at = excluded.updated_at \
             RETURNING id",
        )
        .bind(user_id)
        .bind(skill_id)
        .bind(input.level)
        .bind(input.interested)
        .bind(to_rfc3339(input.date))
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match constraint_violation(&err) {
            Some(Constraint::ForeignKey) => SkillError::UnknownUser,
            _ => SkillError::Database(err),
        })?;

        tx.commit().await?;
        Ok(user_skill_id)
    }

    /// Removes one of the user's skills.
    pub async fn delete_user_skill(&self, user_id: i64, user_skill_id: i64) -> Result<(), SkillError> {
        let result = sqlx::query("DELETE FROM user_skills WHERE id = ? AND user_id = ?")
            .bind(user_skill_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SkillError::NotFound);
        }
        Ok(())
    }
}

/// A user's level and interest for a named skill at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSkillInput {
    pub name: String,
    pub level: i64,
    pub interested: bool,
    pub date: DateTime<Utc>,
}

/// Errors that can occur while reading or mutating skills.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found")]
    NotFound,
    #[error("user does not exist")]
    UnknownUser,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for SkillError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

fn domain_from_parts(
    id: Option<i64>,
    name: Option<String>,
    color: Option<String>,
) -> Option<Domain> {
    match (id, name) {
        (Some(id), Some(name)) => Some(Domain { id, name, color }),
        _ => None,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SkillSummaryRow {
    id: i64,
    name: String,
    domain_id: Option<i64>,
    domain_name: Option<String>,
    domain_color: Option<String>,
    user_count: i64,
}

impl SkillSummaryRow {
    fn into_domain(self) -> SkillSummary {
        SkillSummary {
            id: self.id,
            name: self.name,
            domain: domain_from_parts(self.domain_id, self.domain_name, self.domain_color),
            user_count: self.user_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserSkillRow {
    id: i64,
    skill_id: i64,
    name: String,
    level: i64,
    interested: bool,
    updated_at: DateTime<Utc>,
    domain_id: Option<i64>,
    domain_name: Option<String>,
    domain_color: Option<String>,
}

impl UserSkillRow {
    fn into_domain(self) -> UserSkillRecord {
        UserSkillRecord {
            id: self.id,
            skill_id: self.skill_id,
            name: self.name,
            level: self.level,
            interested: self.interested,
            date: self.updated_at,
            domain: domain_from_parts(self.domain_id, self.domain_name, self.domain_color),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SkillHolderRow {
    id: i64,
    name: String,
    email: Option<String>,
    diploma: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    manager_id: Option<i64>,
    level: i64,
    interested: bool,
}

impl SkillHolderRow {
    fn into_domain(self) -> SkillHolder {
        SkillHolder {
            user: UserRecord {
                id: self.id,
                name: self.name,
                email: self.email,
                diploma: self.diploma,
                address: self.address,
                phone: self.phone,
                manager_id: self.manager_id,
            },
            level: self.level,
            interested: self.interested,
        }
    }
}
