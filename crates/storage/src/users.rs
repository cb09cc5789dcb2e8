use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use skillz_core::types::{Domain, ManagementRow, UpdateRow, UserRecord, WebUserRow};

use crate::{constraint_violation, to_rfc3339, Constraint};

/// Repository for users, their roles and management links.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists every user ordered by name.
    pub async fn get_users(&self) -> Result<Vec<UserRecord>, UserError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, diploma, address, phone, manager_id \
             FROM users ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_domain).collect())
    }

    /// Lists users holding `role`, ordered by name.
    pub async fn get_users_with_roles(&self, role: &str) -> Result<Vec<UserRecord>, UserError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.name, u.email, u.diploma, u.address, u.phone, u.manager_id \
             FROM users AS u \
             JOIN user_roles AS r ON r.user_id = u.id \
             WHERE r.role = ? \
             ORDER BY u.name, u.id",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_domain).collect())
    }

    /// Returns one row per user and domain with the summed skill level in that domain.
    ///
    /// Rows of a user are contiguous. Users without any classified skill yield a
    /// single row without domain.
    pub async fn get_web_users(&self, role: Option<&str>) -> Result<Vec<WebUserRow>, UserError> {
        let rows = sqlx::query_as::<_, WebUserDbRow>(
            r#"
SELECT u.id AS user_id,
       u.name AS user_name,
       u.email,
       u.diploma,
       d.id AS domain_id,
       d.name AS domain_name,
       d.color AS domain_color,
       COALESCE(SUM(us.level), 0) AS domain_score
  FROM users AS u
  LEFT JOIN user_skills AS us ON us.user_id = u.id
  LEFT JOIN skills AS s ON s.id = us.skill_id
  LEFT JOIN domains AS d ON d.id = s.domain_id
 WHERE ?1 IS NULL
    OR EXISTS (SELECT 1 FROM user_roles AS r WHERE r.user_id = u.id AND r.role = ?1)
 GROUP BY u.id, d.id
 ORDER BY u.name, u.id, domain_score DESC, d.name
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WebUserDbRow::into_domain).collect())
    }

    pub async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, UserError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, diploma, address, phone, manager_id FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_domain))
    }

    /// Loads a user together with the stored password hash, looked up by email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<Credentials>, UserError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, name, email, diploma, address, phone, manager_id, password \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CredentialsRow::into_domain))
    }

    /// Returns the password hash of a user; `None` when the user never set one.
    pub async fn find_password_hash(&self, user_id: i64) -> Result<Option<String>, UserError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT password FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(hash,)| hash).ok_or(UserError::NotFound)
    }

    pub async fn find_user_roles_by_id(&self, user_id: i64) -> Result<Vec<String>, UserError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id = ? ORDER BY role")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(role,)| role).collect())
    }

    /// Inserts a user and returns its identifier.
    pub async fn create_user(&self, user: &NewUser) -> Result<i64, UserError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO users (name, email, password, diploma, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.diploma)
        .bind(to_rfc3339(user.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_error)?;

        Ok(row.0)
    }

    /// Applies the provided changes; absent fields keep their current value.
    /// A blank diploma clears the stored one.
    pub async fn update_user(&self, user_id: i64, changes: &UserChanges) -> Result<(), UserError> {
        let result = sqlx::query(
            "UPDATE users \
             SET name = COALESCE(?1, name), \
                 email = COALESCE(?2, email), \
                 diploma = CASE WHEN ?3 IS NULL THEN diploma ELSE NULLIF(TRIM(?3), '') END \
             WHERE id = ?4",
        )
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.diploma)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_user_error)?;

        ensure_affected(result.rows_affected())
    }

    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<(), UserError> {
        let result = sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        ensure_affected(result.rows_affected())
    }

    pub async fn update_phone(&self, user_id: i64, phone: Option<&str>) -> Result<(), UserError> {
        let result = sqlx::query("UPDATE users SET phone = ? WHERE id = ?")
            .bind(phone)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        ensure_affected(result.rows_affected())
    }

    pub async fn update_address(
        &self,
        user_id: i64,
        address: Option<&str>,
    ) -> Result<(), UserError> {
        let result = sqlx::query("UPDATE users SET address = ? WHERE id = ?")
            .bind(address)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        ensure_affected(result.rows_affected())
    }

    /// Sets (or clears, with `None`) the manager of a user.
    pub async fn assign_manager(
        &self,
        user_id: i64,
        manager_id: Option<i64>,
    ) -> Result<(), UserError> {
        let result = sqlx::query("UPDATE users SET manager_id = ? WHERE id = ?")
            .bind(manager_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|err| match constraint_violation(&err) {
                Some(Constraint::ForeignKey) => UserError::UnknownManager,
                _ => UserError::Database(err),
            })?;

        ensure_affected(result.rows_affected())
    }

    /// Grants `role` to a user. Granting an existing role is a no-op.
    pub async fn add_role(&self, user_id: i64, role: &str) -> Result<(), UserError> {
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?, ?)")
            .bind(user_id)
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(|err| match constraint_violation(&err) {
                Some(Constraint::ForeignKey) => UserError::NotFound,
                _ => UserError::Database(err),
            })?;

        Ok(())
    }

    /// Deletes a user; roles and skills cascade, managed users lose their manager.
    pub async fn delete_user_by_id(&self, user_id: i64) -> Result<(), UserError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        ensure_affected(result.rows_affected())
    }

    /// Lists every user with their manager, ordered by user name.
    pub async fn get_management(&self) -> Result<Vec<ManagementRow>, UserError> {
        let rows = sqlx::query_as::<_, ManagementDbRow>(
            "SELECT u.id AS user_id, u.name AS user_name, m.id AS manager_id, m.name AS manager_name \
             FROM users AS u \
             LEFT JOIN users AS m ON m.id = u.manager_id \
             ORDER BY u.name, u.id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ManagementRow {
                user_id: row.user_id,
                user_name: row.user_name,
                manager_id: row.manager_id,
                manager_name: row.manager_name,
            })
            .collect())
    }

    /// Returns the most recent skill changes, newest first.
    pub async fn get_updates(&self, limit: u32) -> Result<Vec<UpdateRow>, UserError> {
        let rows = sqlx::query_as::<_, UpdateDbRow>(
            r#"
SELECT us.id AS user_skill_id,
       us.updated_at AS skill_date,
       us.level AS skill_level,
       us.interested AS skill_interested,
       s.id AS skill_id,
       s.name AS skill_name,
       d.name AS domain_name,
       d.color AS color,
       u.id AS user_id,
       u.name AS user_name,
       u.email AS user_email,
       u.diploma AS user_diploma
  FROM user_skills AS us
  JOIN skills AS s ON s.id = us.skill_id
  JOIN users AS u ON u.id = us.user_id
  LEFT JOIN domains AS d ON d.id = s.domain_id
 ORDER BY us.updated_at DESC, us.id DESC
 LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UpdateDbRow::into_domain).collect())
    }
}

fn ensure_affected(rows: u64) -> Result<(), UserError> {
    if rows == 0 {
        return Err(UserError::NotFound);
    }
    Ok(())
}

fn map_user_error(err: sqlx::Error) -> UserError {
    match constraint_violation(&err) {
        Some(Constraint::Unique) => UserError::DuplicateEmail,
        _ => UserError::Database(err),
    }
}

/// Data required to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub diploma: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update of a user's identity fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub diploma: Option<String>,
}

/// A user with the password hash stored for them.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: UserRecord,
    pub password_hash: Option<String>,
}

/// Errors that can occur while reading or mutating users.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error("manager does not exist")]
    UnknownManager,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: Option<String>,
    diploma: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    manager_id: Option<i64>,
}

impl UserRow {
    fn into_domain(self) -> UserRecord {
        UserRecord {
            id: self.id,
            name: self.name,
            email: self.email,
            diploma: self.diploma,
            address: self.address,
            phone: self.phone,
            manager_id: self.manager_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password: Option<String>,
}

impl CredentialsRow {
    fn into_domain(self) -> Credentials {
        Credentials {
            user: self.user.into_domain(),
            password_hash: self.password,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebUserDbRow {
    user_id: i64,
    user_name: String,
    email: Option<String>,
    diploma: Option<String>,
    domain_id: Option<i64>,
    domain_name: Option<String>,
    domain_color: Option<String>,
    domain_score: i64,
}

impl WebUserDbRow {
    fn into_domain(self) -> WebUserRow {
        let domain = match (self.domain_id, self.domain_name) {
            (Some(id), Some(name)) => Some(Domain {
                id,
                name,
                color: self.domain_color,
            }),
            _ => None,
        };
        WebUserRow {
            user_id: self.user_id,
            user_name: self.user_name,
            email: self.email,
            diploma: self.diploma,
            domain,
            domain_score: self.domain_score,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ManagementDbRow {
    user_id: i64,
    user_name: String,
    manager_id: Option<i64>,
    manager_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct UpdateDbRow {
    user_skill_id: i64,
    skill_date: DateTime<Utc>,
    skill_level: i64,
    skill_interested: bool,
    skill_id: i64,
    skill_name: String,
    domain_name: Option<String>,
    color: Option<String>,
    user_id: i64,
    user_name: String,
    user_email: Option<String>,
    user_diploma: Option<String>,
}

impl UpdateDbRow {
    fn into_domain(self) -> UpdateRow {
        UpdateRow {
            user_skill_id: self.user_skill_id,
            date: self.skill_date,
            skill_id: self.skill_id,
            skill_name: self.skill_name,
            level: self.skill_level,
            interested: self.skill_interested,
            domain_name: self.domain_name,
            color: self.color,
            user: UserRecord {
                id: self.user_id,
                name: self.user_name,
                email: self.user_email,
                diploma: self.user_diploma,
                ..UserRecord::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, setup_db};

    #[tokio::test]
    async fn create_and_find_user() {
        let db = setup_db().await;
        let repo = db.users();
        let id = insert_user(&db, "Julien", Some("jsmadja@xebia.fr")).await;

        let user = repo
            .find_user_by_id(id)
            .await
            .expect("query")
            .expect("user exists");
        assert_eq!(user.name, "Julien");
        assert_eq!(user.email.as_deref(), Some("jsmadja@xebia.fr"));
        assert!(repo.find_user_by_id(id + 1).await.expect("query").is_none());

        let credentials = repo
            .find_user_by_email("jsmadja@xebia.fr")
            .await
            .expect("query")
            .expect("credentials");
        assert_eq!(credentials.user.id, id);
        assert_eq!(credentials.password_hash, None);
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let db = setup_db().await;
        insert_user(&db, "A", Some("a@xebia.fr")).await;
        let err = db
            .users()
            .create_user(&NewUser {
                name: "B".to_string(),
                email: Some("a@xebia.fr".to_string()),
                password_hash: None,
                diploma: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::DuplicateEmail));
    }

    #[tokio::test]
    async fn update_user_keeps_absent_fields() {
        let db = setup_db().await;
        let repo = db.users();
        let id = insert_user(&db, "Julien", Some("j@xebia.fr")).await;

        repo.update_user(
            id,
            &UserChanges {
                diploma: Some("2010".to_string()),
                ..UserChanges::default()
            },
        )
        .await
        .expect("update");
        repo.update_phone(id, Some("0134567897")).await.expect("phone");
        repo.update_address(id, Some("1 rue du yaourt"))
            .await
            .expect("address");

        let user = repo.find_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.name, "Julien");
        assert_eq!(user.email.as_deref(), Some("j@xebia.fr"));
        assert_eq!(user.diploma.as_deref(), Some("2010"));
        assert_eq!(user.phone.as_deref(), Some("0134567897"));
        assert_eq!(user.address.as_deref(), Some("1 rue du yaourt"));
    }

    #[tokio::test]
    async fn blank_diploma_clears_the_stored_value() {
        let db = setup_db().await;
        let repo = db.users();
        let id = insert_user(&db, "Julien", None).await;
        repo.update_user(
            id,
            &UserChanges {
                diploma: Some("2010".to_string()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap();

        repo.update_user(
            id,
            &UserChanges {
                diploma: Some("   ".to_string()),
                ..UserChanges::default()
            },
        )
        .await
        .expect("update");

        let user = repo.find_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.diploma, None);
    }

    #[tokio::test]
    async fn deleting_user_removes_roles_and_skills() {
        let db = setup_db().await;
        let repo = db.users();
        let id = insert_user(&db, "Julien", None).await;
        let other = insert_user(&db, "Alban", None).await;
        repo.add_role(id, "Manager").await.unwrap();
        for user in [id, other] {
            db.skills()
                .upsert_user_skill(
                    user,
                    &crate::UserSkillInput {
                        name: "Rust".to_string(),
                        level: 2,
                        interested: true,
                        date: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        repo.delete_user_by_id(id).await.expect("delete");

        let (roles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_roles WHERE user_id = ?")
            .bind(id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        let (skills,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_skills WHERE user_id = ?")
                .bind(id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(roles, 0);
        assert_eq!(skills, 0);
        assert_eq!(db.skills().find_user_skills_by_id(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updates_on_missing_user_report_not_found() {
        let db = setup_db().await;
        let repo = db.users();
        assert!(matches!(
            repo.update_phone(42, Some("0")).await,
            Err(UserError::NotFound)
        ));
        assert!(matches!(
            repo.delete_user_by_id(42).await,
            Err(UserError::NotFound)
        ));
        assert!(matches!(
            repo.find_password_hash(42).await,
            Err(UserError::NotFound)
        ));
    }

    #[tokio::test]
    async fn assign_manager_validates_manager() {
        let db = setup_db().await;
        let repo = db.users();
        let boss = insert_user(&db, "Christophe", None).await;
        let dev = insert_user(&db, "Alban", None).await;

        repo.assign_manager(dev, Some(boss)).await.expect("assign");
        let user = repo.find_user_by_id(dev).await.unwrap().unwrap();
        assert_eq!(user.manager_id, Some(boss));

        let err = repo.assign_manager(dev, Some(999)).await.unwrap_err();
        assert!(matches!(err, UserError::UnknownManager));
    }

    #[tokio::test]
    async fn roles_are_idempotent_and_filter_users() {
        let db = setup_db().await;
        let repo = db.users();
        let boss = insert_user(&db, "Christophe", None).await;
        insert_user(&db, "Alban", None).await;

        repo.add_role(boss, "Manager").await.expect("add role");
        repo.add_role(boss, "Manager").await.expect("add role twice");

        assert_eq!(
            repo.find_user_roles_by_id(boss).await.unwrap(),
            vec!["Manager".to_string()]
        );
        let managers = repo.get_users_with_roles("Manager").await.unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].id, boss);
        assert_eq!(repo.get_users().await.unwrap().len(), 2);

        assert!(matches!(
            repo.add_role(999, "Manager").await,
            Err(UserError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_manager_detaches_reports() {
        let db = setup_db().await;
        let repo = db.users();
        let boss = insert_user(&db, "Christophe", None).await;
        let dev = insert_user(&db, "Alban", None).await;
        repo.assign_manager(dev, Some(boss)).await.unwrap();

        repo.delete_user_by_id(boss).await.expect("delete");

        let rows = repo.get_management().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, dev);
        assert_eq!(rows[0].manager_id, None);
    }

    #[tokio::test]
    async fn management_joins_manager_names() {
        let db = setup_db().await;
        let repo = db.users();
        let boss = insert_user(&db, "Christophe Heubès", None).await;
        let dev = insert_user(&db, "Alban Smadja", None).await;
        repo.assign_manager(dev, Some(boss)).await.unwrap();

        let rows = repo.get_management().await.unwrap();
        assert_eq!(
            rows,
            vec![
                ManagementRow {
                    user_id: dev,
                    user_name: "Alban Smadja".to_string(),
                    manager_id: Some(boss),
                    manager_name: Some("Christophe Heubès".to_string()),
                },
                ManagementRow {
                    user_id: boss,
                    user_name: "Christophe Heubès".to_string(),
                    manager_id: None,
                    manager_name: None,
                },
            ]
        );
    }
}
