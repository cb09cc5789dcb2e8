use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role granted to users promoted to manager.
pub const MANAGER_ROLE: &str = "Manager";

/// A user as persisted in the `users` table, without credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub diploma: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub manager_id: Option<i64>,
}

/// A competency category with an optional display color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
}

/// Minimal reference to a skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRef {
    pub id: i64,
    pub name: String,
}

/// A skill held by a user, joined with its domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSkillRecord {
    pub id: i64,
    pub skill_id: i64,
    pub name: String,
    pub level: i64,
    pub interested: bool,
    pub date: DateTime<Utc>,
    pub domain: Option<Domain>,
}

/// One row of the user/manager self join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementRow {
    pub user_id: i64,
    pub user_name: String,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

/// One row per (user, domain) with the summed level of the user's skills in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebUserRow {
    pub user_id: i64,
    pub user_name: String,
    pub email: Option<String>,
    pub diploma: Option<String>,
    pub domain: Option<Domain>,
    pub domain_score: i64,
}

/// One user skill change joined with its user, skill and domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRow {
    pub user_skill_id: i64,
    pub date: DateTime<Utc>,
    pub skill_id: i64,
    pub skill_name: String,
    pub level: i64,
    pub interested: bool,
    pub domain_name: Option<String>,
    pub color: Option<String>,
    pub user: UserRecord,
}

/// One row of the domains/skills left join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSkillRow {
    pub domain: Domain,
    pub skill: Option<SkillRef>,
}

/// A user holding a skill, with their level and interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillHolder {
    pub user: UserRecord,
    pub level: i64,
    pub interested: bool,
}

/// Catalogue entry for a skill with the number of users holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillSummary {
    pub id: i64,
    pub name: String,
    pub domain: Option<Domain>,
    pub user_count: i64,
}

/// Public representation of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub readable_id: String,
    #[serde(rename = "gravatarUrl")]
    pub gravatar_url: String,
    #[serde(rename = "experienceCounter")]
    pub experience_counter: i32,
    pub manager_id: Option<i64>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Reference to a user by id and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
}

/// Manager header of a management group; both fields are null for unmanaged users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerRef {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// Users reporting to the same manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagementGroup {
    pub manager: ManagerRef,
    pub users: Vec<UserRef>,
}

/// User view with the manager attached when the user has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedUser {
    #[serde(flatten)]
    pub user: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<UserRef>,
}

/// Score of a user in one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainScore {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub score: i64,
}

/// Listing entry for the web client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebUser {
    pub id: i64,
    pub name: String,
    pub readable_id: String,
    #[serde(rename = "gravatarUrl")]
    pub gravatar_url: String,
    #[serde(rename = "experienceCounter")]
    pub experience_counter: i32,
    pub domains: Vec<DomainScore>,
    pub score: i64,
}

/// A user skill as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillView {
    pub id: i64,
    pub skill_id: i64,
    pub name: String,
    pub level: i64,
    pub interested: bool,
    pub date: DateTime<Utc>,
}

/// A user's skills nested under one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSkills {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub score: i64,
    pub skills: Vec<SkillView>,
}

/// Full user profile: the view, its manager, roles and skills grouped by domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<UserRef>,
    pub roles: Vec<String>,
    pub domains: Vec<DomainSkills>,
    pub score: i64,
}

/// Skill details carried by an update entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedSkill {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub interested: bool,
    pub domain: Option<String>,
    pub color: Option<String>,
}

/// A single dated change to a user's skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillUpdate {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub skill: UpdatedSkill,
}

/// Recent updates of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUpdates {
    pub user: UserView,
    pub updates: Vec<SkillUpdate>,
}

/// A domain with the skills classified under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainWithSkills {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub skills: Vec<SkillRef>,
}

/// A user holding a given skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkilledUser {
    #[serde(flatten)]
    pub user: UserView,
    pub level: i64,
    pub interested: bool,
}
