use crate::profile::{experience_counter, gravatar_url, readable_id};
use crate::types::{
    DomainScore, DomainSkillRow, DomainSkills, DomainWithSkills, SkillView, UserSkillRecord,
    WebUser, WebUserRow,
};

/// Folds per-domain score rows into one entry per user.
///
/// Rows of the same user must be contiguous. Rows without a domain still
/// produce the user, with no domain attached.
pub fn web_users(rows: Vec<WebUserRow>, current_year: i32) -> Vec<WebUser> {
    let mut users: Vec<WebUser> = Vec::new();

    for row in rows {
        let needs_new = users.last().map_or(true, |user| user.id != row.user_id);
        if needs_new {
            users.push(WebUser {
                id: row.user_id,
                readable_id: readable_id(&row.user_name),
                gravatar_url: gravatar_url(row.email.as_deref()),
                experience_counter: experience_counter(row.diploma.as_deref(), current_year),
                name: row.user_name,
                domains: Vec::new(),
                score: 0,
            });
        }

        let Some(user) = users.last_mut() else {
            continue;
        };
        if let Some(domain) = row.domain {
            user.score += row.domain_score;
            user.domains.push(DomainScore {
                id: domain.id,
                name: domain.name,
                color: domain.color,
                score: row.domain_score,
            });
        }
    }

    users
}

/// Sorts web users by descending score, keeping the incoming order for ties.
pub fn rank_by_score(users: &mut [WebUser]) {
    users.sort_by(|a, b| b.score.cmp(&a.score));
}

/// Nests a user's skills under their domain with a per-domain score.
///
/// Skills without a domain are left out. Domains are ordered by descending
/// score, then by name.
pub fn group_skills_by_domain(skills: Vec<UserSkillRecord>) -> Vec<DomainSkills> {
    let mut domains: Vec<DomainSkills> = Vec::new();

    for record in skills {
        let Some(domain) = record.domain else {
            continue;
        };
        let view = SkillView {
            id: record.id,
            skill_id: record.skill_id,
            name: record.name,
            level: record.level,
            interested: record.interested,
            date: record.date,
        };

        match domains.iter_mut().find(|entry| entry.id == domain.id) {
            Some(entry) => {
                entry.score += view.level;
                entry.skills.push(view);
            }
            None => domains.push(DomainSkills {
                id: domain.id,
                name: domain.name,
                color: domain.color,
                score: view.level,
                skills: vec![view],
            }),
        }
    }

    domains.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    domains
}

/// Total score across domains.
pub fn total_score(domains: &[DomainSkills]) -> i64 {
    domains.iter().map(|domain| domain.score).sum()
}

/// Merges flat domain/skill join rows into domains carrying their skills.
pub fn nest_domain_skills(rows: Vec<DomainSkillRow>) -> Vec<DomainWithSkills> {
    let mut domains: Vec<DomainWithSkills> = Vec::new();

    for row in rows {
        let needs_new = domains.last().map_or(true, |d| d.id != row.domain.id);
        if needs_new {
            domains.push(DomainWithSkills {
                id: row.domain.id,
                name: row.domain.name,
                color: row.domain.color,
                skills: Vec::new(),
            });
        }
        if let (Some(skill), Some(domain)) = (row.skill, domains.last_mut()) {
            domain.skills.push(skill);
        }
    }

    domains
}
