use crate::profile::user_view;
use crate::types::{SkillUpdate, UpdateRow, UpdatedSkill, UserUpdates};

/// Groups recent skill changes per user.
///
/// `rows` are expected newest first; users appear in the order of their most
/// recent change and each user's updates keep the row order.
pub fn group_updates(rows: Vec<UpdateRow>, current_year: i32) -> Vec<UserUpdates> {
    let mut grouped: Vec<UserUpdates> = Vec::new();

    for row in rows {
        let update = SkillUpdate {
            id: row.user_skill_id,
            date: row.date,
            skill: UpdatedSkill {
                id: row.skill_id,
                name: row.skill_name,
                level: row.level,
                interested: row.interested,
                domain: row.domain_name,
                color: row.color,
            },
        };

        match grouped.iter_mut().find(|entry| entry.user.id == row.user.id) {
            Some(entry) => entry.updates.push(update),
            None => grouped.push(UserUpdates {
                user: user_view(&row.user, current_year),
                updates: vec![update],
            }),
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRecord;
    use chrono::{TimeZone, Utc};

    fn michael() -> UserRecord {
        UserRecord {
            id: 272,
            name: "Michaël OHAYON".to_string(),
            email: Some("mohayon@xebia.fr".to_string()),
            ..UserRecord::default()
        }
    }

    fn row(
        user_skill_id: i64,
        minute: u32,
        skill: (i64, &str),
        interested: bool,
        domain: (&str, &str),
        user: UserRecord,
    ) -> UpdateRow {
        UpdateRow {
            user_skill_id,
            date: Utc.with_ymd_and_hms(2016, 11, 10, 13, minute, 0).unwrap(),
            skill_id: skill.0,
            skill_name: skill.1.to_string(),
            level: 1,
            interested,
            domain_name: Some(domain.0.to_string()),
            color: Some(domain.1.to_string()),
            user,
        }
    }

    #[test]
    fn groups_updates_under_their_user() {
        let grouped = group_updates(
            vec![
                row(7730, 6, (1040, "Ionic"), false, ("Mobile", "#6186ea"), michael()),
                row(7729, 5, (943, "tensorflow"), true, ("Data", "#d7d5d0"), michael()),
                row(7728, 4, (940, "Firebase"), true, ("Mobile", "#6186ea"), michael()),
            ],
            2016,
        );

        assert_eq!(grouped.len(), 1);
        let entry = &grouped[0];
        assert_eq!(entry.user.readable_id, "michaël-ohayon");
        assert_eq!(entry.user.experience_counter, 0);
        assert_eq!(
            entry.user.gravatar_url,
            "//www.gravatar.com/avatar/fd10bdaf3f264f4054a95ceaa6118b14"
        );
        let ids: Vec<_> = entry.updates.iter().map(|u| u.id).collect();
        assert_eq!(ids, [7730, 7729, 7728]);
        assert_eq!(entry.updates[1].skill.domain.as_deref(), Some("Data"));
        assert!(entry.updates[1].skill.interested);
        assert!(!entry.updates[0].skill.interested);
    }

    #[test]
    fn users_ordered_by_latest_change() {
        let other = UserRecord {
            id: 3,
            name: "Alice".to_string(),
            ..UserRecord::default()
        };
        let grouped = group_updates(
            vec![
                row(3, 9, (1, "Rust"), true, ("Back", "#000"), other.clone()),
                row(2, 8, (2, "Swift"), false, ("Mobile", "#111"), michael()),
                row(1, 7, (3, "Go"), false, ("Back", "#000"), other),
            ],
            2016,
        );

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].user.id, 3);
        assert_eq!(grouped[0].updates.len(), 2);
        assert_eq!(grouped[1].user.id, 272);
    }

    #[test]
    fn update_dates_serialize_as_rfc3339_utc() {
        let grouped = group_updates(
            vec![row(7730, 6, (1040, "Ionic"), false, ("Mobile", "#6186ea"), michael())],
            2016,
        );

        let json = serde_json::to_value(&grouped).expect("serialize");
        assert_eq!(json[0]["updates"][0]["date"], "2016-11-10T13:06:00Z");
        assert_eq!(json[0]["updates"][0]["skill"]["color"], "#6186ea");
        assert_eq!(json[0]["user"]["experienceCounter"], 0);
    }
}
