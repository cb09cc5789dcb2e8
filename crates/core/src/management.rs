use std::cmp::Ordering;

use crate::types::{ManagementGroup, ManagementRow, ManagerRef, UserRef};

/// Groups users under their manager.
///
/// Users keep the order of `rows`. Groups are sorted by manager name, and
/// the group of users without a manager comes last.
pub fn group_by_manager(rows: Vec<ManagementRow>) -> Vec<ManagementGroup> {
    let mut groups: Vec<ManagementGroup> = Vec::new();

    for row in rows {
        let user = UserRef {
            id: row.user_id,
            name: row.user_name,
        };
        match groups
            .iter_mut()
            .find(|group| group.manager.id == row.manager_id)
        {
            Some(group) => group.users.push(user),
            None => groups.push(ManagementGroup {
                manager: ManagerRef {
                    id: row.manager_id,
                    name: row.manager_name,
                },
                users: vec![user],
            }),
        }
    }

    groups.sort_by(|a, b| compare_managers(&a.manager, &b.manager));
    groups
}

fn compare_managers(a: &ManagerRef, b: &ManagerRef) -> Ordering {
    match (a.id, b.id) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(_), Some(_)) => a.name.cmp(&b.name),
    }
}
