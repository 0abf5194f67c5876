//! The single authorization policy for project-scoped operations. Membership
//! is re-fetched from the database on every call; nothing is cached between
//! requests.

use diesel::{ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl};

use crate::db::models::Project;
use crate::db::schema::{project_members, projects};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Leader,
}

/// What a successful check hands back: the project row plus its member ids in
/// join order (the promotion order when the leader leaves).
pub struct ProjectAccess {
    pub project: Project,
    pub member_ids: Vec<String>,
}

impl ProjectAccess {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|id| id == user_id)
    }
}

pub fn require_role(
    conn: &PgConnection,
    project_id: &str,
    caller_id: &str,
    role: Role,
) -> Result<ProjectAccess, AppError> {
    let mut found: Vec<Project> = projects::table
        .filter(projects::id.eq(project_id))
        .limit(1)
        .load(conn)?;
    let project = found.pop().ok_or(AppError::NotFound("project"))?;

    let member_ids: Vec<String> = project_members::table
        .filter(project_members::project_id.eq(project_id))
        .order((project_members::joined_at.asc(), project_members::user_id.asc()))
        .select(project_members::user_id)
        .load(conn)?;

    decide(&project.leader_id, &member_ids, caller_id, role)?;
    Ok(ProjectAccess { project, member_ids })
}

fn decide(
    leader_id: &str,
    member_ids: &[String],
    caller_id: &str,
    role: Role,
) -> Result<(), AppError> {
    if !member_ids.iter().any(|id| id == caller_id) {
        return Err(AppError::PermissionDenied(
            "caller is not a member of this project",
        ));
    }
    if role == Role::Leader && caller_id != leader_id {
        return Err(AppError::PermissionDenied(
            "operation requires the project leader",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn member_passes_member_check() {
        assert!(decide("u1", &members(&["u1", "u2"]), "u2", Role::Member).is_ok());
    }

    #[test]
    fn non_member_is_denied() {
        let err = decide("u1", &members(&["u1", "u2"]), "u3", Role::Member).unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[test]
    fn plain_member_cannot_pass_leader_check() {
        let err = decide("u1", &members(&["u1", "u2"]), "u2", Role::Leader).unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[test]
    fn leader_passes_both_checks() {
        assert!(decide("u1", &members(&["u1", "u2"]), "u1", Role::Member).is_ok());
        assert!(decide("u1", &members(&["u1", "u2"]), "u1", Role::Leader).is_ok());
    }
}
