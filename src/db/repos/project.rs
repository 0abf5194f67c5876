use chrono::{DateTime, Utc};
use diesel::{
    delete, insert_into, update, Connection, ExpressionMethods, PgConnection, QueryDsl,
    RunQueryDsl,
};
use uuid::Uuid;

use crate::db::models::{
    NewKanbanColumn, NewPoll, NewPollOption, NewProject, NewProjectMember, NewTask, NewThread,
    Project, ProjectChangeSet,
};
use crate::db::schema::{kanban_columns, poll_options, polls, project_members, projects, tasks, threads};
use crate::error::AppError;

pub struct ProjectDetail {
    pub project: Project,
    pub member_ids: Vec<String>,
}

pub fn load(conn: &PgConnection, project_id: &str) -> Result<Project, AppError> {
    let mut found: Vec<Project> = projects::table
        .filter(projects::id.eq(project_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("project"))
}

/// Member ids in join order; the first entry is the promotion candidate when
/// the leader leaves.
pub fn member_ids(conn: &PgConnection, project_id: &str) -> Result<Vec<String>, AppError> {
    let ids = project_members::table
        .filter(project_members::project_id.eq(project_id))
        .order((project_members::joined_at.asc(), project_members::user_id.asc()))
        .select(project_members::user_id)
        .load(conn)?;
    Ok(ids)
}

pub fn detail(conn: &PgConnection, project_id: &str) -> Result<ProjectDetail, AppError> {
    let project = load(conn, project_id)?;
    let member_ids = member_ids(conn, project_id)?;
    Ok(ProjectDetail { project, member_ids })
}

pub fn create(
    conn: &PgConnection,
    caller_id: &str,
    name: &str,
    description: &str,
    due_date: Option<DateTime<Utc>>,
) -> Result<ProjectDetail, AppError> {
    let project_id = Uuid::new_v4().to_string();
    let invite_password = Uuid::new_v4().to_string();
    conn.transaction::<_, AppError, _>(|| {
        insert_into(projects::table)
            .values(NewProject {
                id: &project_id,
                name,
                description,
                due_date,
                leader_id: caller_id,
                invite_password: &invite_password,
            })
            .execute(conn)?;
        insert_into(project_members::table)
            .values(NewProjectMember {
                project_id: &project_id,
                user_id: caller_id,
            })
            .execute(conn)?;
        detail(conn, &project_id)
    })
}

pub fn list_for_member(conn: &PgConnection, user_id: &str) -> Result<Vec<ProjectDetail>, AppError> {
    let project_ids: Vec<String> = project_members::table
        .filter(project_members::user_id.eq(user_id))
        .order(project_members::joined_at.asc())
        .select(project_members::project_id)
        .load(conn)?;
    let mut details = Vec::with_capacity(project_ids.len());
    for project_id in &project_ids {
        details.push(detail(conn, project_id)?);
    }
    Ok(details)
}

pub fn update_metadata(
    conn: &PgConnection,
    project_id: &str,
    change_set: ProjectChangeSet,
    due_date: Option<Option<DateTime<Utc>>>,
) -> Result<ProjectDetail, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        if change_set.name.is_some() || change_set.description.is_some() {
            update(projects::table.filter(projects::id.eq(project_id)))
                .set(&change_set)
                .execute(conn)?;
        }
        if let Some(new_due_date) = due_date {
            update(projects::table.filter(projects::id.eq(project_id)))
                .set(projects::due_date.eq(new_due_date))
                .execute(conn)?;
        }
        detail(conn, project_id)
    })
}

/// Deletes the project row; members, columns, tasks, threads, replies, files,
/// polls, options and votes all go with it through the cascade chain.
pub fn remove(conn: &PgConnection, project_id: &str) -> Result<ProjectDetail, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        let dropped = detail(conn, project_id)?;
        delete(projects::table.filter(projects::id.eq(project_id))).execute(conn)?;
        Ok(dropped)
    })
}

pub fn transfer_leadership(
    conn: &PgConnection,
    project_id: &str,
    new_leader_id: &str,
) -> Result<ProjectDetail, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        let current = detail(conn, project_id)?;
        if !current.member_ids.iter().any(|id| id == new_leader_id) {
            return Err(AppError::FailedPrecondition(
                "new leader must already be a project member".to_string(),
            ));
        }
        update(projects::table.filter(projects::id.eq(project_id)))
            .set(projects::leader_id.eq(new_leader_id))
            .execute(conn)?;
        detail(conn, project_id)
    })
}

/// Removes a member. The last remaining member cannot be removed (the project
/// has to be deleted instead); removing the leader promotes the first
/// remaining member in join order.
pub fn remove_member(
    conn: &PgConnection,
    project_id: &str,
    member_id: &str,
) -> Result<ProjectDetail, AppError> {
    conn.build_transaction().serializable().run(|| {
        let current = detail(conn, project_id)?;
        if !current.member_ids.iter().any(|id| id == member_id) {
            return Err(AppError::FailedPrecondition(
                "user is not a member of this project".to_string(),
            ));
        }
        if current.member_ids.len() == 1 {
            return Err(AppError::FailedPrecondition(
                "cannot remove the last member; delete the project instead".to_string(),
            ));
        }
        delete(
            project_members::table
                .filter(project_members::project_id.eq(project_id))
                .filter(project_members::user_id.eq(member_id)),
        )
        .execute(conn)?;
        if current.project.leader_id == member_id {
            let successor = member_ids(conn, project_id)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppError::FailedPrecondition("project has no remaining members".to_string())
                })?;
            update(projects::table.filter(projects::id.eq(project_id)))
                .set(projects::leader_id.eq(&successor))
                .execute(conn)?;
        }
        detail(conn, project_id)
    })
}

pub fn regenerate_invite_password(
    conn: &PgConnection,
    project_id: &str,
) -> Result<String, AppError> {
    let invite_password = Uuid::new_v4().to_string();
    update(projects::table.filter(projects::id.eq(project_id)))
        .set(projects::invite_password.eq(&invite_password))
        .execute(conn)?;
    Ok(invite_password)
}

pub fn join(
    conn: &PgConnection,
    project_id: &str,
    caller_id: &str,
    invite_password: &str,
) -> Result<ProjectDetail, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        let current = detail(conn, project_id)?;
        if current.project.invite_password != invite_password {
            return Err(AppError::PermissionDenied("invalid invite password"));
        }
        if current.member_ids.iter().any(|id| id == caller_id) {
            return Err(AppError::FailedPrecondition(
                "caller is already a member of this project".to_string(),
            ));
        }
        insert_into(project_members::table)
            .values(NewProjectMember {
                project_id,
                user_id: caller_id,
            })
            .execute(conn)?;
        detail(conn, project_id)
    })
}

pub fn set_thumbnail_key(
    conn: &PgConnection,
    project_id: &str,
    key: &str,
) -> Result<(), AppError> {
    update(projects::table.filter(projects::id.eq(project_id)))
        .set(projects::thumbnail_key.eq(key))
        .execute(conn)?;
    Ok(())
}

/// Seeds a ready-made project for first-time users: three columns, a couple
/// of starter tasks, a welcome thread and a sample poll, all in one
/// serializable transaction.
pub fn create_demo(conn: &PgConnection, caller_id: &str) -> Result<ProjectDetail, AppError> {
    let project_id = Uuid::new_v4().to_string();
    let invite_password = Uuid::new_v4().to_string();
    conn.build_transaction().serializable().run(|| {
        insert_into(projects::table)
            .values(NewProject {
                id: &project_id,
                name: "Demo project",
                description: "A ready-made project to look around in.",
                due_date: None,
                leader_id: caller_id,
                invite_password: &invite_password,
            })
            .execute(conn)?;
        insert_into(project_members::table)
            .values(NewProjectMember {
                project_id: &project_id,
                user_id: caller_id,
            })
            .execute(conn)?;

        let column_names = ["To do", "In progress", "Done"];
        let column_ids: Vec<String> = column_names
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        for (index, (column_id, name)) in column_ids.iter().zip(column_names.iter()).enumerate() {
            insert_into(kanban_columns::table)
                .values(NewKanbanColumn {
                    id: column_id,
                    project_id: &project_id,
                    name,
                    sort_order: index as i32,
                })
                .execute(conn)?;
        }
        let starter_tasks = ["Invite your team", "Create your first task"];
        for (index, title) in starter_tasks.iter().enumerate() {
            insert_into(tasks::table)
                .values(NewTask {
                    id: &Uuid::new_v4().to_string(),
                    kanban_column_id: &column_ids[0],
                    title,
                    description: "",
                    sort_order: index as i32,
                })
                .execute(conn)?;
        }

        insert_into(threads::table)
            .values(NewThread {
                id: &Uuid::new_v4().to_string(),
                project_id: &project_id,
                author_id: caller_id,
                title: "Welcome",
                content: "This demo project shows the board, threads and polls.",
            })
            .execute(conn)?;

        let poll_id = Uuid::new_v4().to_string();
        insert_into(polls::table)
            .values(NewPoll {
                id: &poll_id,
                project_id: &project_id,
                title: "Is this board useful?",
            })
            .execute(conn)?;
        for (index, title) in ["Yes", "Not yet"].iter().enumerate() {
            insert_into(poll_options::table)
                .values(NewPollOption {
                    id: &Uuid::new_v4().to_string(),
                    poll_id: &poll_id,
                    title,
                    sort_order: index as i32,
                })
                .execute(conn)?;
        }

        detail(conn, &project_id)
    })
}
