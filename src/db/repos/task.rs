use chrono::{DateTime, Utc};
use diesel::{
    delete, insert_into, update, Connection, ExpressionMethods, PgConnection, QueryDsl,
    RunQueryDsl,
};
use uuid::Uuid;

use crate::db::models::{NewTask, NewTaskAssignee, Task, TaskChangeSet};
use crate::db::repos::{column, project};
use crate::db::schema::{task_assignees, tasks};
use crate::error::AppError;
use crate::ordering;

pub fn load(conn: &PgConnection, task_id: &str) -> Result<Task, AppError> {
    let mut found: Vec<Task> = tasks::table
        .filter(tasks::id.eq(task_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("task"))
}

pub fn assignee_ids(conn: &PgConnection, task_id: &str) -> Result<Vec<String>, AppError> {
    let ids = task_assignees::table
        .filter(task_assignees::task_id.eq(task_id))
        .order(task_assignees::user_id.asc())
        .select(task_assignees::user_id)
        .load(conn)?;
    Ok(ids)
}

/// New tasks land at the bottom of their column.
pub fn create(
    conn: &PgConnection,
    column_id: &str,
    title: &str,
    description: &str,
) -> Result<Task, AppError> {
    let task_id = Uuid::new_v4().to_string();
    conn.build_transaction().serializable().run(|| {
        let existing: i64 = tasks::table
            .filter(tasks::kanban_column_id.eq(column_id))
            .count()
            .get_result(conn)?;
        insert_into(tasks::table)
            .values(NewTask {
                id: &task_id,
                kanban_column_id: column_id,
                title,
                description,
                sort_order: existing as i32,
            })
            .execute(conn)?;
        load(conn, &task_id)
    })
}

pub fn update_fields(
    conn: &PgConnection,
    task_id: &str,
    change_set: TaskChangeSet,
    due_date: Option<Option<DateTime<Utc>>>,
) -> Result<Task, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        if change_set.title.is_some() || change_set.description.is_some() {
            update(tasks::table.filter(tasks::id.eq(task_id)))
                .set(&change_set)
                .execute(conn)?;
        }
        if let Some(new_due_date) = due_date {
            update(tasks::table.filter(tasks::id.eq(task_id)))
                .set(tasks::due_date.eq(new_due_date))
                .execute(conn)?;
        }
        load(conn, task_id)
    })
}

/// Drops the task and closes the gap in its column's ordering.
pub fn remove(conn: &PgConnection, task_id: &str) -> Result<Task, AppError> {
    conn.build_transaction().serializable().run(|| {
        let dropped = load(conn, task_id)?;
        delete(tasks::table.filter(tasks::id.eq(task_id))).execute(conn)?;
        let survivors = ordered_pairs(conn, &dropped.kanban_column_id)?;
        for change in ordering::close_gap(&survivors) {
            update(tasks::table.filter(tasks::id.eq(&change.id)))
                .set(tasks::sort_order.eq(change.sort_order))
                .execute(conn)?;
        }
        Ok(dropped)
    })
}

fn ordered_pairs(conn: &PgConnection, column_id: &str) -> Result<Vec<(String, i32)>, AppError> {
    let pairs = tasks::table
        .filter(tasks::kanban_column_id.eq(column_id))
        .order(tasks::sort_order.asc())
        .select((tasks::id, tasks::sort_order))
        .load(conn)?;
    Ok(pairs)
}

/// Moves a task to `to_index` in `to_column_id`, renumbering every affected
/// list densely. A same-column drop on the task's current index issues no
/// writes. Returns the owning project id so the caller can reload the board.
pub fn move_to(
    conn: &PgConnection,
    task_id: &str,
    to_column_id: &str,
    to_index: usize,
) -> Result<String, AppError> {
    conn.build_transaction().serializable().run(|| {
        let task = load(conn, task_id)?;
        let source = column::load(conn, &task.kanban_column_id)?;
        let dest = column::load(conn, to_column_id)?;
        if source.project_id != dest.project_id {
            return Err(AppError::InvalidArgument(
                "destination column belongs to a different project".to_string(),
            ));
        }

        if source.id == dest.id {
            let current = ordered_pairs(conn, &source.id)?;
            let ids: Vec<String> = current.iter().map(|(id, _)| id.clone()).collect();
            let desired = ordering::splice(&ids, task_id, to_index)?;
            for change in ordering::renumber(&current, &desired)? {
                update(tasks::table.filter(tasks::id.eq(&change.id)))
                    .set(tasks::sort_order.eq(change.sort_order))
                    .execute(conn)?;
            }
        } else {
            let dest_current = ordered_pairs(conn, &dest.id)?;
            let dest_ids: Vec<String> = dest_current.iter().map(|(id, _)| id.clone()).collect();
            ordering::insert_at(&dest_ids, task_id, to_index)?;

            update(tasks::table.filter(tasks::id.eq(task_id)))
                .set((
                    tasks::kanban_column_id.eq(&dest.id),
                    tasks::sort_order.eq(to_index as i32),
                ))
                .execute(conn)?;
            // Shift the destination tasks at or below the drop position down.
            for (id, order) in &dest_current {
                if *order >= to_index as i32 {
                    update(tasks::table.filter(tasks::id.eq(id)))
                        .set(tasks::sort_order.eq(order + 1))
                        .execute(conn)?;
                }
            }
            let source_survivors = ordered_pairs(conn, &source.id)?;
            for change in ordering::close_gap(&source_survivors) {
                update(tasks::table.filter(tasks::id.eq(&change.id)))
                    .set(tasks::sort_order.eq(change.sort_order))
                    .execute(conn)?;
            }
        }
        Ok(source.project_id)
    })
}

/// Assigning and unassigning both run their precondition checks inside the
/// same serializable transaction as the write, so a concurrent change to the
/// assignee set cannot slip between check and mutation.
pub fn assign_member(
    conn: &PgConnection,
    task_id: &str,
    user_id: &str,
) -> Result<Task, AppError> {
    conn.build_transaction().serializable().run(|| {
        let task = load(conn, task_id)?;
        let owning_column = column::load(conn, &task.kanban_column_id)?;
        let members = project::member_ids(conn, &owning_column.project_id)?;
        if !members.iter().any(|id| id == user_id) {
            return Err(AppError::FailedPrecondition(
                "user is not a member of this project".to_string(),
            ));
        }
        let assigned = assignee_ids(conn, task_id)?;
        if assigned.iter().any(|id| id == user_id) {
            return Err(AppError::FailedPrecondition(
                "user is already assigned to this task".to_string(),
            ));
        }
        insert_into(task_assignees::table)
            .values(NewTaskAssignee { task_id, user_id })
            .execute(conn)?;
        Ok(task)
    })
}

pub fn unassign_member(
    conn: &PgConnection,
    task_id: &str,
    user_id: &str,
) -> Result<Task, AppError> {
    conn.build_transaction().serializable().run(|| {
        let task = load(conn, task_id)?;
        let assigned = assignee_ids(conn, task_id)?;
        if !assigned.iter().any(|id| id == user_id) {
            return Err(AppError::FailedPrecondition(
                "user is not assigned to this task".to_string(),
            ));
        }
        delete(
            task_assignees::table
                .filter(task_assignees::task_id.eq(task_id))
                .filter(task_assignees::user_id.eq(user_id)),
        )
        .execute(conn)?;
        Ok(task)
    })
}
