use std::collections::HashMap;

use diesel::{
    delete, insert_into, update, ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl,
};
use uuid::Uuid;

use crate::db::models::{KanbanColumn, NewKanbanColumn, Task};
use crate::db::schema::{kanban_columns, task_assignees, tasks};
use crate::error::AppError;
use crate::ordering;

/// A column with its tasks in display order; each task carries its assignee
/// ids.
pub struct BoardColumn {
    pub column: KanbanColumn,
    pub tasks: Vec<(Task, Vec<String>)>,
}

pub fn load(conn: &PgConnection, column_id: &str) -> Result<KanbanColumn, AppError> {
    let mut found: Vec<KanbanColumn> = kanban_columns::table
        .filter(kanban_columns::id.eq(column_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("column"))
}

pub fn list_for_project(
    conn: &PgConnection,
    project_id: &str,
) -> Result<Vec<KanbanColumn>, AppError> {
    let columns = kanban_columns::table
        .filter(kanban_columns::project_id.eq(project_id))
        .order(kanban_columns::sort_order.asc())
        .load(conn)?;
    Ok(columns)
}

/// The whole board: columns left to right, tasks top to bottom, assignees
/// attached. Three queries regardless of board size.
pub fn load_board(conn: &PgConnection, project_id: &str) -> Result<Vec<BoardColumn>, AppError> {
    let columns = list_for_project(conn, project_id)?;
    let column_ids: Vec<String> = columns.iter().map(|c| c.id.clone()).collect();

    let all_tasks: Vec<Task> = tasks::table
        .filter(tasks::kanban_column_id.eq_any(&column_ids))
        .order(tasks::sort_order.asc())
        .load(conn)?;
    let task_ids: Vec<String> = all_tasks.iter().map(|t| t.id.clone()).collect();

    let assignee_rows: Vec<(String, String)> = task_assignees::table
        .filter(task_assignees::task_id.eq_any(&task_ids))
        .order(task_assignees::user_id.asc())
        .select((task_assignees::task_id, task_assignees::user_id))
        .load(conn)?;
    let mut assignees: HashMap<String, Vec<String>> = HashMap::new();
    for (task_id, user_id) in assignee_rows {
        assignees.entry(task_id).or_default().push(user_id);
    }

    let mut tasks_by_column: HashMap<String, Vec<(Task, Vec<String>)>> = HashMap::new();
    for task in all_tasks {
        let task_assignee_ids = assignees.remove(&task.id).unwrap_or_default();
        tasks_by_column
            .entry(task.kanban_column_id.clone())
            .or_default()
            .push((task, task_assignee_ids));
    }

    Ok(columns
        .into_iter()
        .map(|column| {
            let column_tasks = tasks_by_column.remove(&column.id).unwrap_or_default();
            BoardColumn {
                column,
                tasks: column_tasks,
            }
        })
        .collect())
}

/// New columns land at the right edge of the board.
pub fn create(
    conn: &PgConnection,
    project_id: &str,
    name: &str,
) -> Result<KanbanColumn, AppError> {
    let column_id = Uuid::new_v4().to_string();
    conn.build_transaction().serializable().run(|| {
        let existing: i64 = kanban_columns::table
            .filter(kanban_columns::project_id.eq(project_id))
            .count()
            .get_result(conn)?;
        insert_into(kanban_columns::table)
            .values(NewKanbanColumn {
                id: &column_id,
                project_id,
                name,
                sort_order: existing as i32,
            })
            .execute(conn)?;
        load(conn, &column_id)
    })
}

pub fn rename(
    conn: &PgConnection,
    column_id: &str,
    name: &str,
) -> Result<KanbanColumn, AppError> {
    update(kanban_columns::table.filter(kanban_columns::id.eq(column_id)))
        .set(kanban_columns::name.eq(name))
        .execute(conn)?;
    load(conn, column_id)
}

/// Drops the column (its tasks cascade away) and closes the gap in the
/// surviving columns' ordering.
pub fn remove(conn: &PgConnection, column_id: &str) -> Result<KanbanColumn, AppError> {
    conn.build_transaction().serializable().run(|| {
        let dropped = load(conn, column_id)?;
        delete(kanban_columns::table.filter(kanban_columns::id.eq(column_id))).execute(conn)?;
        let survivors: Vec<(String, i32)> = kanban_columns::table
            .filter(kanban_columns::project_id.eq(&dropped.project_id))
            .order(kanban_columns::sort_order.asc())
            .select((kanban_columns::id, kanban_columns::sort_order))
            .load(conn)?;
        for change in ordering::close_gap(&survivors) {
            update(kanban_columns::table.filter(kanban_columns::id.eq(&change.id)))
                .set(kanban_columns::sort_order.eq(change.sort_order))
                .execute(conn)?;
        }
        Ok(dropped)
    })
}

/// Applies a full column permutation. The submitted ids must match the
/// stored set exactly; an already-applied ordering issues no writes.
pub fn reorder(
    conn: &PgConnection,
    project_id: &str,
    ordered_column_ids: &[String],
) -> Result<(), AppError> {
    conn.build_transaction().serializable().run(|| {
        let current: Vec<(String, i32)> = kanban_columns::table
            .filter(kanban_columns::project_id.eq(project_id))
            .order(kanban_columns::sort_order.asc())
            .select((kanban_columns::id, kanban_columns::sort_order))
            .load(conn)?;
        let plan = ordering::renumber(&current, ordered_column_ids)?;
        for change in plan {
            update(kanban_columns::table.filter(kanban_columns::id.eq(&change.id)))
                .set(kanban_columns::sort_order.eq(change.sort_order))
                .execute(conn)?;
        }
        Ok(())
    })
}
