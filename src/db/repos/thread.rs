use std::collections::HashMap;

use chrono::Utc;
use diesel::{
    delete, insert_into, update, Connection, ExpressionMethods, PgConnection, QueryDsl,
    RunQueryDsl,
};
use uuid::Uuid;

use crate::db::models::{NewThread, NewThreadReply, Thread, ThreadChangeSet, ThreadReply};
use crate::db::schema::{thread_replies, threads};
use crate::error::AppError;

/// Replies may nest at most this deep below the thread root.
pub const MAX_REPLY_DEPTH: usize = 5;

pub fn load(conn: &PgConnection, thread_id: &str) -> Result<Thread, AppError> {
    let mut found: Vec<Thread> = threads::table
        .filter(threads::id.eq(thread_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("thread"))
}

pub fn load_reply(conn: &PgConnection, reply_id: &str) -> Result<ThreadReply, AppError> {
    let mut found: Vec<ThreadReply> = thread_replies::table
        .filter(thread_replies::id.eq(reply_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("reply"))
}

pub fn list_for_project(conn: &PgConnection, project_id: &str) -> Result<Vec<Thread>, AppError> {
    let rows = threads::table
        .filter(threads::project_id.eq(project_id))
        .order(threads::created_at.desc())
        .load(conn)?;
    Ok(rows)
}

pub fn replies(conn: &PgConnection, thread_id: &str) -> Result<Vec<ThreadReply>, AppError> {
    let rows = thread_replies::table
        .filter(thread_replies::thread_id.eq(thread_id))
        .order(thread_replies::created_at.asc())
        .load(conn)?;
    Ok(rows)
}

pub fn create(
    conn: &PgConnection,
    project_id: &str,
    author_id: &str,
    title: &str,
    content: &str,
) -> Result<Thread, AppError> {
    let thread_id = Uuid::new_v4().to_string();
    insert_into(threads::table)
        .values(NewThread {
            id: &thread_id,
            project_id,
            author_id,
            title,
            content,
        })
        .execute(conn)?;
    load(conn, &thread_id)
}

pub fn update_content(
    conn: &PgConnection,
    thread_id: &str,
    title: Option<String>,
    content: Option<String>,
) -> Result<Thread, AppError> {
    // An edit that changes nothing must not move the edit timestamp.
    if title.is_none() && content.is_none() {
        return load(conn, thread_id);
    }
    update(threads::table.filter(threads::id.eq(thread_id)))
        .set(&ThreadChangeSet {
            title,
            content,
            updated_at: Some(Utc::now()),
        })
        .execute(conn)?;
    load(conn, thread_id)
}

/// Hard delete; replies cascade away with the thread.
pub fn remove(conn: &PgConnection, thread_id: &str) -> Result<Thread, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        let dropped = load(conn, thread_id)?;
        delete(threads::table.filter(threads::id.eq(thread_id))).execute(conn)?;
        Ok(dropped)
    })
}

/// Walks the parent chain of `reply_id` and returns its nesting depth below
/// the thread root (a top-level reply has depth 1). The map holds each
/// reply's optional parent.
pub fn reply_depth(parents: &HashMap<String, Option<String>>, reply_id: &str) -> usize {
    let mut depth = 1;
    let mut cursor = reply_id;
    while let Some(Some(parent_id)) = parents.get(cursor) {
        depth += 1;
        cursor = parent_id;
        if depth > parents.len() {
            break;
        }
    }
    depth
}

pub fn create_reply(
    conn: &PgConnection,
    thread_id: &str,
    parent_reply_id: Option<&str>,
    author_id: &str,
    content: &str,
) -> Result<ThreadReply, AppError> {
    let reply_id = Uuid::new_v4().to_string();
    conn.transaction::<_, AppError, _>(|| {
        load(conn, thread_id)?;
        if let Some(parent_id) = parent_reply_id {
            let parent = load_reply(conn, parent_id)?;
            if parent.thread_id != thread_id {
                return Err(AppError::InvalidArgument(
                    "parent reply belongs to a different thread".to_string(),
                ));
            }
            let parents: HashMap<String, Option<String>> = replies(conn, thread_id)?
                .into_iter()
                .map(|reply| (reply.id, reply.parent_reply_id))
                .collect();
            if reply_depth(&parents, parent_id) >= MAX_REPLY_DEPTH {
                return Err(AppError::FailedPrecondition(format!(
                    "replies cannot nest deeper than {} levels",
                    MAX_REPLY_DEPTH
                )));
            }
        }
        insert_into(thread_replies::table)
            .values(NewThreadReply {
                id: &reply_id,
                thread_id,
                parent_reply_id,
                author_id,
                content,
            })
            .execute(conn)?;
        load_reply(conn, &reply_id)
    })
}

pub fn update_reply(
    conn: &PgConnection,
    reply_id: &str,
    content: &str,
) -> Result<ThreadReply, AppError> {
    update(thread_replies::table.filter(thread_replies::id.eq(reply_id)))
        .set(thread_replies::content.eq(content))
        .execute(conn)?;
    load_reply(conn, reply_id)
}

/// Soft delete: the row stays so child replies keep their place in the tree,
/// but the content is blanked.
pub fn remove_reply(conn: &PgConnection, reply_id: &str) -> Result<ThreadReply, AppError> {
    update(thread_replies::table.filter(thread_replies::id.eq(reply_id)))
        .set((
            thread_replies::deleted.eq(true),
            thread_replies::content.eq(""),
        ))
        .execute(conn)?;
    load_reply(conn, reply_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parents(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(id, parent)| (id.to_string(), parent.map(str::to_string)))
            .collect()
    }

    #[test]
    fn top_level_reply_has_depth_one() {
        let map = parents(&[("r1", None)]);
        assert_eq!(reply_depth(&map, "r1"), 1);
    }

    #[test]
    fn nested_chain_depth_counts_every_ancestor() {
        let map = parents(&[
            ("r1", None),
            ("r2", Some("r1")),
            ("r3", Some("r2")),
            ("r4", Some("r3")),
            ("r5", Some("r4")),
        ]);
        assert_eq!(reply_depth(&map, "r5"), 5);
    }

    #[test]
    fn depth_limit_blocks_a_sixth_level() {
        let map = parents(&[
            ("r1", None),
            ("r2", Some("r1")),
            ("r3", Some("r2")),
            ("r4", Some("r3")),
            ("r5", Some("r4")),
        ]);
        // Replying under r5 would create depth 6.
        assert!(reply_depth(&map, "r5") >= MAX_REPLY_DEPTH);
        assert!(reply_depth(&map, "r4") < MAX_REPLY_DEPTH);
    }
}
