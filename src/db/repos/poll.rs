use std::collections::HashMap;

use diesel::{
    delete, insert_into, Connection, ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl,
};
use uuid::Uuid;

use crate::db::models::{NewPoll, NewPollOption, NewPollVote, Poll, PollOption};
use crate::db::schema::{poll_options, poll_votes, polls};
use crate::error::AppError;

/// A poll with its options in display order; each option carries the ids of
/// the users currently voting for it.
pub struct PollDetail {
    pub poll: Poll,
    pub options: Vec<(PollOption, Vec<String>)>,
}

pub fn load(conn: &PgConnection, poll_id: &str) -> Result<Poll, AppError> {
    let mut found: Vec<Poll> = polls::table
        .filter(polls::id.eq(poll_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("poll"))
}

pub fn load_option(conn: &PgConnection, option_id: &str) -> Result<PollOption, AppError> {
    let mut found: Vec<PollOption> = poll_options::table
        .filter(poll_options::id.eq(option_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("poll option"))
}

pub fn detail(conn: &PgConnection, poll_id: &str) -> Result<PollDetail, AppError> {
    let poll = load(conn, poll_id)?;
    let options: Vec<PollOption> = poll_options::table
        .filter(poll_options::poll_id.eq(poll_id))
        .order(poll_options::sort_order.asc())
        .load(conn)?;
    let option_ids: Vec<String> = options.iter().map(|o| o.id.clone()).collect();
    let vote_rows: Vec<(String, String)> = poll_votes::table
        .filter(poll_votes::option_id.eq_any(&option_ids))
        .order(poll_votes::user_id.asc())
        .select((poll_votes::option_id, poll_votes::user_id))
        .load(conn)?;
    let mut votes: HashMap<String, Vec<String>> = HashMap::new();
    for (option_id, user_id) in vote_rows {
        votes.entry(option_id).or_default().push(user_id);
    }
    Ok(PollDetail {
        poll,
        options: options
            .into_iter()
            .map(|option| {
                let voted_by = votes.remove(&option.id).unwrap_or_default();
                (option, voted_by)
            })
            .collect(),
    })
}

pub fn list_for_project(
    conn: &PgConnection,
    project_id: &str,
) -> Result<Vec<PollDetail>, AppError> {
    let poll_ids: Vec<String> = polls::table
        .filter(polls::project_id.eq(project_id))
        .order(polls::id.asc())
        .select(polls::id)
        .load(conn)?;
    let mut details = Vec::with_capacity(poll_ids.len());
    for poll_id in &poll_ids {
        details.push(detail(conn, poll_id)?);
    }
    Ok(details)
}

pub fn create(
    conn: &PgConnection,
    project_id: &str,
    title: &str,
    option_titles: &[String],
) -> Result<PollDetail, AppError> {
    if option_titles.len() < 2 {
        return Err(AppError::InvalidArgument(
            "a poll needs at least two options".to_string(),
        ));
    }
    let poll_id = Uuid::new_v4().to_string();
    conn.transaction::<_, AppError, _>(|| {
        insert_into(polls::table)
            .values(NewPoll {
                id: &poll_id,
                project_id,
                title,
            })
            .execute(conn)?;
        for (index, option_title) in option_titles.iter().enumerate() {
            insert_into(poll_options::table)
                .values(NewPollOption {
                    id: &Uuid::new_v4().to_string(),
                    poll_id: &poll_id,
                    title: option_title,
                    sort_order: index as i32,
                })
                .execute(conn)?;
        }
        detail(conn, &poll_id)
    })
}

pub fn remove(conn: &PgConnection, poll_id: &str) -> Result<Poll, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        let dropped = load(conn, poll_id)?;
        delete(polls::table.filter(polls::id.eq(poll_id))).execute(conn)?;
        Ok(dropped)
    })
}

/// What a vote has to change: which sibling options lose the caller's vote,
/// and whether the target option gains it (it does not when the caller is
/// already on that option, which makes re-voting idempotent).
pub struct VotePlan {
    pub remove_option_ids: Vec<String>,
    pub insert: bool,
}

pub fn vote_plan(votes: &[(String, String)], target_option_id: &str, caller_id: &str) -> VotePlan {
    let mut remove_option_ids = Vec::new();
    let mut already_on_target = false;
    for (option_id, user_id) in votes {
        if user_id != caller_id {
            continue;
        }
        if option_id == target_option_id {
            already_on_target = true;
        } else {
            remove_option_ids.push(option_id.clone());
        }
    }
    VotePlan {
        remove_option_ids,
        insert: !already_on_target,
    }
}

/// Casts the caller's vote for `option_id`, moving it off any sibling option
/// in the same poll. One serializable transaction; a conflict rolls the whole
/// switch back so the caller never ends up with zero or two votes.
pub fn vote(conn: &PgConnection, option_id: &str, caller_id: &str) -> Result<PollDetail, AppError> {
    conn.build_transaction().serializable().run(|| {
        let option = load_option(conn, option_id)?;
        let sibling_ids: Vec<String> = poll_options::table
            .filter(poll_options::poll_id.eq(&option.poll_id))
            .select(poll_options::id)
            .load(conn)?;
        let votes: Vec<(String, String)> = poll_votes::table
            .filter(poll_votes::option_id.eq_any(&sibling_ids))
            .select((poll_votes::option_id, poll_votes::user_id))
            .load(conn)?;

        let plan = vote_plan(&votes, option_id, caller_id);
        if !plan.remove_option_ids.is_empty() {
            delete(
                poll_votes::table
                    .filter(poll_votes::option_id.eq_any(&plan.remove_option_ids))
                    .filter(poll_votes::user_id.eq(caller_id)),
            )
            .execute(conn)?;
        }
        if plan.insert {
            insert_into(poll_votes::table)
                .values(NewPollVote {
                    option_id,
                    user_id: caller_id,
                })
                .execute(conn)?;
        }
        detail(conn, &option.poll_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(option, user)| (option.to_string(), user.to_string()))
            .collect()
    }

    #[test]
    fn first_vote_only_inserts() {
        let plan = vote_plan(&votes(&[]), "x", "u1");
        assert!(plan.remove_option_ids.is_empty());
        assert!(plan.insert);
    }

    #[test]
    fn switching_vote_removes_the_old_option_and_inserts_the_new() {
        // Options [X(votedBy=[]), Y(votedBy=[u1])], u1 votes for X.
        let plan = vote_plan(&votes(&[("y", "u1")]), "x", "u1");
        assert_eq!(plan.remove_option_ids, vec!["y".to_string()]);
        assert!(plan.insert);
    }

    #[test]
    fn revoting_the_same_option_is_a_no_op() {
        let plan = vote_plan(&votes(&[("x", "u1")]), "x", "u1");
        assert!(plan.remove_option_ids.is_empty());
        assert!(!plan.insert);
    }

    #[test]
    fn other_users_votes_are_untouched() {
        let plan = vote_plan(&votes(&[("y", "u2"), ("x", "u3")]), "x", "u1");
        assert!(plan.remove_option_ids.is_empty());
        assert!(plan.insert);
    }

    #[test]
    fn plan_leaves_at_most_one_vote_per_user() {
        // Even from a corrupted double-vote state the plan converges on one.
        let plan = vote_plan(&votes(&[("y", "u1"), ("z", "u1")]), "x", "u1");
        let mut removed = plan.remove_option_ids.clone();
        removed.sort();
        assert_eq!(removed, vec!["y".to_string(), "z".to_string()]);
        assert!(plan.insert);
    }
}
