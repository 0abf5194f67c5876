use chrono::{DateTime, Utc};

use super::schema::{
    files, kanban_columns, poll_options, poll_votes, polls, project_members, projects,
    task_assignees, tasks, thread_replies, threads,
};

#[derive(Queryable, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub leader_id: String,
    pub invite_password: String,
    pub thumbnail_key: Option<String>,
}

#[derive(Insertable)]
#[table_name = "projects"]
pub struct NewProject<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub due_date: Option<DateTime<Utc>>,
    pub leader_id: &'a str,
    pub invite_password: &'a str,
}

#[derive(AsChangeset)]
#[table_name = "projects"]
pub struct ProjectChangeSet {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Queryable)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "project_members"]
pub struct NewProjectMember<'a> {
    pub project_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Queryable, Clone)]
pub struct KanbanColumn {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub sort_order: i32,
}

#[derive(Insertable)]
#[table_name = "kanban_columns"]
pub struct NewKanbanColumn<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub name: &'a str,
    pub sort_order: i32,
}

#[derive(Queryable, Clone)]
pub struct Task {
    pub id: String,
    pub kanban_column_id: String,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub sort_order: i32,
}

#[derive(Insertable)]
#[table_name = "tasks"]
pub struct NewTask<'a> {
    pub id: &'a str,
    pub kanban_column_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub sort_order: i32,
}

#[derive(AsChangeset)]
#[table_name = "tasks"]
pub struct TaskChangeSet {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Queryable)]
pub struct TaskAssignee {
    pub task_id: String,
    pub user_id: String,
}

#[derive(Insertable)]
#[table_name = "task_assignees"]
pub struct NewTaskAssignee<'a> {
    pub task_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Queryable, Clone)]
pub struct Thread {
    pub id: String,
    pub project_id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "threads"]
pub struct NewThread<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub author_id: &'a str,
    pub title: &'a str,
    pub content: &'a str,
}

#[derive(AsChangeset)]
#[table_name = "threads"]
pub struct ThreadChangeSet {
    pub title: Option<String>,
    pub content: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Clone)]
pub struct ThreadReply {
    pub id: String,
    pub thread_id: String,
    pub parent_reply_id: Option<String>,
    pub author_id: String,
    pub content: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "thread_replies"]
pub struct NewThreadReply<'a> {
    pub id: &'a str,
    pub thread_id: &'a str,
    pub parent_reply_id: Option<&'a str>,
    pub author_id: &'a str,
    pub content: &'a str,
}

#[derive(Queryable, Clone)]
pub struct StoredFile {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[table_name = "files"]
pub struct NewStoredFile<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub file_name: &'a str,
    pub uploaded_by: &'a str,
}

#[derive(Queryable, Clone)]
pub struct Poll {
    pub id: String,
    pub project_id: String,
    pub title: String,
}

#[derive(Insertable)]
#[table_name = "polls"]
pub struct NewPoll<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub title: &'a str,
}

#[derive(Queryable, Clone)]
pub struct PollOption {
    pub id: String,
    pub poll_id: String,
    pub title: String,
    pub sort_order: i32,
}

#[derive(Insertable)]
#[table_name = "poll_options"]
pub struct NewPollOption<'a> {
    pub id: &'a str,
    pub poll_id: &'a str,
    pub title: &'a str,
    pub sort_order: i32,
}

#[derive(Queryable, Clone)]
pub struct PollVote {
    pub option_id: String,
    pub user_id: String,
}

#[derive(Insertable)]
#[table_name = "poll_votes"]
pub struct NewPollVote<'a> {
    pub option_id: &'a str,
    pub user_id: &'a str,
}
