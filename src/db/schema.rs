table! {
    projects (id) {
        id -> Bpchar,
        name -> Varchar,
        description -> Text,
        due_date -> Nullable<Timestamptz>,
        leader_id -> Bpchar,
        invite_password -> Varchar,
        thumbnail_key -> Nullable<Varchar>,
    }
}

table! {
    project_members (project_id, user_id) {
        project_id -> Bpchar,
        user_id -> Bpchar,
        joined_at -> Timestamptz,
    }
}

table! {
    kanban_columns (id) {
        id -> Bpchar,
        project_id -> Bpchar,
        name -> Varchar,
        sort_order -> Int4,
    }
}

table! {
    tasks (id) {
        id -> Bpchar,
        kanban_column_id -> Bpchar,
        title -> Varchar,
        description -> Text,
        due_date -> Nullable<Timestamptz>,
        sort_order -> Int4,
    }
}

table! {
    task_assignees (task_id, user_id) {
        task_id -> Bpchar,
        user_id -> Bpchar,
    }
}

table! {
    threads (id) {
        id -> Bpchar,
        project_id -> Bpchar,
        author_id -> Bpchar,
        title -> Varchar,
        content -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    thread_replies (id) {
        id -> Bpchar,
        thread_id -> Bpchar,
        parent_reply_id -> Nullable<Bpchar>,
        author_id -> Bpchar,
        content -> Text,
        deleted -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    files (id) {
        id -> Bpchar,
        project_id -> Bpchar,
        file_name -> Varchar,
        uploaded_by -> Bpchar,
        created_at -> Timestamptz,
    }
}

table! {
    polls (id) {
        id -> Bpchar,
        project_id -> Bpchar,
        title -> Varchar,
    }
}

table! {
    poll_options (id) {
        id -> Bpchar,
        poll_id -> Bpchar,
        title -> Varchar,
        sort_order -> Int4,
    }
}

table! {
    poll_votes (option_id, user_id) {
        option_id -> Bpchar,
        user_id -> Bpchar,
    }
}

allow_tables_to_appear_in_same_query!(
    projects,
    project_members,
    kanban_columns,
    tasks,
    task_assignees,
    threads,
    thread_replies,
    files,
    polls,
    poll_options,
    poll_votes,
);
