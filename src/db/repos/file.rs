use diesel::{
    delete, insert_into, update, Connection, ExpressionMethods, PgConnection, QueryDsl,
    RunQueryDsl,
};
use uuid::Uuid;

use crate::db::models::{NewStoredFile, StoredFile};
use crate::db::schema::files;
use crate::error::AppError;

pub fn load(conn: &PgConnection, file_id: &str) -> Result<StoredFile, AppError> {
    let mut found: Vec<StoredFile> = files::table
        .filter(files::id.eq(file_id))
        .limit(1)
        .load(conn)?;
    found.pop().ok_or(AppError::NotFound("file"))
}

pub fn list_for_project(
    conn: &PgConnection,
    project_id: &str,
) -> Result<Vec<StoredFile>, AppError> {
    let rows = files::table
        .filter(files::project_id.eq(project_id))
        .order(files::created_at.asc())
        .load(conn)?;
    Ok(rows)
}

/// Inserts a `" (copy)"` marker ahead of the extension, the rename applied to
/// uploads that collide with an existing name.
fn copy_suffixed(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} (copy){}", &name[..dot], &name[dot..]),
        _ => format!("{} (copy)", name),
    }
}

/// File names are unique per project; a colliding name is suffixed until it
/// no longer collides.
pub fn dedupe_name(existing: &[String], wanted: &str) -> String {
    let mut candidate = wanted.to_string();
    while existing.iter().any(|name| name == &candidate) {
        candidate = copy_suffixed(&candidate);
    }
    candidate
}

/// Creates the file record, resolving name collisions inside the same
/// serializable transaction that reads the existing names.
pub fn create(
    conn: &PgConnection,
    project_id: &str,
    uploaded_by: &str,
    wanted_name: &str,
) -> Result<StoredFile, AppError> {
    let file_id = Uuid::new_v4().to_string();
    conn.build_transaction().serializable().run(|| {
        let existing: Vec<String> = files::table
            .filter(files::project_id.eq(project_id))
            .select(files::file_name)
            .load(conn)?;
        let file_name = dedupe_name(&existing, wanted_name);
        insert_into(files::table)
            .values(NewStoredFile {
                id: &file_id,
                project_id,
                file_name: &file_name,
                uploaded_by,
            })
            .execute(conn)?;
        load(conn, &file_id)
    })
}

pub fn rename(
    conn: &PgConnection,
    file_id: &str,
    wanted_name: &str,
) -> Result<StoredFile, AppError> {
    conn.build_transaction().serializable().run(|| {
        let file = load(conn, file_id)?;
        let existing: Vec<String> = files::table
            .filter(files::project_id.eq(&file.project_id))
            .filter(files::id.ne(file_id))
            .select(files::file_name)
            .load(conn)?;
        let file_name = dedupe_name(&existing, wanted_name);
        update(files::table.filter(files::id.eq(file_id)))
            .set(files::file_name.eq(&file_name))
            .execute(conn)?;
        load(conn, file_id)
    })
}

pub fn remove(conn: &PgConnection, file_id: &str) -> Result<StoredFile, AppError> {
    conn.transaction::<_, AppError, _>(|| {
        let dropped = load(conn, file_id)?;
        delete(files::table.filter(files::id.eq(file_id))).execute(conn)?;
        Ok(dropped)
    })
}

/// Object key under which this file's bytes live in the external store.
pub fn object_key(project_id: &str, file_id: &str) -> String {
    format!("{}/files/{}", project_id, file_id)
}

/// Object key of a project's thumbnail image.
pub fn thumbnail_key(project_id: &str) -> String {
    format!("{}/thumbnail", project_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn free_name_is_kept_as_is() {
        assert_eq!(dedupe_name(&names(&["other.txt"]), "report.pdf"), "report.pdf");
    }

    #[test]
    fn collision_gets_copy_suffix_before_extension() {
        assert_eq!(
            dedupe_name(&names(&["report.pdf"]), "report.pdf"),
            "report (copy).pdf"
        );
    }

    #[test]
    fn repeated_collisions_stack_suffixes() {
        let existing = names(&["report.pdf", "report (copy).pdf"]);
        assert_eq!(
            dedupe_name(&existing, "report.pdf"),
            "report (copy) (copy).pdf"
        );
    }

    #[test]
    fn extensionless_and_dotfile_names_get_plain_suffix() {
        assert_eq!(dedupe_name(&names(&["notes"]), "notes"), "notes (copy)");
        assert_eq!(
            dedupe_name(&names(&[".gitignore"]), ".gitignore"),
            ".gitignore (copy)"
        );
    }

    #[test]
    fn object_keys_follow_the_store_layout() {
        assert_eq!(object_key("p1", "f1"), "p1/files/f1");
        assert_eq!(thumbnail_key("p1"), "p1/thumbnail");
    }
}
