//! Pure plan computation for the Kanban reorder engine. The repos feed it the
//! stored `(id, sort_order)` pairs and the desired ordering; it answers with
//! the exact set of rows to rewrite. No database access happens here, which
//! keeps the splice/renumber rules testable on their own.

use crate::error::AppError;

/// One row rewrite: the entity keeps its identity, only its rank changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub id: String,
    pub sort_order: i32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("id {0} is not part of the list")]
    UnknownId(String),
    #[error("id {0} appears more than once")]
    DuplicateId(String),
    #[error("submitted ordering names {submitted} items, the list holds {stored}")]
    WrongLength { submitted: usize, stored: usize },
    #[error("destination index {index} is out of bounds for {len} items")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> AppError {
        AppError::InvalidArgument(err.to_string())
    }
}

/// Removes `moved_id` from `ids` and re-inserts it at `to_index`, the way the
/// board UI splices a dragged item into its drop position.
pub fn splice(ids: &[String], moved_id: &str, to_index: usize) -> Result<Vec<String>, OrderError> {
    let from = ids
        .iter()
        .position(|id| id == moved_id)
        .ok_or_else(|| OrderError::UnknownId(moved_id.to_string()))?;
    if to_index >= ids.len() {
        return Err(OrderError::IndexOutOfBounds {
            index: to_index,
            len: ids.len(),
        });
    }
    let mut spliced = ids.to_vec();
    let moved = spliced.remove(from);
    spliced.insert(to_index, moved);
    Ok(spliced)
}

/// Inserts `id` at `to_index` into a list it is not yet part of (the
/// destination side of a cross-column move). `to_index == ids.len()` appends.
pub fn insert_at(ids: &[String], id: &str, to_index: usize) -> Result<Vec<String>, OrderError> {
    if ids.iter().any(|existing| existing == id) {
        return Err(OrderError::DuplicateId(id.to_string()));
    }
    if to_index > ids.len() {
        return Err(OrderError::IndexOutOfBounds {
            index: to_index,
            len: ids.len(),
        });
    }
    let mut inserted = ids.to_vec();
    inserted.insert(to_index, id.to_string());
    Ok(inserted)
}

/// Computes the dense 0..N-1 assignment that realizes `desired` over the
/// stored `current` pairs. `desired` must be an exact permutation of the
/// stored ids. Rows whose stored rank already matches are left out, so an
/// already-applied ordering yields an empty plan and no writes.
pub fn renumber(
    current: &[(String, i32)],
    desired: &[String],
) -> Result<Vec<OrderUpdate>, OrderError> {
    if desired.len() != current.len() {
        return Err(OrderError::WrongLength {
            submitted: desired.len(),
            stored: current.len(),
        });
    }
    let mut updates = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (index, id) in desired.iter().enumerate() {
        if !seen.insert(id.as_str()) {
            return Err(OrderError::DuplicateId(id.clone()));
        }
        let stored = current
            .iter()
            .find(|(stored_id, _)| stored_id == id)
            .ok_or_else(|| OrderError::UnknownId(id.clone()))?;
        if stored.1 != index as i32 {
            updates.push(OrderUpdate {
                id: id.clone(),
                sort_order: index as i32,
            });
        }
    }
    Ok(updates)
}

/// Renumbers the survivors after a deletion: every remaining row is assigned
/// its position, rows already in place are skipped.
pub fn close_gap(current: &[(String, i32)]) -> Vec<OrderUpdate> {
    current
        .iter()
        .enumerate()
        .filter(|(index, (_, order))| *order != *index as i32)
        .map(|(index, (id, _))| OrderUpdate {
            id: id.clone(),
            sort_order: index as i32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn stored(names: &[&str]) -> Vec<(String, i32)> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i as i32))
            .collect()
    }

    #[test]
    fn splice_moves_forward_and_backward() {
        let list = ids(&["a", "b", "c", "d"]);
        assert_eq!(splice(&list, "a", 2).unwrap(), ids(&["b", "c", "a", "d"]));
        assert_eq!(splice(&list, "d", 0).unwrap(), ids(&["d", "a", "b", "c"]));
    }

    #[test]
    fn splice_to_same_index_is_identity() {
        let list = ids(&["a", "b", "c"]);
        assert_eq!(splice(&list, "b", 1).unwrap(), list);
    }

    #[test]
    fn splice_rejects_unknown_id_and_bad_index() {
        let list = ids(&["a", "b"]);
        assert_eq!(
            splice(&list, "z", 0),
            Err(OrderError::UnknownId("z".to_string()))
        );
        assert_eq!(
            splice(&list, "a", 2),
            Err(OrderError::IndexOutOfBounds { index: 2, len: 2 })
        );
    }

    #[test]
    fn renumber_emits_dense_sequence_matching_submitted_order() {
        let current = stored(&["a", "b", "c"]);
        let plan = renumber(&current, &ids(&["c", "a", "b"])).unwrap();
        assert_eq!(
            plan,
            vec![
                OrderUpdate { id: "c".into(), sort_order: 0 },
                OrderUpdate { id: "a".into(), sort_order: 1 },
                OrderUpdate { id: "b".into(), sort_order: 2 },
            ]
        );
    }

    #[test]
    fn renumber_of_applied_ordering_is_empty() {
        let current = stored(&["a", "b", "c"]);
        assert!(renumber(&current, &ids(&["a", "b", "c"])).unwrap().is_empty());
    }

    #[test]
    fn renumber_only_rewrites_displaced_rows() {
        let current = stored(&["a", "b", "c", "d"]);
        let plan = renumber(&current, &ids(&["a", "c", "b", "d"])).unwrap();
        assert_eq!(
            plan,
            vec![
                OrderUpdate { id: "c".into(), sort_order: 1 },
                OrderUpdate { id: "b".into(), sort_order: 2 },
            ]
        );
    }

    #[test]
    fn renumber_rejects_non_permutations() {
        let current = stored(&["a", "b"]);
        assert_eq!(
            renumber(&current, &ids(&["a"])),
            Err(OrderError::WrongLength { submitted: 1, stored: 2 })
        );
        assert_eq!(
            renumber(&current, &ids(&["a", "a"])),
            Err(OrderError::DuplicateId("a".to_string()))
        );
        assert_eq!(
            renumber(&current, &ids(&["a", "z"])),
            Err(OrderError::UnknownId("z".to_string()))
        );
    }

    #[test]
    fn insert_at_appends_and_inserts() {
        let list = ids(&["a", "b"]);
        assert_eq!(insert_at(&list, "c", 0).unwrap(), ids(&["c", "a", "b"]));
        assert_eq!(insert_at(&list, "c", 2).unwrap(), ids(&["a", "b", "c"]));
        assert_eq!(
            insert_at(&list, "c", 3),
            Err(OrderError::IndexOutOfBounds { index: 3, len: 2 })
        );
        assert_eq!(
            insert_at(&list, "a", 0),
            Err(OrderError::DuplicateId("a".to_string()))
        );
    }

    #[test]
    fn close_gap_renumbers_after_removal() {
        // "b" (order 1) was deleted out of a/b/c/d.
        let current = vec![
            ("a".to_string(), 0),
            ("c".to_string(), 2),
            ("d".to_string(), 3),
        ];
        assert_eq!(
            close_gap(&current),
            vec![
                OrderUpdate { id: "c".into(), sort_order: 1 },
                OrderUpdate { id: "d".into(), sort_order: 2 },
            ]
        );
    }

    #[test]
    fn cross_column_move_keeps_both_lists_dense() {
        // Scenario from the board: column A holds t1, column B is empty.
        let source = stored(&["t1"]);
        let dest: Vec<(String, i32)> = Vec::new();

        let source_ids: Vec<String> = source.iter().map(|(id, _)| id.clone()).collect();
        let remaining: Vec<String> = source_ids
            .iter()
            .filter(|id| id.as_str() != "t1")
            .cloned()
            .collect();
        assert!(close_gap(
            &remaining
                .iter()
                .enumerate()
                .map(|(i, id)| (id.clone(), i as i32))
                .collect::<Vec<_>>()
        )
        .is_empty());

        let dest_ids: Vec<String> = dest.iter().map(|(id, _)| id.clone()).collect();
        let new_dest = insert_at(&dest_ids, "t1", 0).unwrap();
        assert_eq!(new_dest, ids(&["t1"]));
    }
}
