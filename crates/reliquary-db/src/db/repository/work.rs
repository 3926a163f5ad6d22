use reliquary_core::{models::Work, AppError};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::transaction::TransactionGuard;

const WORK_COLUMNS: &str = "id, title, depositor, on_behalf_of, ordered_member_ids, permissions, \
     visibility, representative_id, thumbnail_id, created_at, updated_at";

/// Compute the member list to store when committing `ordered`, which was built
/// by appending new members to the snapshot `expected`.
///
/// When `stored` still equals the snapshot, `ordered` is stored as is. When
/// another job committed in between, the members this job added are appended to
/// what is stored now, skipping any already present.
pub fn merge_ordered_members(stored: &[Uuid], expected: &[Uuid], ordered: &[Uuid]) -> Vec<Uuid> {
    if stored == expected {
        return ordered.to_vec();
    }

    let added: Vec<Uuid> = match ordered.strip_prefix(expected) {
        Some(tail) => tail.to_vec(),
        None => ordered
            .iter()
            .filter(|id| !expected.contains(id))
            .copied()
            .collect(),
    };

    let mut merged = stored.to_vec();
    for id in added {
        if !merged.contains(&id) {
            merged.push(id);
        }
    }
    merged
}

/// Repository for works
#[derive(Clone)]
pub struct WorkRepository {
    pool: PgPool,
}

impl WorkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, work), fields(db.table = "works", db.operation = "insert", db.record_id = %work.id))]
    pub async fn create_work(&self, work: &Work) -> Result<Work, AppError> {
        let created = sqlx::query_as::<Postgres, Work>(&format!(
            r#"
            INSERT INTO works (id, title, depositor, on_behalf_of, ordered_member_ids, permissions, visibility)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            WORK_COLUMNS
        ))
        .bind(work.id)
        .bind(&work.title)
        .bind(&work.depositor)
        .bind(&work.on_behalf_of)
        .bind(&work.ordered_member_ids)
        .bind(Json(&work.permissions))
        .bind(work.visibility.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "works", db.operation = "select", db.record_id = %id))]
    pub async fn get_work(&self, id: Uuid) -> Result<Option<Work>, AppError> {
        let work = sqlx::query_as::<Postgres, Work>(&format!(
            "SELECT {} FROM works WHERE id = $1",
            WORK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(work)
    }

    /// Make `file_set_id` the representative and thumbnail where the work has none.
    /// Returns whether anything changed.
    #[tracing::instrument(skip(self), fields(db.table = "works", db.operation = "update", db.record_id = %work_id))]
    pub async fn claim_representative(
        &self,
        work_id: Uuid,
        file_set_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE works
            SET representative_id = COALESCE(representative_id, $2),
                thumbnail_id = COALESCE(thumbnail_id, $2),
                updated_at = NOW()
            WHERE id = $1
                AND (representative_id IS NULL OR thumbnail_id IS NULL)
            "#,
        )
        .bind(work_id)
        .bind(file_set_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear representative/thumbnail references that point at any of `file_set_ids`
    #[tracing::instrument(skip(self, file_set_ids), fields(db.table = "works", db.operation = "update", db.record_id = %work_id))]
    pub async fn release_representative(
        &self,
        work_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE works
            SET representative_id = CASE WHEN representative_id = ANY($2) THEN NULL ELSE representative_id END,
                thumbnail_id = CASE WHEN thumbnail_id = ANY($2) THEN NULL ELSE thumbnail_id END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(work_id)
        .bind(file_set_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the ordered member list in one transaction.
    ///
    /// The work row is locked while the stored list is compared against the
    /// caller's snapshot; see [`merge_ordered_members`] for what is written when
    /// they differ. Returns the list as stored.
    #[tracing::instrument(skip(self, expected, ordered), fields(db.table = "works", db.operation = "update", db.record_id = %work_id, member_count = ordered.len()))]
    pub async fn commit_ordered_members(
        &self,
        work_id: Uuid,
        expected: &[Uuid],
        ordered: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let stored = sqlx::query_scalar::<Postgres, Vec<Uuid>>(
            "SELECT ordered_member_ids FROM works WHERE id = $1 FOR UPDATE",
        )
        .bind(work_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("work {}", work_id)))?;

        if stored.as_slice() != expected {
            tracing::warn!(
                work_id = %work_id,
                snapshot_len = expected.len(),
                stored_len = stored.len(),
                "Ordered members changed since snapshot, appending to current list"
            );
        }
        let merged = merge_ordered_members(&stored, expected, ordered);

        sqlx::query("UPDATE works SET ordered_member_ids = $2, updated_at = NOW() WHERE id = $1")
            .bind(work_id)
            .bind(&merged)
            .execute(&mut **tx)
            .await?;

        tx.commit().await?;

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn unchanged_snapshot_stores_ordered_list() {
        let existing = ids(2);
        let new = ids(2);
        let ordered = [existing.clone(), new.clone()].concat();

        assert_eq!(merge_ordered_members(&existing, &existing, &ordered), ordered);
    }

    #[test]
    fn concurrent_commit_is_preserved() {
        let existing = ids(1);
        let theirs = ids(2);
        let ours = ids(3);
        let stored = [existing.clone(), theirs.clone()].concat();
        let ordered = [existing.clone(), ours.clone()].concat();

        let merged = merge_ordered_members(&stored, &existing, &ordered);
        assert_eq!(merged, [existing, theirs, ours].concat());
    }

    #[test]
    fn members_already_stored_are_not_duplicated() {
        let existing = ids(1);
        let ours = ids(2);
        let ordered = [existing.clone(), ours.clone()].concat();
        // an earlier attempt of the same job already landed
        let stored = ordered.clone();

        assert_eq!(merge_ordered_members(&stored, &existing, &ordered), ordered);
    }

    #[test]
    fn removed_members_stay_removed() {
        let existing = ids(2);
        let ours = ids(1);
        let ordered = [existing.clone(), ours.clone()].concat();
        let stored = vec![existing[1]];

        assert_eq!(
            merge_ordered_members(&stored, &existing, &ordered),
            vec![existing[1], ours[0]]
        );
    }
}
