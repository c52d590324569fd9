use crate::db::connection::DbPool;
use crate::db::models::VoteRow;
use crate::polls::Vote;
use sqlx::Error;
use uuid::Uuid;

/// A changed vote keeps the display name it was first cast under, so the
/// conflict branch updates option and timestamp only.
pub async fn upsert_vote(pool: &DbPool, poll_id: Uuid, vote: &Vote) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO votes (poll_id, user_id, user_name, option, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (poll_id, user_id)
        DO UPDATE SET option = EXCLUDED.option, created_at = EXCLUDED.created_at
        "#,
    )
    .bind(poll_id)
    .bind(&vote.user_id)
    .bind(&vote.user_name)
    .bind(&vote.option)
    .bind(vote.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn all_votes(pool: &DbPool) -> Result<Vec<VoteRow>, Error> {
    let rows = sqlx::query_as::<_, VoteRow>(
        "SELECT poll_id, user_id, user_name, option, created_at FROM votes ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
