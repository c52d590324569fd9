use crate::db::connection::DbPool;
use crate::users::Participant;
use sqlx::Error;

pub async fn upsert_participant(pool: &DbPool, participant: &Participant) -> Result<(), Error> {
    let roles: Vec<String> = participant
        .roles
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();

    sqlx::query(
        r#"
        INSERT INTO participants (socket_id, user_name, roles, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (socket_id)
        DO UPDATE SET user_name = EXCLUDED.user_name, roles = EXCLUDED.roles, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&participant.connection_id)
    .bind(&participant.user_name)
    .bind(roles)
    .bind(participant.created_at)
    .bind(participant.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}
