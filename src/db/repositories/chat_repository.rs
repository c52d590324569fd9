use crate::chat::ChatMessage;
use crate::db::connection::DbPool;
use crate::db::models::ChatMessageRow;
use sqlx::Error;

pub async fn insert_message(pool: &DbPool, message: &ChatMessage) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO chat_messages (user_name, message, socket_id, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&message.user_name)
    .bind(&message.message)
    .bind(&message.socket_id)
    .bind(message.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// The newest `limit` rows, returned oldest first so they replay in order.
pub async fn recent_messages(pool: &DbPool, limit: i64) -> Result<Vec<ChatMessageRow>, Error> {
    let mut rows = sqlx::query_as::<_, ChatMessageRow>(
        "SELECT user_name, message, socket_id, created_at FROM chat_messages ORDER BY id DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows)
}
