use crate::db::connection::DbPool;
use crate::db::models::PollRow;
use crate::polls::Poll;
use sqlx::Error;

pub async fn insert_poll(pool: &DbPool, poll: &Poll) -> Result<(), Error> {
    let correct_answers: Vec<i32> = poll.correct_answers.iter().map(|&i| i as i32).collect();

    sqlx::query(
        r#"
        INSERT INTO polls (id, question, options, correct_answers, created_by, time_limit, start_time, created_at, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(poll.id)
    .bind(&poll.question)
    .bind(&poll.options)
    .bind(correct_answers)
    .bind(&poll.created_by)
    .bind(poll.time_limit)
    .bind(poll.start_time)
    .bind(poll.created_at)
    .bind(poll.is_active)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn deactivate_active_polls(pool: &DbPool) -> Result<(), Error> {
    sqlx::query("UPDATE polls SET is_active = FALSE WHERE is_active = TRUE")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn all_polls(pool: &DbPool) -> Result<Vec<PollRow>, Error> {
    let rows = sqlx::query_as::<_, PollRow>(
        "SELECT id, question, options, correct_answers, created_by, time_limit, start_time, created_at, is_active FROM polls ORDER BY created_at ASC"
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
