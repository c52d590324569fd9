use crate::db::connection::{DbPool, get_pool_stats};
use crate::hub::SessionHub;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{debug, error};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub hub: Arc<SessionHub>,
}

impl AppState {
    pub async fn new(db: DbPool, hub: Arc<SessionHub>) -> Self {
        let db_clone = db.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match db_clone.acquire().await {
                    Ok(conn) => {
                        drop(conn);
                        if let Ok(stats) = get_pool_stats(&db_clone).await {
                            debug!("{stats}");
                        }
                    }
                    Err(e) => {
                        error!("Database connection health check failed: {}", e);
                    }
                }
            }
        });

        AppState { db, hub }
    }
}
