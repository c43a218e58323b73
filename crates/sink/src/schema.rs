//! Table definitions for the three logical tables the sink writes (§4.7).

use scylla::Session;

use crate::error::SinkError;

pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), SinkError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| SinkError::Schema(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), SinkError> {
    let sessions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.sessions (
            session_id TEXT,
            state TEXT,
            config_json TEXT,
            metrics_json TEXT,
            created_at TIMESTAMP,
            updated_at TIMESTAMP,
            PRIMARY KEY (session_id)
        ) WITH default_time_to_live = 86400
    "#,
        keyspace
    );
    session
        .query_unpaged(sessions_table, &[])
        .await
        .map_err(|e| SinkError::Schema(format!("failed to create sessions table: {e}")))?;

    let turns_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.turns (
            session_id TEXT,
            turn_id UUID,
            user_text TEXT,
            assistant_text TEXT,
            citations_json TEXT,
            audio_duration_ms BIGINT,
            latency_ms BIGINT,
            completed_at TIMESTAMP,
            PRIMARY KEY ((session_id), completed_at, turn_id)
        ) WITH CLUSTERING ORDER BY (completed_at DESC, turn_id DESC)
    "#,
        keyspace
    );
    session
        .query_unpaged(turns_table, &[])
        .await
        .map_err(|e| SinkError::Schema(format!("failed to create turns table: {e}")))?;

    let transitions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.transitions (
            session_id TEXT,
            at TIMESTAMP,
            from_state TEXT,
            to_state TEXT,
            event TEXT,
            metadata_json TEXT,
            PRIMARY KEY ((session_id), at)
        ) WITH CLUSTERING ORDER BY (at DESC)
    "#,
        keyspace
    );
    session
        .query_unpaged(transitions_table, &[])
        .await
        .map_err(|e| SinkError::Schema(format!("failed to create transitions table: {e}")))?;

    tracing::info!("sink schema created");
    Ok(())
}
