//! Room lifecycle queries.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use matchroom_common::db::{Room, RoomStatus};

use crate::error::EngineResult;

/// Create a room in WAITING_FOR_MEMBERS with the given member capacity.
pub async fn create_room(pool: &SqlitePool, capacity: i64) -> EngineResult<Room> {
    let room_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO rooms (room_id, status, capacity, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&room_id)
    .bind(RoomStatus::WaitingForMembers.as_str())
    .bind(capacity)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(room_id, capacity, "Room created");

    Ok(Room {
        room_id,
        status: RoomStatus::WaitingForMembers,
        capacity,
        created_at: now,
        updated_at: now,
    })
}

pub async fn room_by_id(pool: &SqlitePool, room_id: &str) -> EngineResult<Option<Room>> {
    let row = sqlx::query(
        "SELECT room_id, status, capacity, created_at, updated_at FROM rooms WHERE room_id = ?",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;
    Ok(Some(Room {
        room_id: row.try_get("room_id")?,
        status: RoomStatus::parse(&status)?,
        capacity: row.try_get("capacity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Unconditional status write, for administrative transitions such as
/// closing a room. Vote-driven transitions go through the vote engine.
pub async fn set_room_status(
    pool: &SqlitePool,
    room_id: &str,
    status: RoomStatus,
) -> EngineResult<bool> {
    let result = sqlx::query("UPDATE rooms SET status = ?, updated_at = ? WHERE room_id = ?")
        .bind(status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(room_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
