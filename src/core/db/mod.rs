mod sample;
mod session;
mod state;
mod user;

use std::{path::Path, sync::Arc};

use sqlx::Connection;
use state::DbState;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub use sample::{SampleLabel, SampleRepository, TrainingSample};
pub use session::{CrackStatus, ImageSession, SessionRepository, group_by_day};
pub use user::{NewUser, User, UserRepository};

/// Errors callers are expected to match on. They travel inside `anyhow::Error`;
/// use `downcast_ref::<DbError>()` to recover them.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("a user with email {0} already exists")]
    UserAlreadyExists(String),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("image session {0} not found")]
    SessionNotFound(i64),
}

#[derive(Debug, Clone)]
pub struct Database {
    state: Arc<DbState>,
}

impl Database {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::open(db_file).await?),
        })
    }

    pub async fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::open_in_memory().await?),
        })
    }

    pub fn location(&self) -> &str {
        self.state.location()
    }

    /// Close the pool. Any further query on any clone of this handle fails.
    pub async fn close(&self) {
        self.state.close().await
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_uuid: String,
    user_email: String,
    first_name: String,
    last_name: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            uuid: row.user_uuid,
            email: row.user_email,
            first_name: row.first_name,
            last_name: row.last_name,
            _guard: (),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: i64,
    date: String,
    user_uuid: String,
    image_name: String,
    crack_detected: Option<i64>,
}

impl TryFrom<SessionRow> for ImageSession {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ImageSession {
            session_id: row.session_id,
            date: OffsetDateTime::parse(&row.date, &Rfc3339)?,
            user_uuid: row.user_uuid,
            image_name: row.image_name,
            crack_status: CrackStatus::try_from(row.crack_detected)?,
            _guard: (),
        })
    }
}

#[derive(sqlx::FromRow)]
struct SampleRow {
    id: i64,
    img: Vec<u8>,
    classifier: i64,
}

impl TryFrom<SampleRow> for TrainingSample {
    type Error = anyhow::Error;

    fn try_from(row: SampleRow) -> Result<Self, Self::Error> {
        Ok(TrainingSample {
            id: row.id,
            pixels: row.img,
            label: SampleLabel::try_from(row.classifier)?,
            _guard: (),
        })
    }
}

const SESSION_COLUMNS: &str = "session_id, date, user_uuid, image_name, crack_detected";

fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

impl UserRepository for Database {
    async fn add_user(&self, user: NewUser) -> anyhow::Result<User> {
        let email = user.email.trim().to_string();
        let mut conn = self.state.conn().await?;
        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (user_uuid, user_email, first_name, last_name)
            VALUES ($1, $2, $3, $4)
            RETURNING user_uuid, user_email, first_name, last_name"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&email)
        .bind(user.first_name.trim())
        .bind(user.last_name.trim())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                anyhow::Error::from(DbError::UserAlreadyExists(email.clone()))
            }
            _ => e.into(),
        })?;
        log::info!("created user {} ({})", row.user_uuid, row.user_email);
        Ok(row.into())
    }

    async fn get_users(&self) -> anyhow::Result<Vec<User>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, UserRow>(
            r#"SELECT user_uuid, user_email, first_name, last_name FROM users ORDER BY rowid ASC"#,
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(User::from)
        .collect())
    }

    async fn get_user_names(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .get_users()
            .await?
            .iter()
            .map(User::full_name)
            .collect())
    }

    async fn get_user_emails(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.get_users().await?.into_iter().map(|u| u.email).collect())
    }

    async fn get_uuid_by_email(&self, email: &str) -> anyhow::Result<Option<String>> {
        Ok(self.get_user_by_email(email).await?.map(|u| u.uuid))
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, UserRow>(
            r#"SELECT user_uuid, user_email, first_name, last_name FROM users WHERE user_email = $1"#,
        )
        .bind(email.trim())
        .fetch_optional(&mut *conn)
        .await?
        .map(User::from))
    }

    async fn get_user(&self, uuid: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, UserRow>(
            r#"SELECT user_uuid, user_email, first_name, last_name FROM users WHERE user_uuid = $1"#,
        )
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?
        .map(User::from))
    }

    async fn delete_user(&self, uuid: &str) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query(r#"DELETE FROM users WHERE user_uuid = $1"#)
            .bind(uuid)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::UserNotFound(uuid.to_string()).into());
        }
        log::info!("deleted user {}", uuid);
        Ok(())
    }
}

impl SessionRepository for Database {
    async fn add_session(
        &self,
        user_uuid: &str,
        image_name: Option<&str>,
    ) -> anyhow::Result<ImageSession> {
        let date = now_local();
        let now_ms = i64::try_from(date.unix_timestamp_nanos() / 1_000_000)?;
        let date_str = date.format(&Rfc3339)?;

        let mut conn = self.state.conn().await?;
        // Take the write lock before reading MAX(session_id).
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;
        // Ids are millisecond timestamps, bumped past the newest id so two
        // captures within the same millisecond stay distinct.
        let newest: i64 =
            sqlx::query_scalar(r#"SELECT COALESCE(MAX(session_id), 0) FROM image_sessions"#)
                .fetch_one(&mut *tx)
                .await?;
        let session_id = now_ms.max(newest + 1);
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"INSERT INTO image_sessions (session_id, date, user_uuid, image_name)
            VALUES ($1, $2, $3, $4)
            RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(session_id)
        .bind(date_str)
        .bind(user_uuid)
        .bind(image_name.map(str::trim).unwrap_or(""))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        log::debug!("created image session {} for user {}", session_id, user_uuid);
        ImageSession::try_from(row)
    }

    async fn get_sessions_for_user(&self, user_uuid: &str) -> anyhow::Result<Vec<ImageSession>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, SessionRow>(&format!(
            r#"SELECT {SESSION_COLUMNS} FROM image_sessions
            WHERE user_uuid = $1
            ORDER BY session_id ASC"#
        ))
        .bind(user_uuid)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(ImageSession::try_from)
        .collect()
    }

    async fn get_session_for_user(
        &self,
        user_uuid: &str,
        session_id: i64,
    ) -> anyhow::Result<Option<ImageSession>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, SessionRow>(&format!(
            r#"SELECT {SESSION_COLUMNS} FROM image_sessions
            WHERE user_uuid = $1 AND session_id = $2"#
        ))
        .bind(user_uuid)
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(ImageSession::try_from)
        .transpose()
    }

    async fn get_all_sessions(&self) -> anyhow::Result<Vec<ImageSession>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, SessionRow>(&format!(
            r#"SELECT {SESSION_COLUMNS} FROM image_sessions ORDER BY session_id ASC"#
        ))
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(ImageSession::try_from)
        .collect()
    }

    async fn set_crack_status(
        &self,
        session_id: i64,
        status: CrackStatus,
    ) -> anyhow::Result<ImageSession> {
        let mut conn = self.state.conn().await?;
        let detected: Option<i64> = status.into();
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"UPDATE image_sessions SET crack_detected = $1
            WHERE session_id = $2
            RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(detected)
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::SessionNotFound(session_id))?;
        ImageSession::try_from(row)
    }

    async fn rename_session(&self, session_id: i64, image_name: &str) -> anyhow::Result<ImageSession> {
        let mut conn = self.state.conn().await?;
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"UPDATE image_sessions SET image_name = $1
            WHERE session_id = $2
            RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(image_name.trim())
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::SessionNotFound(session_id))?;
        ImageSession::try_from(row)
    }

    async fn delete_session(&self, session_id: i64) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query(r#"DELETE FROM image_sessions WHERE session_id = $1"#)
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::SessionNotFound(session_id).into());
        }
        Ok(())
    }
}

impl SampleRepository for Database {
    async fn add_sample(&self, pixels: &[u8], label: SampleLabel) -> anyhow::Result<i64> {
        let mut conn = self.state.conn().await?;
        let id: i64 =
            sqlx::query_scalar(r#"INSERT INTO ml_data (img, classifier) VALUES ($1, $2) RETURNING id"#)
                .bind(pixels)
                .bind(i64::from(label))
                .fetch_one(&mut *conn)
                .await?;
        Ok(id)
    }

    async fn sample_count(&self) -> anyhow::Result<u64> {
        let mut conn = self.state.conn().await?;
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM ml_data"#)
            .fetch_one(&mut *conn)
            .await?;
        Ok(u64::try_from(count)?)
    }

    async fn first_sample(&self) -> anyhow::Result<Option<TrainingSample>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, SampleRow>(
            r#"SELECT id, img, classifier FROM ml_data ORDER BY id ASC LIMIT 1"#,
        )
        .fetch_optional(&mut *conn)
        .await?
        .map(TrainingSample::try_from)
        .transpose()
    }

    async fn get_samples(&self, label: Option<SampleLabel>) -> anyhow::Result<Vec<TrainingSample>> {
        let mut conn = self.state.conn().await?;
        let label = label.map(i64::from);
        sqlx::query_as::<_, SampleRow>(
            r#"SELECT id, img, classifier FROM ml_data
            WHERE $1 IS NULL OR classifier = $1
            ORDER BY id ASC"#,
        )
        .bind(label)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(TrainingSample::try_from)
        .collect()
    }
}
