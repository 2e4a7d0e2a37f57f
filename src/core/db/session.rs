use std::{collections::BTreeMap, future::Future};

use time::{Date, OffsetDateTime};

/// Classification outcome of a capture. Stored as a nullable integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrackStatus {
    Pending,
    NoCrack,
    Crack,
}

impl CrackStatus {
    pub fn from_detection(crack: bool) -> Self {
        if crack {
            CrackStatus::Crack
        } else {
            CrackStatus::NoCrack
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CrackStatus::Pending => "PENDING",
            CrackStatus::NoCrack => "NOCRACK",
            CrackStatus::Crack => "CRACK",
        }
    }
}

impl TryFrom<Option<i64>> for CrackStatus {
    type Error = anyhow::Error;

    fn try_from(value: Option<i64>) -> Result<Self, Self::Error> {
        match value {
            None => Ok(CrackStatus::Pending),
            Some(0) => Ok(CrackStatus::NoCrack),
            Some(1) => Ok(CrackStatus::Crack),
            Some(other) => Err(anyhow::anyhow!("Invalid crack_detected value: {}", other)),
        }
    }
}

impl From<CrackStatus> for Option<i64> {
    fn from(status: CrackStatus) -> Self {
        match status {
            CrackStatus::Pending => None,
            CrackStatus::NoCrack => Some(0),
            CrackStatus::Crack => Some(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSession {
    pub session_id: i64,
    pub date: OffsetDateTime,
    pub user_uuid: String,
    pub image_name: String,
    pub crack_status: CrackStatus,
    pub(super) _guard: (),
}

impl ImageSession {
    /// List entry shown in the history browser: `<id>_<STATUS>_<name>`.
    pub fn label(&self) -> String {
        format!(
            "{}_{}_{}",
            self.session_id,
            self.crack_status.as_str(),
            self.image_name
        )
    }

    pub fn day(&self) -> Date {
        self.date.date()
    }
}

/// Group sessions by calendar day, keeping the input order inside each day.
pub fn group_by_day(sessions: &[ImageSession]) -> BTreeMap<Date, Vec<ImageSession>> {
    let mut grouped: BTreeMap<Date, Vec<ImageSession>> = BTreeMap::new();
    for session in sessions {
        grouped.entry(session.day()).or_default().push(session.clone());
    }
    grouped
}

pub trait SessionRepository {
    fn add_session(
        &self,
        user_uuid: &str,
        image_name: Option<&str>,
    ) -> impl Future<Output = anyhow::Result<ImageSession>> + Send;
    fn get_sessions_for_user(
        &self,
        user_uuid: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<ImageSession>>> + Send;
    fn get_session_for_user(
        &self,
        user_uuid: &str,
        session_id: i64,
    ) -> impl Future<Output = anyhow::Result<Option<ImageSession>>> + Send;
    fn get_all_sessions(&self) -> impl Future<Output = anyhow::Result<Vec<ImageSession>>> + Send;
    fn set_crack_status(
        &self,
        session_id: i64,
        status: CrackStatus,
    ) -> impl Future<Output = anyhow::Result<ImageSession>> + Send;
    fn rename_session(
        &self,
        session_id: i64,
        image_name: &str,
    ) -> impl Future<Output = anyhow::Result<ImageSession>> + Send;
    fn delete_session(&self, session_id: i64) -> impl Future<Output = anyhow::Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn session(id: i64, date: OffsetDateTime, status: CrackStatus) -> ImageSession {
        ImageSession {
            session_id: id,
            date,
            user_uuid: "u".into(),
            image_name: "wall".into(),
            crack_status: status,
            _guard: (),
        }
    }

    #[test]
    fn label_uses_status_names() {
        let s = session(1000, datetime!(2024-03-05 10:00 UTC), CrackStatus::Crack);
        assert_eq!(s.label(), "1000_CRACK_wall");
        let s = session(2000, datetime!(2024-03-05 10:00 UTC), CrackStatus::NoCrack);
        assert_eq!(s.label(), "2000_NOCRACK_wall");
    }

    #[test]
    fn status_column_mapping() {
        assert_eq!(CrackStatus::try_from(None).unwrap(), CrackStatus::Pending);
        assert_eq!(CrackStatus::try_from(Some(1)).unwrap(), CrackStatus::Crack);
        assert!(CrackStatus::try_from(Some(7)).is_err());
        assert_eq!(Option::<i64>::from(CrackStatus::NoCrack), Some(0));
    }

    #[test]
    fn groups_by_day() {
        let sessions = vec![
            session(1, datetime!(2024-03-05 09:00 UTC), CrackStatus::Crack),
            session(2, datetime!(2024-03-06 09:00 UTC), CrackStatus::Pending),
            session(3, datetime!(2024-03-05 18:00 UTC), CrackStatus::NoCrack),
        ];
        let grouped = group_by_day(&sessions);
        assert_eq!(grouped.len(), 2);
        let first_day: Vec<i64> = grouped
            .values()
            .next()
            .unwrap()
            .iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(first_day, vec![1, 3]);
    }
}
