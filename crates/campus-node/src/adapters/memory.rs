//! In-memory adapters for the collaborator ports.

use super::ports::{
    Enrolment, Session, SessionKind, StoreError, StudyOffice, User, UserDirectory,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Account seeded into every default directory.
pub const SEED_USER_EMAIL: &str = "test@example.com";

// =============================================================================
// UserDirectory
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the seed account.
    pub fn seeded() -> Self {
        let directory = Self::new();
        directory.users.write().insert(
            SEED_USER_EMAIL.to_string(),
            User {
                name: Some("Test User".to_string()),
                email: SEED_USER_EMAIL.to_string(),
            },
        );
        directory
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(email).cloned())
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write();
        if users.contains_key(&user.email) {
            return Err(StoreError::AlreadyExists(format!(
                "user {} already exists",
                user.email
            )));
        }
        users.insert(user.email.clone(), user);
        Ok(())
    }
}

// =============================================================================
// StudyOffice
// =============================================================================

#[derive(Debug, Default)]
struct Schedule {
    sessions: BTreeMap<i64, Session>,
    enrolments: Vec<Enrolment>,
}

#[derive(Debug, Default)]
pub struct InMemoryStudyOffice {
    exams: RwLock<Schedule>,
    retakes: RwLock<Schedule>,
}

impl InMemoryStudyOffice {
    /// Office with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Office with a small fixed timetable.
    pub fn seeded() -> Self {
        let office = Self::new();
        let exams = [
            (1, "Mathematical Analysis", (2025, 1, 20)),
            (2, "Linear Algebra", (2025, 1, 24)),
            (3, "Databases", (2025, 1, 28)),
        ];
        let retakes = [
            (1, "Mathematical Analysis", (2025, 2, 10)),
            (2, "Linear Algebra", (2025, 2, 14)),
        ];
        for (kind, table) in [(SessionKind::Exam, &exams[..]), (SessionKind::Retake, &retakes[..])] {
            for &(id, name, (y, m, d)) in table {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    office.add_session(kind, Session { id, name: name.to_string(), date });
                }
            }
        }
        office
    }

    fn schedule(&self, kind: SessionKind) -> &RwLock<Schedule> {
        match kind {
            SessionKind::Exam => &self.exams,
            SessionKind::Retake => &self.retakes,
        }
    }

    /// Add or replace a session.
    pub fn add_session(&self, kind: SessionKind, session: Session) {
        self.schedule(kind).write().sessions.insert(session.id, session);
    }

    pub fn enrolment_count(&self, kind: SessionKind) -> usize {
        self.schedule(kind).read().enrolments.len()
    }
}

#[async_trait]
impl StudyOffice for InMemoryStudyOffice {
    async fn sessions(&self, kind: SessionKind) -> Result<Vec<Session>, StoreError> {
        Ok(self.schedule(kind).read().sessions.values().cloned().collect())
    }

    async fn enrolments(
        &self,
        kind: SessionKind,
        email: &str,
    ) -> Result<Vec<Enrolment>, StoreError> {
        Ok(self
            .schedule(kind)
            .read()
            .enrolments
            .iter()
            .filter(|e| e.email == email)
            .cloned()
            .collect())
    }

    async fn enroll(&self, kind: SessionKind, enrolment: Enrolment) -> Result<(), StoreError> {
        let mut schedule = self.schedule(kind).write();
        if !schedule.sessions.contains_key(&enrolment.session_id) {
            return Err(StoreError::NotFound(format!(
                "{} {} not found",
                kind, enrolment.session_id
            )));
        }
        if schedule
            .enrolments
            .iter()
            .any(|e| e.email == enrolment.email && e.session_id == enrolment.session_id)
        {
            return Err(StoreError::AlreadyExists(format!(
                "enrolment on {} {} already exists",
                kind, enrolment.session_id
            )));
        }
        schedule.enrolments.push(enrolment);
        Ok(())
    }

    async fn cancel(
        &self,
        kind: SessionKind,
        email: &str,
        session_id: i64,
    ) -> Result<(), StoreError> {
        let mut schedule = self.schedule(kind).write();
        let before = schedule.enrolments.len();
        schedule
            .enrolments
            .retain(|e| !(e.email == email && e.session_id == session_id));
        if schedule.enrolments.len() == before {
            return Err(StoreError::NotFound(format!(
                "no enrolment on {} {} for {}",
                kind, session_id, email
            )));
        }
        Ok(())
    }
}
