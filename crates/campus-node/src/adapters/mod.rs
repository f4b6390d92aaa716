//! # Port Adapters
//!
//! Storage ports used by the worker services and their in-memory
//! implementations.
//!
//! ```text
//! ┌──────────────┐        ┌──────────────────┐
//! │ AuthService  │ ─────► │  UserDirectory   │ ◄── InMemoryUserDirectory
//! └──────────────┘        └──────────────────┘
//! ┌──────────────┐        ┌──────────────────┐
//! │DecanatService│ ─────► │   StudyOffice    │ ◄── InMemoryStudyOffice
//! └──────────────┘        └──────────────────┘
//! ```

pub mod memory;
pub mod ports;

pub use memory::{InMemoryStudyOffice, InMemoryUserDirectory, SEED_USER_EMAIL};
pub use ports::{
    Enrolment, Session, SessionKind, StoreError, StudyOffice, User, UserDirectory,
    INPUT_DATE_FORMAT, OUTPUT_DATE_FORMAT,
};
