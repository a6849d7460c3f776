//! LMS Core: entities, identifier parsing, and the error taxonomy shared by
//! the accounts, courses, and students services.

pub mod error;
pub mod id;
pub mod types;

pub use error::{ErrorEnvelope, ErrorKind};
pub use id::{parse_id, validate_username, IdError};
pub use types::{
    Account, AccountUpdate, Course, Enrollment, NewAccount, NewCourse, NewEnrollment, NewStudent,
    Page, Student,
};

