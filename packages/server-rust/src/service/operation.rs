//! Operation types carried through every pipeline.
//!
//! An [`Operation`] is one decoded inbound request. It always carries an
//! [`OperationContext`] whose `method` names the endpoint for logging and
//! metrics and whose `deadline`/`cancel` pair bounds all downstream work,
//! including remote calls issued by a fan-out.

use std::time::Duration;

use lms_core::{
    Account, AccountUpdate, Course, Enrollment, ErrorKind, IdError, NewAccount, NewCourse,
    NewEnrollment, NewStudent, Page, Student,
};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Service names, one per deployable process.
pub mod service_names {
    pub const STUDENTS: &str = "students";
    pub const COURSES: &str = "courses";
    pub const ACCOUNTS: &str = "accounts";
}

/// Method tags. Each inbound endpoint owns one and gets its own pipeline.
pub mod methods {
    pub const GET_STUDENT: &str = "get_student";
    pub const LIST_STUDENTS: &str = "list_students";
    pub const CREATE_STUDENT: &str = "create_student";
    pub const UPDATE_STUDENT: &str = "update_student";
    pub const DELETE_STUDENT: &str = "delete_student";
    pub const GET_STUDENT_COURSES: &str = "get_student_courses";
    pub const ENROLL_STUDENT: &str = "enroll_student";
    pub const GET_COURSE_STUDENTS: &str = "get_course_students";

    pub const GET_COURSE: &str = "get_course";
    pub const LIST_COURSES: &str = "list_courses";
    pub const CREATE_COURSE: &str = "create_course";
    pub const UPDATE_COURSE: &str = "update_course";
    pub const DELETE_COURSE: &str = "delete_course";

    pub const CREATE_ACCOUNT: &str = "create_account";
    pub const GET_ACCOUNT: &str = "get_account";
    pub const UPDATE_ACCOUNT: &str = "update_account";
}

// ---------------------------------------------------------------------------
// OperationContext
// ---------------------------------------------------------------------------

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub service_name: &'static str,
    /// Endpoint tag used by logging and metrics decorators.
    pub method: &'static str,
    /// Absolute deadline; remote calls fail with `RemoteTimeout` past it.
    pub deadline: Instant,
    /// Cancelled when the caller gives up or a fan-out sibling fails.
    pub cancel: CancellationToken,
    /// Value of the inbound `x-request-id` header, if any.
    pub request_id: Option<String>,
}

impl OperationContext {
    /// Creates a context whose deadline is `timeout` from now.
    #[must_use]
    pub fn new(
        call_id: u64,
        service_name: &'static str,
        method: &'static str,
        timeout: Duration,
    ) -> Self {
        Self {
            call_id,
            service_name,
            method,
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
            request_id: None,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// A copy sharing the deadline whose token is a child of this one.
    ///
    /// Cancelling the child never cancels the parent; cancelling the parent
    /// cancels every child.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// A copy re-tagged with another method, used for outbound calls.
    #[must_use]
    pub fn for_method(&self, method: &'static str) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Typed operation variants dispatched through the pipeline.
///
/// Identifiers stay as the raw path strings; parsing them is the domain
/// service's job so that malformed ids surface as `Validation` errors from
/// inside the instrumented pipeline.
#[derive(Debug)]
#[non_exhaustive]
pub enum Operation {
    // ----- students -----
    GetStudent { ctx: OperationContext, id: String },
    ListStudents { ctx: OperationContext, page: Page },
    CreateStudent { ctx: OperationContext, payload: NewStudent },
    UpdateStudent { ctx: OperationContext, id: String, payload: NewStudent },
    DeleteStudent { ctx: OperationContext, id: String },
    GetStudentCourses { ctx: OperationContext, id: String },
    EnrollStudent { ctx: OperationContext, id: String, payload: NewEnrollment },
    GetCourseStudents { ctx: OperationContext, course_id: String },

    // ----- courses -----
    GetCourse { ctx: OperationContext, id: String },
    ListCourses { ctx: OperationContext, page: Page },
    CreateCourse { ctx: OperationContext, payload: NewCourse },
    UpdateCourse { ctx: OperationContext, id: String, payload: NewCourse },
    DeleteCourse { ctx: OperationContext, id: String },

    // ----- accounts -----
    CreateAccount { ctx: OperationContext, payload: NewAccount },
    GetAccount { ctx: OperationContext, username: String },
    UpdateAccount { ctx: OperationContext, username: String, update: AccountUpdate },
}

impl Operation {
    /// Returns the context of any variant.
    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::GetStudent { ctx, .. }
            | Self::ListStudents { ctx, .. }
            | Self::CreateStudent { ctx, .. }
            | Self::UpdateStudent { ctx, .. }
            | Self::DeleteStudent { ctx, .. }
            | Self::GetStudentCourses { ctx, .. }
            | Self::EnrollStudent { ctx, .. }
            | Self::GetCourseStudents { ctx, .. }
            | Self::GetCourse { ctx, .. }
            | Self::ListCourses { ctx, .. }
            | Self::CreateCourse { ctx, .. }
            | Self::UpdateCourse { ctx, .. }
            | Self::DeleteCourse { ctx, .. }
            | Self::CreateAccount { ctx, .. }
            | Self::GetAccount { ctx, .. }
            | Self::UpdateAccount { ctx, .. } => ctx,
        }
    }
}

// ---------------------------------------------------------------------------
// Describe / Summarize
// ---------------------------------------------------------------------------

/// Request side of the logging and metrics contract.
pub trait Describe {
    /// Method tag for this call.
    fn method(&self) -> &'static str;

    /// Selected request fields, rendered for a log line.
    fn fields(&self) -> String;
}

/// Response side of the logging contract: a short result summary.
pub trait Summarize {
    fn summary(&self) -> String;
}

impl Describe for Operation {
    fn method(&self) -> &'static str {
        self.ctx().method
    }

    fn fields(&self) -> String {
        match self {
            Self::GetStudent { id, .. }
            | Self::UpdateStudent { id, .. }
            | Self::DeleteStudent { id, .. }
            | Self::GetStudentCourses { id, .. }
            | Self::GetCourse { id, .. }
            | Self::UpdateCourse { id, .. }
            | Self::DeleteCourse { id, .. } => format!("id={id}"),
            Self::EnrollStudent { id, payload, .. } => {
                format!("id={id} course_id={}", payload.course_id)
            }
            Self::GetCourseStudents { course_id, .. } => format!("course_id={course_id}"),
            Self::ListStudents { page, .. } | Self::ListCourses { page, .. } => {
                format!("limit={} offset={}", page.limit, page.offset)
            }
            Self::CreateStudent { payload, .. } => format!("grade={}", payload.grade),
            Self::CreateCourse { payload, .. } => format!("name={}", payload.name),
            Self::CreateAccount { payload, .. } => format!("username={}", payload.username),
            Self::GetAccount { username, .. } | Self::UpdateAccount { username, .. } => {
                format!("username={username}")
            }
        }
    }
}

impl Summarize for Student {
    fn summary(&self) -> String {
        format!("student id={}", self.id)
    }
}

impl Summarize for Course {
    fn summary(&self) -> String {
        format!("course id={}", self.id)
    }
}

impl<T> Summarize for Vec<T> {
    fn summary(&self) -> String {
        format!("len={}", self.len())
    }
}

// ---------------------------------------------------------------------------
// OperationResponse
// ---------------------------------------------------------------------------

/// Successful response from an operation handler.
///
/// Serializes as the bare entity (or array), which is also the wire format
/// remote clients decode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationResponse {
    Student(Student),
    Students(Vec<Student>),
    Course(Course),
    Courses(Vec<Course>),
    Enrollment(Enrollment),
    Account(Account),
    /// The record was removed; the transport answers with no body.
    Deleted,
}

impl Summarize for OperationResponse {
    fn summary(&self) -> String {
        match self {
            Self::Student(s) => s.summary(),
            Self::Course(c) => c.summary(),
            Self::Students(list) => format!("students {}", list.summary()),
            Self::Courses(list) => format!("courses {}", list.summary()),
            Self::Enrollment(e) => {
                format!("enrollment student_id={} course_id={}", e.student_id, e.course_id)
            }
            Self::Account(a) => format!("account username={}", a.username),
            Self::Deleted => "deleted".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationError
// ---------------------------------------------------------------------------

/// Errors returned by operations and by the decorators wrapping them.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("invalid request: {reason}")]
    Validation { reason: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("rate limit exceeded for {endpoint}")]
    Throttled { endpoint: &'static str },
    #[error("circuit open for {dependency}")]
    CircuitOpen { dependency: &'static str },
    #[error("{dependency} did not answer within {timeout_ms}ms")]
    RemoteTimeout {
        dependency: &'static str,
        timeout_ms: u64,
    },
    #[error("{dependency} unavailable: {reason}")]
    RemoteUnavailable {
        dependency: &'static str,
        reason: String,
    },
    #[error("resolving {related_id} for {seed_id} failed: {source}")]
    Aggregate {
        seed_id: String,
        related_id: String,
        #[source]
        source: Box<OperationError>,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid pipeline configuration: {reason}")]
    Configuration { reason: String },
    #[error("no endpoint registered for method {method}")]
    UnknownMethod { method: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a configuration failure.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Stable classification. An `Aggregate` reports the kind of the branch
    /// that failed, so upstream callers classify it like the original error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::RemoteTimeout { .. } => ErrorKind::RemoteTimeout,
            Self::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            Self::Aggregate { source, .. } => source.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Configuration { .. } | Self::UnknownMethod { .. } => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }
}

impl From<IdError> for OperationError {
    fn from(err: IdError) -> Self {
        Self::validation(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
