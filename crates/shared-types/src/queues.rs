//! # Queue Names
//!
//! Broker queue names are part of the contract between gateway and worker.
//! Every request queue has a well-known reply queue derived by
//! [`reply_queue_for`].

/// User registration.
pub const REGISTRATION: &str = "registration_queue";
/// User authorization (login).
pub const AUTHORIZATION: &str = "authorization_queue";

/// List all exams.
pub const EXAMS: &str = "exams_queue";
/// List a student's exam enrolments.
pub const ENROLMENTS_EXAMS: &str = "enrolments_exams_queue";
/// Enroll a student to an exam.
pub const ENROLL_TO_EXAM: &str = "enroll_to_exam_queue";
/// Cancel an exam enrolment.
pub const CANCEL_EXAM: &str = "cancel_exam_queue";

/// List all retakes.
pub const RETAKES: &str = "retakes_queue";
/// List a student's retake enrolments.
pub const ENROLMENTS_RETAKE: &str = "enrolments_retake_queue";
/// Enroll a student to a retake.
pub const ENROLL_TO_RETAKE: &str = "enroll_to_retake_queue";
/// Cancel a retake enrolment.
pub const CANCEL_RETAKE: &str = "cancel_retake_queue";

/// Queues served by the auth worker.
pub const AUTH_QUEUES: [&str; 2] = [REGISTRATION, AUTHORIZATION];

/// Queues served by the exams/retakes worker.
pub const DECANAT_QUEUES: [&str; 8] = [
    EXAMS,
    ENROLMENTS_EXAMS,
    ENROLL_TO_EXAM,
    CANCEL_EXAM,
    RETAKES,
    ENROLMENTS_RETAKE,
    ENROLL_TO_RETAKE,
    CANCEL_RETAKE,
];

/// Suffix shared by every reply queue.
pub const RESPONSE_SUFFIX: &str = "_response_queue";

/// Well-known reply queue for a request queue.
///
/// `registration_queue` becomes `registration_response_queue`; names
/// without the `_queue` suffix just get `_response_queue` appended.
pub fn reply_queue_for(request_queue: &str) -> String {
    let stem = request_queue
        .strip_suffix("_queue")
        .unwrap_or(request_queue);
    format!("{stem}{RESPONSE_SUFFIX}")
}

/// Whether `queue` is one of the known request queues.
pub fn is_request_queue(queue: &str) -> bool {
    AUTH_QUEUES.contains(&queue) || DECANAT_QUEUES.contains(&queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_queue_naming() {
        assert_eq!(reply_queue_for(REGISTRATION), "registration_response_queue");
        assert_eq!(reply_queue_for(AUTHORIZATION), "authorization_response_queue");
        assert_eq!(
            reply_queue_for(ENROLL_TO_RETAKE),
            "enroll_to_retake_response_queue"
        );
        assert_eq!(reply_queue_for("custom"), "custom_response_queue");
    }

    #[test]
    fn test_request_queue_membership() {
        assert!(is_request_queue(EXAMS));
        assert!(is_request_queue(CANCEL_RETAKE));
        assert!(!is_request_queue("registration_response_queue"));
        assert!(!is_request_queue("unknown_queue"));
    }
}
