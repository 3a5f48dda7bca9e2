use httpmock::Method::{DELETE, GET, POST, PUT};
use httpmock::MockServer;
use serde_json::json;

use crate::api::{
    ApiError, FeedbackKind, GradeUpdate, HttpSchoolApi, InMemorySchoolApi, NewFeedback, Priority,
    RequestStatus, SchoolApi,
};

fn client(server: &MockServer) -> HttpSchoolApi {
    HttpSchoolApi::new(&server.base_url(), Some("secret-token".to_string()), 5_000)
        .expect("client should initialize")
}

#[tokio::test]
async fn test_lists_enrollment_requests_with_bearer_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/enrollment-requests")
            .header("authorization", "Bearer secret-token");
        then.status(200).json_body(json!([
            {
                "id": 42,
                "student_id": 1000,
                "subject_id": 1,
                "subject_name": "Mathematics",
                "status": "pending",
                "created_at": "2026-01-05T08:00:00Z"
            }
        ]));
    });

    let requests = client(&server)
        .list_enrollment_requests()
        .await
        .expect("list should succeed");

    mock.assert();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, 42);
    assert_eq!(requests[0].status, RequestStatus::Pending);
    assert_eq!(requests[0].note, None);
}

#[tokio::test]
async fn test_approve_posts_to_review_action_path() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/enrollment-requests/42/approve");
        then.status(200).json_body(json!({
            "id": 42,
            "student_id": 1000,
            "subject_id": 1,
            "subject_name": "Mathematics",
            "status": "approved",
            "created_at": "2026-01-05T08:00:00Z"
        }));
    });

    let updated = client(&server)
        .set_enrollment_request_status(42, RequestStatus::Approved)
        .await
        .expect("approve should succeed");

    mock.assert();
    assert_eq!(updated.status, RequestStatus::Approved);
}

#[tokio::test]
async fn test_moving_back_to_pending_is_rejected_before_any_request() {
    let server = MockServer::start();
    let err = client(&server)
        .set_course_request_status(5, RequestStatus::Pending)
        .await
        .expect_err("pending is not a review action");
    assert!(matches!(err, ApiError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_update_grade_sends_only_changed_fields() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/grades/9")
            .json_body(json!({ "score": 91.0 }));
        then.status(200).json_body(json!({
            "id": 9,
            "student_id": 1000,
            "course_id": 10,
            "score": 91.0,
            "term": "2026-T1",
            "updated_at": "2026-02-01T10:00:00Z"
        }));
    });

    let grade = client(&server)
        .update_grade(
            9,
            GradeUpdate {
                score: Some(91.0),
                remarks: None,
            },
        )
        .await
        .expect("update should succeed");

    mock.assert();
    assert_eq!(grade.score, 91.0);
}

#[tokio::test]
async fn test_delete_accepts_empty_no_content_response() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/feedback/3");
        then.status(204);
    });

    client(&server)
        .delete_feedback(3)
        .await
        .expect("delete should succeed");
    mock.assert();
}

#[tokio::test]
async fn test_error_body_message_is_surfaced() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/feedback");
        then.status(422)
            .json_body(json!({ "message": "feedback subject cannot be empty" }));
    });

    let err = client(&server)
        .create_feedback(NewFeedback {
            author_id: 1,
            kind: FeedbackKind::Feedback,
            subject: String::new(),
            message: "hello".to_string(),
            priority: Priority::Low,
        })
        .await
        .expect_err("server rejects the payload");

    assert_eq!(
        err,
        ApiError::Status {
            status: 422,
            message: "feedback subject cannot be empty".to_string()
        }
    );
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/courses");
        then.status(200).body("not json");
    });

    let err = client(&server)
        .list_courses()
        .await
        .expect_err("body is not json");
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[test]
fn test_rejects_empty_base_url_and_zero_timeout() {
    assert!(matches!(
        HttpSchoolApi::new("  ", None, 1_000),
        Err(ApiError::Config(_))
    ));
    assert!(matches!(
        HttpSchoolApi::new("http://localhost:8000", None, 0),
        Err(ApiError::Config(_))
    ));
}

#[tokio::test]
async fn test_in_memory_backend_rejects_return_to_pending() {
    let api = InMemorySchoolApi::with_demo_data();

    let err = api
        .set_enrollment_request_status(11, RequestStatus::Pending)
        .await
        .expect_err("pending is not a review action");
    assert!(matches!(err, ApiError::InvalidTransition(_)));

    let err = api
        .set_course_request_status(13, RequestStatus::Pending)
        .await
        .expect_err("pending is not a review action");
    assert_eq!(
        err.to_string(),
        "invalid status transition: cannot move a request back to pending"
    );

    let requests = api.list_enrollment_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|request| request.status == RequestStatus::Pending));
}
