//! # End-to-End Flows
//!
//! Gateway facade → RPC client → broker → dispatcher → handler and back,
//! first against a bare registration worker, then against the full node.

#[cfg(test)]
mod tests {
    use crate::fixtures::{client, payload, registration_handler, Workers, TAKEN_EMAIL};
    use campus_node::{NodeConfig, NodeRuntime};
    use rpc_gateway::CallError;
    use rpc_worker::HandlerRegistry;
    use serde_json::json;
    use shared_bus::InMemoryBroker;
    use shared_types::{queues, reply_queue_for, ExamEnrolment};
    use std::time::Duration;
    use tokio::time::Instant;

    fn registration_worker(broker: &InMemoryBroker) -> Workers {
        let routes = HandlerRegistry::new()
            .with(queues::REGISTRATION, registration_handler())
            .unwrap();
        Workers::spawn(broker, routes)
    }

    // =========================================================================
    // BARE WORKER
    // =========================================================================

    #[tokio::test]
    async fn test_registration_of_new_email_succeeds() {
        let broker = InMemoryBroker::new();
        let workers = registration_worker(&broker);
        let client = client(&broker, Duration::from_secs(2));

        let response = client
            .call(
                queues::REGISTRATION,
                &reply_queue_for(queues::REGISTRATION),
                &payload(json!({"email": "a@x.com", "password": "p"})),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"status": "success"}));
        assert_eq!(client.pending_count(), 0);
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_registration_of_taken_email_fails_with_message() {
        let broker = InMemoryBroker::new();
        let workers = registration_worker(&broker);
        let client = client(&broker, Duration::from_secs(2));

        let response = client
            .call(
                queues::REGISTRATION,
                &reply_queue_for(queues::REGISTRATION),
                &payload(json!({"email": TAKEN_EMAIL, "password": "p"})),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert!(!response.is_success());
        assert!(!response.message.unwrap().is_empty());
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_worker_means_timeout_and_no_entry() {
        let broker = InMemoryBroker::new();
        registration_worker(&broker).stop().await;
        let client = client(&broker, Duration::from_secs(2));
        let timeout = Duration::from_millis(300);

        let started = Instant::now();
        let err = client
            .call(
                queues::REGISTRATION,
                &reply_queue_for(queues::REGISTRATION),
                &payload(json!({"email": "a@x.com", "password": "p"})),
                timeout,
            )
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "{err}");
        assert!(elapsed >= timeout, "returned after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_millis(250), "returned after {elapsed:?}");
        assert_eq!(client.pending_count(), 0);
        // The request is still queued for a worker that may come back.
        assert_eq!(broker.queue_depth(queues::REGISTRATION), 1);
        assert!(matches!(err, CallError::Timeout { .. }));
    }

    // =========================================================================
    // FULL NODE
    // =========================================================================

    #[tokio::test]
    async fn test_node_auth_flow() {
        let runtime = NodeRuntime::start(NodeConfig::default()).await.unwrap();
        let gateway = runtime.gateway();

        let taken = gateway.register(None, TAKEN_EMAIL, "p").await;
        assert_eq!(taken.status_code, 400);
        assert_eq!(taken.body["status"], json!("failed"));

        let fresh = gateway.register(Some("Ann".into()), "ann@x.com", "p").await;
        assert_eq!(fresh.status_code, 200);

        let login = gateway.authorize("ann@x.com", "p").await;
        assert!(login.is_success());

        let unknown = gateway.authorize("ghost@x.com", "p").await;
        assert_eq!(unknown.status_code, 400);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_node_exam_enrolment_flow() {
        let runtime = NodeRuntime::start(NodeConfig::default()).await.unwrap();
        let gateway = runtime.gateway();

        let exams = gateway.list_exams().await;
        assert_eq!(exams.status_code, 200);
        let first_id = exams.body["exams"][0]["id"].as_i64().unwrap();

        let enrolment = ExamEnrolment {
            email: "ann@x.com".into(),
            exam_id: first_id,
            kind: Some("exam".into()),
            date: Some("20-01-2025".into()),
        };
        assert!(gateway.enroll_to_exam(enrolment.clone()).await.is_success());
        assert_eq!(gateway.enroll_to_exam(enrolment).await.status_code, 400);

        let listed = gateway.exam_enrolments("ann@x.com").await;
        assert_eq!(listed.body["enrolments-exams"][0]["exam_id"], json!(first_id));

        assert!(gateway.cancel_exam("ann@x.com", first_id).await.is_success());
        let listed = gateway.exam_enrolments("ann@x.com").await;
        assert_eq!(listed.body["enrolments-exams"], json!([]));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_node_rejects_malformed_forward_without_publishing() {
        let runtime = NodeRuntime::start(NodeConfig::default()).await.unwrap();
        let published = runtime.broker().published();

        let reply = runtime
            .gateway()
            .forward(queues::ENROLL_TO_EXAM, &payload(json!({"email": "a@x.com"})))
            .await;

        assert_eq!(reply.status_code, 400);
        assert_eq!(runtime.broker().published(), published);
        runtime.shutdown().await;
    }
}
