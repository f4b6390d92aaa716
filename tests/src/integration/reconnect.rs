//! # Broker Outages
//!
//! Transport failures are recovered by reconnecting; a call only fails
//! with a transport error when no connection can be had, and never
//! leaves a registry entry behind.

#[cfg(test)]
mod tests {
    use crate::fixtures::{client, payload, wait_for_consumers, Workers};
    use rpc_gateway::CallError;
    use rpc_worker::{handler_fn, HandlerRegistry};
    use serde_json::json;
    use shared_bus::{ConnectionState, InMemoryBroker};
    use shared_types::{queues, reply_queue_for, RpcResponse};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    const CALL_TIMEOUT: Duration = Duration::from_secs(3);

    fn exams_routes(delay: Duration, invocations: Arc<AtomicU64>) -> HandlerRegistry {
        HandlerRegistry::new()
            .with(
                queues::EXAMS,
                handler_fn(move |_| {
                    let invocations = Arc::clone(&invocations);
                    async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                        Ok(RpcResponse::success().with_field("exams", json!([])))
                    }
                }),
            )
            .unwrap()
    }

    async fn list_exams(client: &rpc_gateway::RpcClient) -> rpc_gateway::CallOutcome {
        client
            .call(
                queues::EXAMS,
                &reply_queue_for(queues::EXAMS),
                &payload(json!({})),
                CALL_TIMEOUT,
            )
            .await
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_fast_without_leak() {
        let broker = InMemoryBroker::new();
        broker.set_online(false);
        let client = client(&broker, CALL_TIMEOUT);

        let started = Instant::now();
        let err = list_exams(&client).await.unwrap_err();

        assert!(matches!(err, CallError::Transport(_)), "{err}");
        assert_eq!(err.status_code(), 500);
        assert!(started.elapsed() < CALL_TIMEOUT);
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.registry().stats().failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_calls_resume_after_broker_restart() {
        let broker = InMemoryBroker::new();
        let invocations = Arc::new(AtomicU64::new(0));
        let workers = Workers::spawn(&broker, exams_routes(Duration::ZERO, invocations.clone()));
        let client = client(&broker, CALL_TIMEOUT);

        assert!(list_exams(&client).await.unwrap().is_success());

        broker.set_online(false);
        assert!(list_exams(&client).await.is_err());
        broker.set_online(true);

        let response = list_exams(&client).await.unwrap();
        assert!(response.is_success());
        assert_eq!(client.pending_count(), 0);
        assert!(invocations.load(Ordering::SeqCst) >= 2);
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_outage_during_call_is_absorbed_before_deadline() {
        let broker = InMemoryBroker::new();
        let invocations = Arc::new(AtomicU64::new(0));
        let workers = Workers::spawn(
            &broker,
            exams_routes(Duration::from_millis(100), invocations.clone()),
        );
        wait_for_consumers(&broker, queues::EXAMS, 1).await;
        let client = client(&broker, CALL_TIMEOUT);

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { list_exams(&client).await }
        });

        // Flip the broker while the handler is busy; its reply publish
        // fails and the request is redelivered after reconnect.
        while invocations.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        broker.set_online(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.set_online(true);

        let response = call.await.unwrap().unwrap();
        assert!(response.is_success());
        assert!(invocations.load(Ordering::SeqCst) >= 2);
        assert!(workers.handle().stats().redeliveries.load(Ordering::Relaxed) >= 1);
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_unacked_request_is_redelivered_to_another_worker() {
        let broker = InMemoryBroker::new();
        let slow_invocations = Arc::new(AtomicU64::new(0));
        let slow = Workers::spawn(
            &broker,
            exams_routes(Duration::from_secs(10), slow_invocations.clone()),
        );
        wait_for_consumers(&broker, queues::EXAMS, 1).await;
        let client = client(&broker, CALL_TIMEOUT);

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { list_exams(&client).await }
        });
        while broker.unacked_count(queues::EXAMS) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // Crash the slow worker mid-message.
        slow.handle().abort();
        let fast = Workers::spawn(&broker, exams_routes(Duration::ZERO, Arc::new(AtomicU64::new(0))));

        let response = call.await.unwrap().unwrap();
        assert!(response.is_success());
        assert_eq!(slow_invocations.load(Ordering::SeqCst), 1);
        assert_eq!(fast.handle().stats().redeliveries.load(Ordering::Relaxed), 1);
        fast.stop().await;
    }

    #[tokio::test]
    async fn test_closed_client_connection_stays_closed() {
        let broker = InMemoryBroker::new();
        let connection = crate::fixtures::connection(&broker);
        assert!(connection.channel().await.is_ok());
        assert_eq!(connection.state(), ConnectionState::Connected);

        connection.close().await;
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(connection.channel().await.is_err());
    }
}
