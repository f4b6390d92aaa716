//! # Call Semantics
//!
//! Exactly one terminal outcome per call: handler failures come back as
//! `failed` replies, silence comes back as a timeout, and stray replies
//! leave no trace.

#[cfg(test)]
mod tests {
    use crate::fixtures::{client, connection, fast_backoff, payload, wait_for_consumers, Workers};
    use rpc_gateway::{CallError, CallState};
    use rpc_worker::{handler_fn, Dispatcher, HandlerError, HandlerRegistry, WorkerConfig};
    use serde_json::json;
    use shared_bus::InMemoryBroker;
    use shared_types::{queues, reply_queue_for, CorrelationId, Envelope, RpcResponse};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::Instant;

    const CALL_TIMEOUT: Duration = Duration::from_secs(2);

    fn credentials() -> shared_types::Payload {
        payload(json!({"email": "a@x.com", "password": "p"}))
    }

    async fn call_auth(client: &rpc_gateway::RpcClient, timeout: Duration) -> rpc_gateway::CallOutcome {
        client
            .call(
                queues::AUTHORIZATION,
                &reply_queue_for(queues::AUTHORIZATION),
                &credentials(),
                timeout,
            )
            .await
    }

    #[tokio::test]
    async fn test_handler_error_answers_failed_before_timeout() {
        let broker = InMemoryBroker::new();
        let routes = HandlerRegistry::new()
            .with(
                queues::AUTHORIZATION,
                handler_fn(|_| async { Err(HandlerError::Backend("database is down".into())) }),
            )
            .unwrap();
        let workers = Workers::spawn(&broker, routes);
        let client = client(&broker, CALL_TIMEOUT);

        let started = Instant::now();
        let response = call_auth(&client, CALL_TIMEOUT).await.unwrap();

        assert!(started.elapsed() < CALL_TIMEOUT);
        assert!(!response.is_success());
        assert!(response.message.unwrap().contains("database is down"));
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_handler_panic_answers_failed_and_worker_survives() {
        let broker = InMemoryBroker::new();
        let routes = HandlerRegistry::new()
            .with(
                queues::AUTHORIZATION,
                handler_fn(|request| async move {
                    if request.email() == Some("a@x.com") {
                        panic!("handler bug");
                    }
                    Ok(RpcResponse::success())
                }),
            )
            .unwrap();
        let workers = Workers::spawn(&broker, routes);
        let client = client(&broker, CALL_TIMEOUT);

        let response = call_auth(&client, CALL_TIMEOUT).await.unwrap();
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("handler bug"));

        // Same worker keeps answering.
        let ok = client
            .call(
                queues::AUTHORIZATION,
                &reply_queue_for(queues::AUTHORIZATION),
                &payload(json!({"email": "b@x.com", "password": "p"})),
                CALL_TIMEOUT,
            )
            .await
            .unwrap();
        assert!(ok.is_success());
        assert_eq!(workers.handle().stats().handler_failures.load(Ordering::Relaxed), 1);
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_unrouted_queue_answers_unrecognized_destination() {
        let broker = InMemoryBroker::new();
        let config = WorkerConfig {
            extra_queues: vec!["grades_queue".into()],
            reconnect: fast_backoff(),
            ..WorkerConfig::default()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Dispatcher::new(connection(&broker), HandlerRegistry::new(), config)
            .spawn(shutdown_rx);
        let client = client(&broker, CALL_TIMEOUT);

        let response = client
            .call("grades_queue", "grades_response_queue", &credentials(), CALL_TIMEOUT)
            .await
            .unwrap();

        assert!(!response.is_success());
        assert!(response.message.unwrap().contains("Unrecognized destination"));
        shutdown_tx.send(true).unwrap();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_unknown_correlation_id_reply_is_dropped() {
        let broker = InMemoryBroker::new();
        let routes = HandlerRegistry::new()
            .with(
                queues::AUTHORIZATION,
                handler_fn(|_| async { Ok(RpcResponse::success()) }),
            )
            .unwrap();
        let workers = Workers::spawn(&broker, routes);
        let client = client(&broker, CALL_TIMEOUT);
        // First call starts the reply listener.
        assert!(call_auth(&client, CALL_TIMEOUT).await.unwrap().is_success());

        let reply_queue = reply_queue_for(queues::AUTHORIZATION);
        let stray = Envelope::reply(&RpcResponse::success(), CorrelationId::new()).unwrap();
        broker.open_channel().unwrap().publish(&reply_queue, stray).await.unwrap();

        let stats = client.registry().stats();
        while stats.dropped_replies.load(Ordering::Relaxed) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.pending_count(), 0);
        assert_eq!(broker.unacked_count(&reply_queue), 0);
        assert!(call_auth(&client, CALL_TIMEOUT).await.unwrap().is_success());
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_late_reply_after_timeout_is_dropped() {
        let broker = InMemoryBroker::new();
        let routes = HandlerRegistry::new()
            .with(
                queues::AUTHORIZATION,
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(RpcResponse::success())
                }),
            )
            .unwrap();
        let workers = Workers::spawn(&broker, routes);
        let client = client(&broker, CALL_TIMEOUT);

        let err = call_auth(&client, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }));
        assert_eq!(client.pending_count(), 0);

        let stats = client.registry().stats();
        while stats.dropped_replies.load(Ordering::Relaxed) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stats.timed_out.load(Ordering::Relaxed), 1);
        assert_eq!(stats.fulfilled.load(Ordering::Relaxed), 0);
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_abandoned_call_is_deregistered() {
        let broker = InMemoryBroker::new();
        let routes = HandlerRegistry::new()
            .with(
                queues::AUTHORIZATION,
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(RpcResponse::success())
                }),
            )
            .unwrap();
        let workers = Workers::spawn(&broker, routes);
        let client = client(&broker, CALL_TIMEOUT);

        // The caller gives up long before the call's own deadline.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), call_auth(&client, CALL_TIMEOUT)).await;
        assert!(abandoned.is_err());
        assert_eq!(client.pending_count(), 0);

        let stats = client.registry().stats();
        assert_eq!(stats.cancelled.load(Ordering::Relaxed), 1);
        while stats.dropped_replies.load(Ordering::Relaxed) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        workers.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_correlation_id_rejected_while_in_flight() {
        let broker = InMemoryBroker::new();
        let routes = HandlerRegistry::new()
            .with(
                queues::AUTHORIZATION,
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(RpcResponse::success())
                }),
            )
            .unwrap();
        let workers = Workers::spawn(&broker, routes);
        wait_for_consumers(&broker, queues::AUTHORIZATION, 1).await;
        let client = client(&broker, CALL_TIMEOUT);
        let id = CorrelationId::new();
        let reply_queue = reply_queue_for(queues::AUTHORIZATION);
        let body = credentials();

        let first = client.call_with_correlation_id(
            id.clone(),
            queues::AUTHORIZATION,
            &reply_queue,
            &body,
            CALL_TIMEOUT,
        );
        let second = async {
            while client.registry().state(&id) != Some(CallState::Pending) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            client
                .call_with_correlation_id(
                    id.clone(),
                    queues::AUTHORIZATION,
                    &reply_queue,
                    &body,
                    CALL_TIMEOUT,
                )
                .await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.unwrap().is_success());
        assert_eq!(second.unwrap_err(), CallError::DuplicateCorrelationId(id));
        workers.stop().await;
    }
}
