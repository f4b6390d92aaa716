//! # Concurrent Calls
//!
//! Many callers share one reply queue per request type; only the
//! correlation id routes a reply back to its caller.

#[cfg(test)]
mod tests {
    use crate::fixtures::{client, payload, Workers};
    use campus_node::{NodeConfig, NodeRuntime};
    use futures::future::join_all;
    use rand::Rng;
    use rpc_worker::{handler_fn, Handler, HandlerRegistry};
    use serde_json::json;
    use shared_bus::InMemoryBroker;
    use shared_types::{queues, reply_queue_for, CorrelationId, RpcResponse};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    const CALLS: usize = 120;

    /// Echoes the caller's email after a random delay.
    fn echo_after_random_delay() -> Arc<dyn Handler> {
        handler_fn(|request| async move {
            let delay = rand::thread_rng().gen_range(0..15u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let email = request.email().unwrap_or_default().to_string();
            Ok(RpcResponse::success().with_field("echo", email))
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_caller_gets_its_own_reply() {
        let broker = InMemoryBroker::new();
        // Competing dispatchers on the same queue; replies interleave.
        let workers: Vec<Workers> = (0..4)
            .map(|_| {
                let routes = HandlerRegistry::new()
                    .with(queues::AUTHORIZATION, echo_after_random_delay())
                    .unwrap();
                Workers::spawn(&broker, routes)
            })
            .collect();
        let client = client(&broker, Duration::from_secs(10));
        let reply_queue = reply_queue_for(queues::AUTHORIZATION);

        let calls = (0..CALLS).map(|i| {
            let client = Arc::clone(&client);
            let reply_queue = reply_queue.clone();
            async move {
                let email = format!("user-{i}@x.com");
                let body = payload(json!({"email": email, "password": format!("p{i}")}));
                let outcome = client
                    .call_with_correlation_id(
                        CorrelationId::from_raw(format!("call-{i}")),
                        queues::AUTHORIZATION,
                        &reply_queue,
                        &body,
                        Duration::from_secs(10),
                    )
                    .await;
                (email, outcome)
            }
        });
        let results = join_all(calls).await;

        for (email, outcome) in results {
            let response = outcome.unwrap();
            assert_eq!(response.field("echo"), Some(&json!(email)));
        }
        let stats = client.registry().stats();
        assert_eq!(stats.fulfilled.load(Ordering::Relaxed), CALLS as u64);
        assert_eq!(stats.dropped_replies.load(Ordering::Relaxed), 0);
        assert_eq!(client.pending_count(), 0);

        let handled: u64 = workers
            .iter()
            .map(|w| w.handle().stats().handled.load(Ordering::Relaxed))
            .sum();
        assert_eq!(handled, CALLS as u64);
        for workers in workers {
            workers.stop().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_node_serves_mixed_queues_concurrently() {
        let runtime = NodeRuntime::start(NodeConfig::default()).await.unwrap();
        let gateway = runtime.gateway();

        let logins = (0..50).map(|_| gateway.authorize("test@example.com", "p"));
        let listings = (0..50).map(|_| gateway.list_retakes());
        let (logins, listings) = tokio::join!(join_all(logins), join_all(listings));

        assert!(logins.iter().all(|r| r.is_success()));
        assert!(listings
            .iter()
            .all(|r| r.body["retakes"].as_array().map(Vec::len) == Some(2)));
        assert_eq!(runtime.client().pending_count(), 0);

        runtime.shutdown().await;
    }
}
