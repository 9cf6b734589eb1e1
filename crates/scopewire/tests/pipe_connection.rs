//! End-to-end tests over in-memory pipe pairs, mirroring what a
//! supervisor and a stdio worker would exchange.

use serde::{Deserialize, Serialize};
use scopewire::peer::{Connection, HandlerResult};
use scopewire::transport::pipe_connection;
use scopewire::PeerError;

#[derive(Serialize, Deserialize)]
struct Add {
    a: i64,
    b: i64,
}

impl scopewire::ServiceRequest for Add {
    type Response = i64;
    const IDENTIFIER: &'static str = "com.scopewire.test.Add";
}

fn pipe_pair() -> (Connection, Connection) {
    let (a, b) = tokio::io::duplex(1024 * 1024);
    let (a_rd, a_wr) = tokio::io::split(a);
    let (b_rd, b_wr) = tokio::io::split(b);
    (pipe_connection(a_rd, a_wr), pipe_connection(b_rd, b_wr))
}

#[tokio::test]
async fn echo_over_a_pipe() {
    let (supervisor, worker) = pipe_pair();

    worker.set_handler("echo", |message: String| async move { Ok(message) });

    let echoed: String = supervisor.send_request("echo", "over the pipe").await.unwrap();
    assert_eq!(echoed, "over the pipe");

    supervisor.close().await;
    worker.close().await;
}

#[tokio::test]
async fn typed_service_requests() {
    let (supervisor, worker) = pipe_pair();

    worker.handle::<Add, _, _>(|req| async move { Ok(req.a + req.b) });

    let sum = supervisor.send(&Add { a: 40, b: 2 }).await.unwrap();
    assert_eq!(sum, 42);

    supervisor.close().await;
    worker.close().await;
}

#[tokio::test]
async fn both_directions_carry_independent_requests() {
    let (left, right) = pipe_pair();

    left.set_source_handler("whoami", || async move { Ok("left".to_string()) });
    right.set_source_handler("whoami", || async move { Ok("right".to_string()) });

    let from_right: String = left.send_request_empty("whoami").await.unwrap();
    let from_left: String = right.send_request_empty("whoami").await.unwrap();
    assert_eq!(from_right, "right");
    assert_eq!(from_left, "left");

    left.close().await;
    right.close().await;
}

#[tokio::test]
async fn half_megabyte_payload_over_a_pipe() {
    let (supervisor, worker) = pipe_pair();

    worker.set_handler("length", |message: String| async move {
        HandlerResult::Ok(message.len() as u64)
    });

    let message = "y".repeat(500 * 1024);
    let length: u64 = supervisor.send_request("length", &message).await.unwrap();
    assert_eq!(length, 500 * 1024);

    supervisor.close().await;
    worker.close().await;
}

#[tokio::test]
async fn handler_calls_back_through_the_same_pipe() {
    let (supervisor, worker) = pipe_pair();

    supervisor.set_source_handler("config", || async move { Ok(7_i64) });
    worker.set_source_handler("compute", {
        let worker = worker.clone();
        move || {
            let worker = worker.clone();
            async move {
                let config: i64 = worker.send_request_empty("config").await?;
                Ok(config * 6)
            }
        }
    });

    let result: i64 = supervisor.send_request_empty("compute").await.unwrap();
    assert_eq!(result, 42);

    supervisor.close().await;
    worker.close().await;
}

#[tokio::test]
async fn closing_one_end_closes_the_other() {
    let (supervisor, worker) = pipe_pair();

    supervisor.close().await;
    worker.closed().await;
    assert!(worker.state().is_terminal());

    let err = worker.send_notification("anything").await.unwrap_err();
    assert!(matches!(err, PeerError::NotConnected));
}
