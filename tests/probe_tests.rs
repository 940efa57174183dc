use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use utilbox_rs::{
    check_multiple_ports, find_available_port, is_port_available, is_port_in_use, wait_for_port,
    BatchOptions, ErrorKind, FindPortOptions, PortState, ProbeOptions, Result, WaitOptions,
};

fn loopback() -> ProbeOptions {
    ProbeOptions::new().host("127.0.0.1").timeout_ms(500)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn available_is_negation_of_in_use() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let busy = listener.local_addr().unwrap().port();
    let free = closed_port().await;

    for port in [busy, free] {
        let in_use = is_port_in_use(port, &loopback()).await.unwrap();
        let available = is_port_available(port, &loopback()).await.unwrap();
        assert_eq!(available, !in_use, "port {port}");
    }
    assert!(is_port_in_use(busy, &loopback()).await.unwrap());
}

#[tokio::test]
async fn find_skips_listening_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let busy = listener.local_addr().unwrap().port();
    let end = busy.saturating_add(50);

    let opts = FindPortOptions::new().probe(loopback()).range(busy, end);
    let port = find_available_port(&opts).await.unwrap();
    assert!(port > busy && port <= end);
}

#[tokio::test]
async fn find_with_single_try_on_busy_port_is_exhausted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let busy = listener.local_addr().unwrap().port();

    let opts = FindPortOptions::new()
        .probe(loopback())
        .range(busy, busy.saturating_add(2))
        .max_tries(1);
    let err = find_available_port(&opts).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exhausted);
}

#[tokio::test]
async fn find_rejects_inverted_range() {
    let opts = FindPortOptions::new().range(100, 50);
    let err = find_available_port(&opts).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn batch_maps_each_distinct_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let busy = listener.local_addr().unwrap().port();
    let free = closed_port().await;

    let opts = BatchOptions::new().probe(loopback());
    let map = check_multiple_ports(&[busy, free, busy], &opts).await.unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&busy), Some(&false));
    assert_eq!(map.get(&free), Some(&true));
}

#[tokio::test]
async fn wait_until_listener_appears() {
    let port = closed_port().await;
    let holder = tokio::spawn(async move {
        time::sleep(Duration::from_millis(200)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        time::sleep(Duration::from_secs(5)).await;
        drop(listener);
    });

    let opts = WaitOptions::new()
        .probe(loopback())
        .poll_interval(Duration::from_millis(50))
        .overall_timeout(Duration::from_secs(5));
    wait_for_port(port, PortState::InUse, &opts).await.unwrap();
    holder.abort();
}

#[tokio::test]
async fn wait_until_listener_goes_away() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(200)).await;
        drop(listener);
    });

    let opts = WaitOptions::new()
        .probe(loopback())
        .poll_interval(Duration::from_millis(50))
        .overall_timeout(Duration::from_secs(5));
    wait_for_port(port, PortState::Available, &opts).await.unwrap();
}

#[tokio::test]
async fn wait_times_out_against_held_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let opts = WaitOptions::new()
        .probe(loopback().timeout_ms(100))
        .poll_interval(Duration::from_millis(50))
        .overall_timeout(Duration::from_millis(300));
    let start = time::Instant::now();
    let err = wait_for_port(port, PortState::Available, &opts).await.unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= opts.overall_timeout);
    let slack = opts.poll_interval + opts.probe.timeout + Duration::from_millis(200);
    assert!(elapsed <= opts.overall_timeout + slack);
    drop(listener);
}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// Poll `fut` once on the current thread with no runtime installed.
fn poll_once<T>(fut: impl Future<Output = Result<T>>) -> Poll<Result<T>> {
    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    pin!(fut).poll(&mut cx)
}

fn environment_error<T>(poll: Poll<Result<T>>) -> ErrorKind {
    match poll {
        Poll::Ready(Err(e)) => e.kind(),
        Poll::Ready(Ok(_)) => panic!("operation succeeded without a runtime"),
        Poll::Pending => panic!("operation did not fail on first poll"),
    }
}

#[test]
fn network_operations_need_a_runtime() {
    let probe = loopback();
    let find = FindPortOptions::new().probe(loopback());
    let batch = BatchOptions::new().probe(loopback());
    let wait = WaitOptions::new().probe(loopback());

    assert_eq!(environment_error(poll_once(is_port_in_use(80, &probe))), ErrorKind::Environment);
    assert_eq!(
        environment_error(poll_once(is_port_available(80, &probe))),
        ErrorKind::Environment
    );
    assert_eq!(environment_error(poll_once(find_available_port(&find))), ErrorKind::Environment);
    assert_eq!(
        environment_error(poll_once(check_multiple_ports(&[80, 443], &batch))),
        ErrorKind::Environment
    );
    assert_eq!(
        environment_error(poll_once(wait_for_port(80, PortState::InUse, &wait))),
        ErrorKind::Environment
    );
}
