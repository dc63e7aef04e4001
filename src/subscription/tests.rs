use super::Subscription;
use crate::broker::Command;
use crate::utils::{DispatchError, RunError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_subscription_runs_callback() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cmd = Command::new("t1", move |payload: String| {
        tx.send(payload).unwrap();
        Ok(())
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();
    assert_eq!(sub.reference(), "r1");
    assert!(sub.is_active());

    sub.send("fakedata".to_string());
    let got = timeout(WAIT, rx.recv()).await.unwrap();
    assert_eq!(got.as_deref(), Some("fakedata"));
}

#[tokio::test]
async fn test_stop_fires_post_run_once_with_none() {
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new("t1", |_: u32| Ok(())).with_post_run(move |err| {
        done_tx.send(err).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();

    assert!(sub.stop());
    assert!(!sub.stop());
    let err = timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert_eq!(err, None);
    assert!(!sub.is_active());
}

#[tokio::test]
async fn test_run_error_is_reported_to_post_run() {
    let (ran_tx, mut ran_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new("t1", move |n: u32| {
        ran_tx.send(n).unwrap();
        if n == 2 {
            return Err("bad payload".into());
        }
        Ok(())
    })
    .with_post_run(move |err| {
        done_tx.send(err).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();

    sub.send(2);
    assert_eq!(timeout(WAIT, ran_rx.recv()).await.unwrap(), Some(2));
    // a failing run does not end the subscription
    sub.send(3);
    assert_eq!(timeout(WAIT, ran_rx.recv()).await.unwrap(), Some(3));
    assert!(sub.is_active());

    sub.stop();
    let err = timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert_eq!(
        err,
        Some(DispatchError::Run {
            error: "bad payload".to_string()
        })
    );
}

#[tokio::test]
async fn test_panicking_run_is_contained() {
    let (ran_tx, mut ran_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new("t1", move |n: u32| {
        if n == 0 {
            panic!("boom");
        }
        ran_tx.send(n).unwrap();
        Ok(())
    })
    .with_post_run(move |err| {
        done_tx.send(err).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();

    sub.send(0);
    // deliveries race each other; let the panicking one finish first
    tokio::time::sleep(Duration::from_millis(50)).await;
    sub.send(7);
    assert_eq!(timeout(WAIT, ran_rx.recv()).await.unwrap(), Some(7));

    sub.stop();
    let err = timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert_eq!(
        err,
        Some(DispatchError::Panicked {
            info: "boom".to_string()
        })
    );
}

#[tokio::test]
async fn test_slow_consumer_reports_unresponsive() {
    let budget = Duration::from_millis(50);
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new_async("t1", |_: u32| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<(), RunError>(())
    })
    .with_post_run(move |err| {
        done_tx.send(err).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, budget).unwrap();

    // the first payload occupies run; nobody takes the second one
    sub.send(1);
    sub.send(2);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!sub.is_active());

    // post_run waits for the in-flight run to return
    let err = timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert_eq!(err, Some(DispatchError::Unresponsive { timeout: budget }));
}

#[tokio::test]
async fn test_no_run_after_stop() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_run = seen.clone();
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new("t1", move |n: u32| {
        seen_in_run.lock().unwrap().push(n);
        Ok(())
    })
    .with_post_run(move |_| {
        done_tx.send(()).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();

    sub.stop();
    sub.send(1);
    timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_payload_queued_before_stop_is_not_run() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_run = seen.clone();
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new_async("t1", move |n: u32| {
        let seen = seen_in_run.clone();
        async move {
            seen.lock().unwrap().push(n);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<(), RunError>(())
        }
    })
    .with_post_run(move |_| {
        done_tx.send(()).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();

    sub.send(1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    // 1 is running, 2 waits in the output stream
    sub.send(2);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sub.stop());

    timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_dropped_subscription_terminates_dispatch() {
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Command::new("t1", |_: u32| Ok(())).with_post_run(move |err| {
        done_tx.send(err).unwrap();
    });
    let sub = Subscription::start("r1".to_string(), cmd, WAIT).unwrap();

    // never stopped: releasing the last handle is enough to end the loop
    drop(sub);
    let err = timeout(WAIT, done_rx).await.unwrap().unwrap();
    assert_eq!(err, None);
}
