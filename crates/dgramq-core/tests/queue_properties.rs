use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dgramq_core::{
    CancelToken, Cancellation, CloseReason, DatagramError, DatagramFrame, DatagramQueue,
    QueueConfig,
};

#[derive(Debug, thiserror::Error)]
#[error("application closed the connection")]
struct AppClose;

fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "timed out: {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn outbound_messages_resolve_in_submission_order() {
    let queue = DatagramQueue::new(|| {});
    let resolved = Arc::new(std::sync::Mutex::new(Vec::new()));

    let senders: Vec<_> = (0..4u8)
        .map(|id| {
            let queue = queue.clone();
            let resolved = Arc::clone(&resolved);
            thread::spawn(move || {
                queue.submit(vec![id]).unwrap();
                resolved.lock().unwrap().push(id);
            })
        })
        .collect();

    let mut peeked = Vec::new();
    wait_until(
        || {
            let resolved_count = resolved.lock().unwrap().len();
            // Wait for the previous submitter to return before serving the next one.
            if resolved_count == peeked.len() {
                if let Some(frame) = queue.peek() {
                    assert_eq!(queue.peek(), Some(frame.clone()));
                    peeked.push(frame.data[0]);
                    queue.acknowledge(Ok(()));
                }
            }
            resolved_count == 4
        },
        "all datagrams resolved",
    );

    for sender in senders {
        sender.join().unwrap();
    }

    let unique: HashSet<_> = peeked.iter().copied().collect();
    assert_eq!(unique.len(), 4, "no datagram may be peeked twice");
    assert_eq!(*resolved.lock().unwrap(), peeked);
}

#[test]
fn expired_message_reports_to_submitter() {
    let timeout = Duration::from_millis(25);
    let queue = DatagramQueue::with_config(
        || {},
        QueueConfig::default().with_send_timeout(Some(timeout)),
    )
    .unwrap();

    let submitter = {
        let queue = queue.clone();
        thread::spawn(move || queue.submit(DatagramFrame::from_static(b"late")))
    };
    wait_until(|| queue.outbound().is_pending(), "datagram queued");
    thread::sleep(timeout + Duration::from_millis(25));

    assert!(queue.peek().is_none());
    assert!(matches!(
        submitter.join().unwrap(),
        Err(DatagramError::Expired)
    ));

    // The slot is free again for the next datagram.
    let next = {
        let queue = queue.clone();
        thread::spawn(move || queue.submit(DatagramFrame::from_static(b"fresh")))
    };
    wait_until(|| queue.outbound().is_pending(), "next datagram queued");
    assert_eq!(queue.peek().unwrap().data.as_ref(), b"fresh");
    queue.acknowledge(Ok(()));
    next.join().unwrap().unwrap();
}

#[test]
fn bounded_inbound_keeps_first_arrivals() {
    let queue =
        DatagramQueue::with_config(|| {}, QueueConfig::default().with_receive_capacity(5))
            .unwrap();

    for i in 0..7u8 {
        queue.deliver(format!("datagram-{i}").as_bytes());
    }
    assert_eq!(queue.inbound().dropped(), 2);

    for i in 0..5u8 {
        let data = queue.receive(&Cancellation::never()).unwrap();
        assert_eq!(data, Bytes::from(format!("datagram-{i}")));
    }

    let sixth = {
        let queue = queue.clone();
        thread::spawn(move || queue.receive(&Cancellation::timeout(Duration::from_millis(50))))
    };
    assert!(matches!(
        sixth.join().unwrap(),
        Err(DatagramError::DeadlineExceeded)
    ));
}

#[test]
fn concurrent_receivers_split_deliveries_without_loss() {
    const TOTAL: usize = 2_000;
    const RECEIVERS: usize = 4;

    let queue =
        DatagramQueue::with_config(|| {}, QueueConfig::default().with_receive_capacity(TOTAL))
            .unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(RECEIVERS + 1));

    let receivers: Vec<_> = (0..RECEIVERS)
        .map(|_| {
            let queue = queue.clone();
            let received = Arc::clone(&received);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut got = Vec::new();
                loop {
                    match queue.receive(&Cancellation::never()) {
                        Ok(data) => {
                            got.push(u32::from_be_bytes(data.as_ref().try_into().unwrap()));
                            received.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => {
                            assert!(err.is_closed());
                            return got;
                        }
                    }
                }
            })
        })
        .collect();

    start.wait();
    for seq in 0..TOTAL as u32 {
        queue.deliver(&seq.to_be_bytes());
    }
    wait_until(
        || received.load(Ordering::SeqCst) == TOTAL,
        "all datagrams received",
    );
    queue.close(AppClose);

    let mut all = Vec::with_capacity(TOTAL);
    for receiver in receivers {
        let got = receiver.join().unwrap();
        assert!(
            got.windows(2).all(|pair| pair[0] < pair[1]),
            "each receiver must observe arrival order"
        );
        all.extend(got);
    }
    all.sort_unstable();
    assert_eq!(all, (0..TOTAL as u32).collect::<Vec<_>>());
    assert_eq!(queue.inbound().dropped(), 0);
}

#[test]
fn close_wakes_every_blocked_party_with_the_same_error() {
    let queue = DatagramQueue::new(|| {});

    let in_flight = {
        let queue = queue.clone();
        thread::spawn(move || queue.submit(DatagramFrame::from_static(b"first")))
    };
    wait_until(|| queue.outbound().is_pending(), "first datagram queued");

    let waiting_for_slot = {
        let queue = queue.clone();
        thread::spawn(move || queue.submit(DatagramFrame::from_static(b"second")))
    };
    let receivers: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || queue.receive(&Cancellation::never()))
        })
        .collect();
    thread::sleep(Duration::from_millis(30));

    let reason: CloseReason = Arc::new(AppClose);
    assert!(queue.close_with(reason.clone()));

    let mut errors = vec![
        in_flight.join().unwrap().unwrap_err(),
        waiting_for_slot.join().unwrap().unwrap_err(),
    ];
    errors.extend(
        receivers
            .into_iter()
            .map(|receiver| receiver.join().unwrap().unwrap_err()),
    );

    // Later calls fail fast with the same error.
    errors.push(
        queue
            .submit(DatagramFrame::from_static(b"after"))
            .unwrap_err(),
    );
    errors.push(queue.receive(&Cancellation::never()).unwrap_err());

    for err in errors {
        assert!(Arc::ptr_eq(err.close_reason().unwrap(), &reason));
    }
}

#[test]
fn cancellation_does_not_disturb_other_receivers() {
    let queue = DatagramQueue::new(|| {});
    let token = CancelToken::new();

    let cancelled = {
        let queue = queue.clone();
        let cancel = Cancellation::token(token.clone());
        thread::spawn(move || queue.receive(&cancel))
    };
    let patient = {
        let queue = queue.clone();
        thread::spawn(move || queue.receive(&Cancellation::timeout(Duration::from_secs(5))))
    };

    thread::sleep(Duration::from_millis(30));
    token.cancel();
    assert!(matches!(
        cancelled.join().unwrap(),
        Err(DatagramError::Cancelled)
    ));

    queue.deliver(b"for the patient one");
    assert_eq!(
        patient.join().unwrap().unwrap().as_ref(),
        b"for the patient one"
    );
}

#[test]
fn peek_without_pending_message_has_no_side_effects() {
    let notified = Arc::new(AtomicUsize::new(0));
    let queue = {
        let notified = Arc::clone(&notified);
        DatagramQueue::new(move || {
            notified.fetch_add(1, Ordering::SeqCst);
        })
    };

    let start = Instant::now();
    for _ in 0..1_000 {
        assert!(queue.peek().is_none());
    }
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!queue.outbound().is_pending());
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[test]
fn waiting_for_the_slot_counts_toward_expiry() {
    let queue = DatagramQueue::new(|| {});

    let first = {
        let queue = queue.clone();
        thread::spawn(move || queue.submit(DatagramFrame::from_static(b"first")))
    };
    wait_until(|| queue.outbound().is_pending(), "first datagram queued");

    let second = {
        let queue = queue.clone();
        thread::spawn(move || {
            queue.submit_with_timeout(
                DatagramFrame::from_static(b"second"),
                Some(Duration::from_millis(40)),
            )
        })
    };
    // Second submitter sits behind the first for longer than its timeout.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(queue.peek().unwrap().data.as_ref(), b"first");
    queue.acknowledge(Ok(()));
    first.join().unwrap().unwrap();

    wait_until(|| queue.outbound().is_pending(), "second datagram queued");
    assert!(queue.peek().is_none());
    assert!(matches!(
        second.join().unwrap(),
        Err(DatagramError::Expired)
    ));
    assert!(!queue.outbound().is_pending());
}

#[test]
fn notifier_may_serve_the_datagram_itself() {
    let handle: Arc<OnceLock<DatagramQueue>> = Arc::new(OnceLock::new());
    let served = Arc::new(std::sync::Mutex::new(Vec::new()));
    let queue = {
        let handle = Arc::clone(&handle);
        let served = Arc::clone(&served);
        DatagramQueue::new(move || {
            let Some(queue) = handle.get() else {
                return;
            };
            if let Some(frame) = queue.peek() {
                served.lock().unwrap().push(frame.data);
                queue.acknowledge(Ok(()));
            }
        })
    };
    assert!(handle.set(queue.clone()).is_ok());

    let (done_tx, done_rx) = mpsc::channel();
    {
        let queue = queue.clone();
        thread::spawn(move || {
            let outcome = queue.submit(DatagramFrame::from_static(b"inline"));
            done_tx.send(outcome).unwrap();
        });
    }

    let outcome = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("submit must not deadlock when the notifier peeks");
    outcome.unwrap();
    assert_eq!(*served.lock().unwrap(), vec![Bytes::from_static(b"inline")]);
    assert!(!queue.outbound().is_pending());
}
