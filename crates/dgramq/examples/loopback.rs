//! Loopback between two datagram queues on one machine.
//!
//! One thread submits datagrams to queue `a`. A stand-in packet assembler
//! peeks them, "transmits" each payload straight into queue `b`, and
//! acknowledges it. The main thread receives from `b`.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use dgramq::{Cancellation, DatagramError, DatagramFrame, DatagramQueue};

#[derive(Debug)]
struct Done;

impl std::fmt::Display for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "example finished")
    }
}

impl std::error::Error for Done {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The notifier only flags work for the assembler thread.
    let ready = Arc::new((Mutex::new(false), Condvar::new()));
    let a = {
        let ready = Arc::clone(&ready);
        DatagramQueue::new(move || {
            let (flag, cond) = &*ready;
            *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
            cond.notify_one();
        })
    };
    let b = DatagramQueue::new(|| {});

    let assembler = {
        let (a, b, ready) = (a.clone(), b.clone(), Arc::clone(&ready));
        thread::spawn(move || {
            while !a.is_closed() {
                match a.peek() {
                    Some(frame) => {
                        b.deliver(&frame.data);
                        a.acknowledge(Ok(()));
                    }
                    None => {
                        let (flag, cond) = &*ready;
                        let mut pending = flag.lock().unwrap_or_else(|e| e.into_inner());
                        if !*pending {
                            pending = cond
                                .wait_timeout(pending, Duration::from_millis(50))
                                .unwrap_or_else(|e| e.into_inner())
                                .0;
                        }
                        *pending = false;
                    }
                }
            }
        })
    };

    let sender = {
        let a = a.clone();
        thread::spawn(move || -> Result<(), DatagramError> {
            for i in 0..5 {
                a.submit(DatagramFrame::from(format!("datagram {i}").into_bytes()))?;
                eprintln!("sent datagram {i}");
            }
            Ok(())
        })
    };

    for _ in 0..5 {
        let data = b.receive(&Cancellation::timeout(Duration::from_secs(2)))?;
        println!("received: {}", String::from_utf8_lossy(&data));
    }

    sender
        .join()
        .map_err(|_| "sender thread panicked")??;
    a.close(Done);
    b.close(Done);
    assembler
        .join()
        .map_err(|_| "assembler thread panicked")?;
    Ok(())
}
