use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dgramq_core::{
    Cancellation, DatagramError, DatagramFrame, DatagramQueue, QueueConfig, DEFAULT_MAX_PAYLOAD,
};
use tracing::{debug, info, warn};

use crate::cmd::{parse_optional_duration, SimulateArgs};
use crate::exit::{queue_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS, USAGE};
use crate::output::{print_report, OutputFormat, SimulationReport};

/// Sender id (4 bytes) + sequence number (4 bytes).
const HEADER_LEN: usize = 8;
const PADDING_BYTE: u8 = 0xAB;
/// Upper bound on how long the idle assembler sleeps between notifications.
const ASSEMBLER_IDLE_POLL: Duration = Duration::from_millis(50);

/// Terminal error used to close the simulated connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Finished,
    Interrupted,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shutdown::Finished => write!(f, "simulation finished"),
            Shutdown::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for Shutdown {}

#[derive(Debug, Clone)]
struct Plan {
    senders: usize,
    messages: usize,
    receivers: usize,
    capacity: usize,
    payload_size: usize,
    send_timeout: Option<Duration>,
    pack_delay: Option<Duration>,
    receive_delay: Option<Duration>,
}

impl Plan {
    fn from_args(args: &SimulateArgs) -> CliResult<Self> {
        if args.senders == 0 || args.receivers == 0 {
            return Err(CliError::new(
                USAGE,
                "--senders and --receivers must be at least 1",
            ));
        }
        if args.payload_size < HEADER_LEN {
            return Err(CliError::new(
                USAGE,
                format!("--payload-size must be at least {HEADER_LEN} bytes"),
            ));
        }
        if args.payload_size > DEFAULT_MAX_PAYLOAD {
            return Err(queue_error(
                "--payload-size",
                DatagramError::TooLarge {
                    size: args.payload_size,
                    max: DEFAULT_MAX_PAYLOAD,
                },
            ));
        }

        Ok(Self {
            senders: args.senders,
            messages: args.messages,
            receivers: args.receivers,
            capacity: args.capacity,
            payload_size: args.payload_size,
            send_timeout: parse_optional_duration(args.send_timeout.as_deref())?,
            pack_delay: parse_optional_duration(args.pack_delay.as_deref())?,
            receive_delay: parse_optional_duration(args.receive_delay.as_deref())?,
        })
    }

    /// Messages assigned to sender `index`; the remainder goes to the first senders.
    fn share_of(&self, index: usize) -> usize {
        self.messages / self.senders + usize::from(index < self.messages % self.senders)
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    acknowledged: AtomicU64,
    expired: AtomicU64,
    failed: AtomicU64,
    transmitted: AtomicU64,
    reordered: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Edge-triggered wakeup for the assembler, set by the send notifier.
#[derive(Default)]
struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    fn notify(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_one();
    }

    fn wait(&self, timeout: Duration) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !*pending {
            pending = self
                .cond
                .wait_timeout(pending, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *pending = false;
    }
}

/// The two ends of a loopback link: what the senders submit to and what the
/// receivers drain.
#[derive(Clone)]
struct Link {
    sending: DatagramQueue,
    receiving: DatagramQueue,
    wakeup: Arc<Wakeup>,
}

impl Link {
    fn new(plan: &Plan) -> CliResult<Self> {
        let wakeup = Arc::new(Wakeup::default());
        let sending = {
            let wakeup = Arc::clone(&wakeup);
            DatagramQueue::with_config(
                move || wakeup.notify(),
                QueueConfig::default().with_send_timeout(plan.send_timeout),
            )
            .map_err(|err| queue_error("invalid send settings", err))?
        };
        let receiving = DatagramQueue::with_config(
            || {},
            QueueConfig::default().with_receive_capacity(plan.capacity),
        )
        .map_err(|err| queue_error("invalid receive settings", err))?;

        Ok(Self {
            sending,
            receiving,
            wakeup,
        })
    }

    /// Stop the senders and the assembler. The receiving side is closed by
    /// [`execute`] once the assembler has exited, so every transmitted
    /// datagram is either received or counted as dropped.
    fn shutdown(&self, reason: Shutdown) {
        self.sending.close(reason);
        self.wakeup.notify();
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let plan = Plan::from_args(&args)?;
    let link = Link::new(&plan)?;
    let interrupted = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(link.clone(), Arc::clone(&interrupted))?;

    let mut report = execute(&plan, &link)?;
    report.interrupted = interrupted.load(Ordering::SeqCst);
    print_report(&report, format);

    if report.interrupted {
        Ok(INTERRUPTED)
    } else {
        Ok(SUCCESS)
    }
}

fn execute(plan: &Plan, link: &Link) -> CliResult<SimulationReport> {
    let counters = Arc::new(Counters::default());
    let started = Instant::now();
    info!(
        senders = plan.senders,
        receivers = plan.receivers,
        messages = plan.messages,
        capacity = plan.capacity,
        "starting simulation"
    );

    let receivers = (0..plan.receivers)
        .map(|index| spawn_receiver(index, plan, link, &counters))
        .collect::<CliResult<Vec<_>>>()?;
    let assembler = spawn_assembler(plan, link, &counters)?;
    let senders = (0..plan.senders)
        .map(|index| spawn_sender(index, plan, link, &counters))
        .collect::<CliResult<Vec<_>>>()?;

    for sender in senders {
        join(sender, "sender")?;
    }
    debug!("all senders finished");

    link.sending.close(Shutdown::Finished);
    link.wakeup.notify();
    join(assembler, "assembler")?;

    // Receivers drain whatever is still buffered before observing the close.
    link.receiving.close(Shutdown::Finished);
    let per_receiver = receivers
        .into_iter()
        .map(|receiver| join(receiver, "receiver"))
        .collect::<CliResult<Vec<_>>>()?;

    let report = SimulationReport {
        senders: plan.senders,
        receivers: plan.receivers,
        capacity: plan.capacity,
        submitted: counters.submitted.load(Ordering::Relaxed),
        acknowledged: counters.acknowledged.load(Ordering::Relaxed),
        expired: counters.expired.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
        transmitted: counters.transmitted.load(Ordering::Relaxed),
        dropped: link.receiving.inbound().dropped(),
        received: per_receiver.iter().sum(),
        per_receiver,
        reordered: counters.reordered.load(Ordering::Relaxed),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        interrupted: false,
    };
    info!(
        acknowledged = report.acknowledged,
        expired = report.expired,
        dropped = report.dropped,
        received = report.received,
        elapsed_ms = report.elapsed_ms,
        "simulation complete"
    );
    Ok(report)
}

fn spawn_sender(
    index: usize,
    plan: &Plan,
    link: &Link,
    counters: &Arc<Counters>,
) -> CliResult<JoinHandle<()>> {
    let count = plan.share_of(index);
    let payload_size = plan.payload_size;
    let queue = link.sending.clone();
    let counters = Arc::clone(counters);
    let sender_id = u32::try_from(index).unwrap_or(u32::MAX);

    spawn_named(format!("sender-{index}"), move || {
        for seq in 0..count {
            let seq = u32::try_from(seq).unwrap_or(u32::MAX);
            bump(&counters.submitted);
            match queue.submit(encode_payload(sender_id, seq, payload_size)) {
                Ok(()) => bump(&counters.acknowledged),
                Err(DatagramError::Expired) => bump(&counters.expired),
                Err(err) if err.is_closed() => {
                    bump(&counters.failed);
                    debug!(%err, "sender stopping");
                    return;
                }
                Err(err) => {
                    bump(&counters.failed);
                    warn!(%err, seq, "datagram submit failed");
                }
            }
        }
    })
}

fn spawn_assembler(
    plan: &Plan,
    link: &Link,
    counters: &Arc<Counters>,
) -> CliResult<JoinHandle<()>> {
    let pack_delay = plan.pack_delay;
    let link = link.clone();
    let counters = Arc::clone(counters);

    spawn_named("assembler".to_string(), move || {
        while !link.sending.is_closed() {
            if let Some(delay) = pack_delay {
                thread::sleep(delay);
            }
            match link.sending.peek() {
                Some(frame) => {
                    link.receiving.deliver(&frame.data);
                    link.sending.acknowledge(Ok(()));
                    bump(&counters.transmitted);
                }
                None => link.wakeup.wait(ASSEMBLER_IDLE_POLL),
            }
        }
        debug!("assembler stopping");
    })
}

fn spawn_receiver(
    index: usize,
    plan: &Plan,
    link: &Link,
    counters: &Arc<Counters>,
) -> CliResult<JoinHandle<u64>> {
    let receive_delay = plan.receive_delay;
    let queue = link.receiving.clone();
    let counters = Arc::clone(counters);

    spawn_named(format!("receiver-{index}"), move || {
        let mut received = 0u64;
        let mut last_seq: HashMap<u32, u32> = HashMap::new();
        loop {
            let data = match queue.receive(&Cancellation::never()) {
                Ok(data) => data,
                Err(err) => {
                    debug!(%err, received, "receiver stopping");
                    return received;
                }
            };
            received += 1;
            if let Some((sender, seq)) = decode_payload(&data) {
                if let Some(prev) = last_seq.insert(sender, seq) {
                    if seq <= prev {
                        bump(&counters.reordered);
                    }
                }
            }
            if let Some(delay) = receive_delay {
                thread::sleep(delay);
            }
        }
    })
}

fn spawn_named<T, F>(name: String, f: F) -> CliResult<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|err| CliError::new(INTERNAL, format!("failed to spawn {name}: {err}")))
}

fn join<T>(handle: JoinHandle<T>, role: &str) -> CliResult<T> {
    handle
        .join()
        .map_err(|_| CliError::new(INTERNAL, format!("{role} thread panicked")))
}

fn encode_payload(sender: u32, seq: u32, size: usize) -> DatagramFrame {
    let mut payload = Vec::with_capacity(size.max(HEADER_LEN));
    payload.extend_from_slice(&sender.to_be_bytes());
    payload.extend_from_slice(&seq.to_be_bytes());
    payload.resize(size.max(HEADER_LEN), PADDING_BYTE);
    DatagramFrame::from(payload)
}

fn decode_payload(data: &[u8]) -> Option<(u32, u32)> {
    let sender = u32::from_be_bytes(data.get(0..4)?.try_into().ok()?);
    let seq = u32::from_be_bytes(data.get(4..8)?.try_into().ok()?);
    Some((sender, seq))
}

fn install_ctrlc_handler(link: Link, interrupted: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
        link.shutdown(Shutdown::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
