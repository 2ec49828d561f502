use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::flag::{join_with_timeout, Flag};
use crate::gpio::{Edge, Level};
use crate::sysfs::SysfsPin;

/// Cadence of the `event_detected` triggered-flag poll: 10 checks per second.
const DETECT_POLL: Duration = Duration::from_millis(100);
/// How long a gated worker sleeps before re-checking the interrupt gate.
const GATE_POLL: Duration = Duration::from_millis(100);
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback invoked with the kernel GPIO number after a confirmed edge.
pub type Callback = Box<dyn Fn(u32) + Send + 'static>;

/// Picks the two polarity levels for an edge mode: the level to await first
/// and the target level confirming the transition.
///
/// For `Both` the current value is sampled once, here; if the level changes
/// before the first poll, that first transition may be missed.
fn polarity(edge: Edge, pin: &SysfsPin) -> Result<(Level, Level)> {
    Ok(match edge {
        Edge::Rising => (Level::Low, Level::High),
        Edge::Falling => (Level::High, Level::Low),
        Edge::Both => {
            let current = pin.value()?;
            (current, !current)
        }
    })
}

struct WatchShared {
    pin: Arc<SysfsPin>,
    l1: Level,
    l2: Level,
    bounce: Duration,
    triggered: Flag,
    stop: Flag,
    /// The registry's global interrupt gate, shared by every watcher.
    interrupts: Arc<Flag>,
    callbacks: Mutex<Vec<Callback>>,
    fault: Mutex<Option<Error>>,
}

impl WatchShared {
    /// Busy-polls until the value equals `target`. Returns false if the stop
    /// flag was raised. Polling pauses while the global gate is cleared; the
    /// lack of a sleep between value reads trades CPU for latency.
    fn poll_level(&self, target: Level) -> Result<bool> {
        loop {
            if self.stop.is_set() {
                return Ok(false);
            }
            if !self.interrupts.is_set() {
                self.interrupts.wait_timeout(GATE_POLL);
                continue;
            }
            if self.pin.value()? == target {
                return Ok(true);
            }
        }
    }

    /// One l1 -> l2 -> debounce-confirm round. Returns whether a confirmed
    /// edge was seen; a transition that reverts before the bounce time
    /// elapses is suppressed.
    fn watch_one(&self) -> Result<bool> {
        if !self.poll_level(self.l1)? {
            return Ok(false);
        }
        if !self.poll_level(self.l2)? {
            return Ok(false);
        }
        thread::sleep(self.bounce);
        Ok(self.pin.value()? == self.l2)
    }
}

fn worker(shared: Arc<WatchShared>) {
    let pin = shared.pin.pin();
    debug!("pin {pin}: edge worker started");

    while !shared.stop.is_set() {
        match shared.watch_one() {
            Ok(true) => {
                shared.triggered.set();
                for callback in shared.callbacks.lock().iter() {
                    callback(pin);
                }
            }
            Ok(false) => {}
            // A concurrent writer can expose a half-written value attribute;
            // retry such reads instead of treating them as fatal.
            Err(Error::InvalidValue(_)) => {}
            Err(err) => {
                error!("pin {pin}: edge worker stopping: {err}");
                *shared.fault.lock() = Some(err);
                break;
            }
        }
    }

    debug!("pin {pin}: edge worker exited");
}

/// A soft-interrupt watcher: one background worker polling a pin's value for
/// edge transitions, debouncing them and invoking registered callbacks.
pub struct EdgeWatcher {
    shared: Arc<WatchShared>,
    edge: Edge,
    worker: Option<JoinHandle<()>>,
}

impl EdgeWatcher {
    /// Forces the pin's direction to input (overriding any pull-up/pull-down
    /// emulation mode it was set up with) and spawns the polling worker.
    pub(crate) fn spawn(
        pin: Arc<SysfsPin>,
        edge: Edge,
        bounce: Duration,
        callbacks: Vec<Callback>,
        interrupts: Arc<Flag>,
    ) -> Result<EdgeWatcher> {
        if pin.direction()? != "in" {
            pin.set_direction("in")?;
        }
        let (l1, l2) = polarity(edge, &pin)?;

        let number = pin.pin();
        let shared = Arc::new(WatchShared {
            pin,
            l1,
            l2,
            bounce,
            triggered: Flag::new(false),
            stop: Flag::new(false),
            interrupts,
            callbacks: Mutex::new(callbacks),
            fault: Mutex::new(None),
        });

        let worker = thread::Builder::new()
            .name(format!("edge-{number}"))
            .spawn({
                let shared = shared.clone();
                move || worker(shared)
            })
            .map_err(|e| Error::Io {
                pin: number,
                what: "spawn edge worker".to_string(),
                source: e,
            })?;

        Ok(EdgeWatcher {
            shared,
            edge,
            worker: Some(worker),
        })
    }

    pub(crate) fn edge(&self) -> Edge {
        self.edge
    }

    pub(crate) fn add_callback(&self, callback: Callback) {
        self.shared.callbacks.lock().push(callback);
    }

    /// Polls the triggered flag at a fixed cadence until it is set or the
    /// timeout elapses (`None` waits forever). Consumes the flag on success:
    /// a second immediate call without a new edge times out.
    pub(crate) fn event_detected(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        while !self.shared.triggered.is_set() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            thread::sleep(DETECT_POLL);
        }
        self.shared.triggered.clear();
        true
    }

    pub(crate) fn take_fault(&self) -> Option<Error> {
        self.shared.fault.lock().take()
    }

    /// Signals the worker to stop, clears the triggered flag and joins the
    /// thread with a bounded timeout.
    pub(crate) fn detach(mut self) {
        self.shared.stop.set();
        self.shared.triggered.clear();
        if let Some(worker) = self.worker.take() {
            join_with_timeout("edge", worker, JOIN_TIMEOUT);
        }
    }
}

impl Drop for EdgeWatcher {
    fn drop(&mut self) {
        self.shared.stop.set();
        if let Some(worker) = self.worker.take() {
            join_with_timeout("edge", worker, JOIN_TIMEOUT);
        }
    }
}

/// Synchronous, watcher-independent edge wait: directly polls the pin's value
/// for the l1 -> l2 sequence with the same polarity rules as a watcher.
/// Returns whether the edge arrived before the deadline (`None` waits
/// forever). No debounce is applied.
pub(crate) fn wait_for_edge(
    pin: &SysfsPin,
    edge: Edge,
    timeout: Option<Duration>,
) -> Result<bool> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let (l1, l2) = polarity(edge, pin)?;

    for target in [l1, l2] {
        while pin.value()? != target {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
        }
    }

    Ok(true)
}
