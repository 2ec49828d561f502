use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::flag::{join_with_timeout, Flag};
use crate::gpio::Level;
use crate::sysfs::SysfsPin;

const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Derived half-cycle timings for one PWM channel.
///
/// Retuning frequency or duty cycle only rewrites these fields; the worker
/// snapshots them at the top of each cycle, so an in-progress half-cycle
/// sleep is never cut short.
struct PwmTiming {
    frequency: f64,
    duty_cycle: f64,
    period: Duration,
    high_time: Duration,
    low_time: Duration,
}

impl PwmTiming {
    fn new(frequency: f64) -> Result<PwmTiming> {
        let mut timing = PwmTiming {
            frequency: 0.0,
            duty_cycle: 0.0,
            period: Duration::ZERO,
            high_time: Duration::ZERO,
            low_time: Duration::ZERO,
        };
        timing.set_frequency(frequency)?;
        Ok(timing)
    }

    fn set_frequency(&mut self, frequency: f64) -> Result<()> {
        if !(frequency > 0.0) {
            return Err(Error::InvalidFrequency(frequency));
        }
        self.frequency = frequency;
        self.period = Duration::from_secs_f64(1.0 / frequency);
        self.recompute();
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&duty_cycle) {
            return Err(Error::InvalidDutyCycle(duty_cycle));
        }
        self.duty_cycle = duty_cycle;
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        self.high_time = self.period.mul_f64(self.duty_cycle / 100.0);
        self.low_time = self.period - self.high_time;
    }
}

struct PwmShared {
    pin: Arc<SysfsPin>,
    timing: Mutex<PwmTiming>,
    /// Set while the channel is running; cleared to pause the worker.
    run: Flag,
    stop: Flag,
    fault: Mutex<Option<Error>>,
}

impl PwmShared {
    fn shutdown(&self) {
        self.stop.set();
        // Wake a paused worker so it can observe the stop flag.
        self.run.set();
    }
}

fn worker(shared: Arc<PwmShared>) {
    let pin = shared.pin.pin();
    debug!("pin {pin}: pwm worker started");

    loop {
        if shared.stop.is_set() {
            break;
        }
        shared.run.wait();
        if shared.stop.is_set() {
            break;
        }

        let (high_time, low_time) = {
            let timing = shared.timing.lock();
            (timing.high_time, timing.low_time)
        };

        let cycle = shared.pin.set_value(Level::High).and_then(|()| {
            thread::sleep(high_time);
            shared.pin.set_value(Level::Low)
        });
        match cycle {
            Ok(()) => thread::sleep(low_time),
            Err(err) => {
                error!("pin {pin}: pwm worker stopping: {err}");
                *shared.fault.lock() = Some(err);
                // Reflect the self-stop in the state is_stopped() reports.
                shared.stop.set();
                break;
            }
        }
    }

    debug!("pin {pin}: pwm worker exited");
}

/// A software PWM channel owned by the registry. User code controls it
/// through the cloneable [`PwmHandle`] returned by
/// [`crate::gpio::Gpio::pwm`].
pub struct SoftPwm {
    shared: Arc<PwmShared>,
    worker: Option<JoinHandle<()>>,
}

impl SoftPwm {
    /// Spawns the toggle worker; the channel starts out paused.
    pub(crate) fn spawn(pin: Arc<SysfsPin>, frequency: f64) -> Result<SoftPwm> {
        let number = pin.pin();
        let shared = Arc::new(PwmShared {
            pin,
            timing: Mutex::new(PwmTiming::new(frequency)?),
            run: Flag::new(false),
            stop: Flag::new(false),
            fault: Mutex::new(None),
        });

        let worker = thread::Builder::new()
            .name(format!("pwm-{number}"))
            .spawn({
                let shared = shared.clone();
                move || worker(shared)
            })
            .map_err(|e| Error::Io {
                pin: number,
                what: "spawn pwm worker".to_string(),
                source: e,
            })?;

        Ok(SoftPwm {
            shared,
            worker: Some(worker),
        })
    }

    pub(crate) fn handle(&self) -> PwmHandle {
        PwmHandle {
            shared: self.shared.clone(),
        }
    }

    /// Terminal teardown: signals the worker and joins it with a bounded
    /// timeout.
    pub(crate) fn clear(mut self) {
        self.shared.shutdown();
        if let Some(worker) = self.worker.take() {
            join_with_timeout("pwm", worker, JOIN_TIMEOUT);
        }
    }
}

impl Drop for SoftPwm {
    fn drop(&mut self) {
        self.shared.shutdown();
        if let Some(worker) = self.worker.take() {
            join_with_timeout("pwm", worker, JOIN_TIMEOUT);
        }
    }
}

/// Control handle for a software PWM channel.
///
/// The channel cycles through idle (constructed), running, paused and
/// stopped. [`start`](PwmHandle::start) and [`stop`](PwmHandle::stop) move
/// between running and paused; [`clear`](PwmHandle::clear) is terminal.
#[derive(Clone)]
pub struct PwmHandle {
    shared: Arc<PwmShared>,
}

impl PwmHandle {
    /// Sets the duty cycle and starts (or resumes) toggling.
    pub fn start(&self, duty_cycle: f64) -> Result<()> {
        self.shared.timing.lock().set_duty_cycle(duty_cycle)?;
        self.shared.run.set();
        Ok(())
    }

    /// Pauses toggling; the worker stays alive and idles.
    pub fn stop(&self) {
        self.shared.run.clear();
    }

    /// Retunes the frequency, keeping the current duty cycle. Takes effect at
    /// the next full cycle.
    pub fn change_frequency(&self, frequency: f64) -> Result<()> {
        self.shared.timing.lock().set_frequency(frequency)
    }

    /// Retunes the duty cycle, keeping the current period. Takes effect at
    /// the next full cycle.
    pub fn change_duty_cycle(&self, duty_cycle: f64) -> Result<()> {
        self.shared.timing.lock().set_duty_cycle(duty_cycle)
    }

    pub fn frequency(&self) -> f64 {
        self.shared.timing.lock().frequency
    }

    pub fn duty_cycle(&self) -> f64 {
        self.shared.timing.lock().duty_cycle
    }

    /// Signals the worker to exit. Terminal; the registry joins the thread on
    /// cleanup.
    pub fn clear(&self) {
        self.shared.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_set()
    }

    /// Takes the error that stopped the worker, if any. A worker that hits a
    /// sysfs I/O failure stops itself and parks the error here instead of
    /// panicking.
    pub fn take_fault(&self) -> Option<Error> {
        self.shared.fault.lock().take()
    }
}

impl fmt::Debug for PwmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timing = self.shared.timing.lock();
        f.debug_struct("PwmHandle")
            .field("frequency", &timing.frequency)
            .field("duty_cycle", &timing.duty_cycle)
            .finish()
    }
}
