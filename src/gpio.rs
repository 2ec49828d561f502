use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};
use crate::event::{self, Callback, EdgeWatcher};
use crate::flag::Flag;
use crate::numbering::{Direct, PinId, PinNumbering};
use crate::pwm::{PwmHandle, SoftPwm};
use crate::sysfs::{Attribute, SysfsPin};

static SYSFS_ROOT: &str = "/sys/class/gpio";

/// Logic level of a GPIO value attribute.
///
/// * `Low` - 0
/// * `High` - 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl Level {
    pub(crate) fn as_sysfs(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }

    pub(crate) fn from_sysfs(raw: &str) -> Result<Level> {
        match raw {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(Error::InvalidValue(other.to_string())),
        }
    }
}

impl From<bool> for Level {
    fn from(level: bool) -> Level {
        if level {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl std::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Requested pin state for [`Gpio::setup`].
///
/// `PullUp` and `PullDown` are emulation conveniences: they translate to
/// input direction plus a preset high/low level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    In,
    Out,
    PullUp,
    PullDown,
}

/// Edge selector for soft interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// Scalar-or-list adapter for values that broadcast across a pin list.
pub struct Args<T>(Vec<T>);

impl<T> From<T> for Args<T> {
    fn from(value: T) -> Args<T> {
        Args(vec![value])
    }
}

impl<T> From<Vec<T>> for Args<T> {
    fn from(values: Vec<T>) -> Args<T> {
        Args(values)
    }
}

/// Scalar-or-list adapter for pin identifiers.
pub struct Pins(Vec<PinId>);

impl From<u32> for Pins {
    fn from(pin: u32) -> Pins {
        Pins(vec![PinId::Number(pin)])
    }
}

impl From<&str> for Pins {
    fn from(pin: &str) -> Pins {
        Pins(vec![pin.into()])
    }
}

impl From<String> for Pins {
    fn from(pin: String) -> Pins {
        Pins(vec![pin.into()])
    }
}

impl From<PinId> for Pins {
    fn from(pin: PinId) -> Pins {
        Pins(vec![pin])
    }
}

impl From<Vec<u32>> for Pins {
    fn from(pins: Vec<u32>) -> Pins {
        Pins(pins.into_iter().map(PinId::Number).collect())
    }
}

impl From<Vec<&str>> for Pins {
    fn from(pins: Vec<&str>) -> Pins {
        Pins(pins.into_iter().map(PinId::from).collect())
    }
}

impl From<Vec<String>> for Pins {
    fn from(pins: Vec<String>) -> Pins {
        Pins(pins.into_iter().map(PinId::from).collect())
    }
}

impl From<Vec<PinId>> for Pins {
    fn from(pins: Vec<PinId>) -> Pins {
        Pins(pins)
    }
}

/// Pads a list to `len` by repeating its last element; longer lists are
/// truncated. A scalar argument therefore broadcasts across the pin list.
fn pad_to<T: Clone>(mut items: Vec<T>, len: usize) -> Vec<T> {
    if let Some(last) = items.last().cloned() {
        while items.len() < len {
            items.push(last.clone());
        }
    }
    items.truncate(len);
    items
}

/// The pin registry: maps pin identifiers to exported pin handles, software
/// PWM channels and edge watchers, and performs ordered teardown.
///
/// A registry is an explicit value owned by the caller; construct it once and
/// pass it by reference to every operation.
///
/// # Example
///
/// ```no_run
/// use sysgpio::{Gpio, Level, PinState};
///
/// let mut gpio = Gpio::new();
/// gpio.setup(vec![7, 11], PinState::Out, Some(Level::Low.into())).unwrap();
/// gpio.output(vec![7, 11], vec![Level::High, Level::Low]).unwrap();
/// gpio.cleanup_all().unwrap();
/// ```
pub struct Gpio {
    sysfs_root: PathBuf,
    numbering: Box<dyn PinNumbering>,
    pins: HashMap<u32, Arc<SysfsPin>>,
    pwms: HashMap<u32, SoftPwm>,
    watchers: HashMap<u32, EdgeWatcher>,
    /// Global interrupt gate shared by every edge watcher. Enabled at start.
    interrupts: Arc<Flag>,
}

impl Gpio {
    /// Creates a registry over `/sys/class/gpio` with the direct pin
    /// numbering.
    pub fn new() -> Gpio {
        Gpio::with_sysfs_root(SYSFS_ROOT)
    }

    /// Creates a registry over an alternate sysfs root. Intended for tests
    /// and containers that bind the GPIO class tree somewhere else.
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Gpio {
        Gpio {
            sysfs_root: root.into(),
            numbering: Box::new(Direct),
            pins: HashMap::new(),
            pwms: HashMap::new(),
            watchers: HashMap::new(),
            interrupts: Arc::new(Flag::new(true)),
        }
    }

    /// Swaps the pin naming capability, e.g. to [`crate::numbering::Sunxi`]
    /// or [`crate::numbering::BeagleBoneBlack`].
    pub fn set_mode(&mut self, numbering: impl PinNumbering + 'static) {
        self.numbering = Box::new(numbering);
    }

    /// Name of the currently configured pin numbering.
    pub fn mode(&self) -> &'static str {
        self.numbering.name()
    }

    fn resolve(&self, pin: &PinId) -> Result<u32> {
        self.numbering.resolve(pin)
    }

    fn registered(&self, number: u32) -> Result<&Arc<SysfsPin>> {
        self.pins.get(&number).ok_or(Error::NotSetup(number))
    }

    /// Sets up one or more pins with a direction and an optional initial
    /// level.
    ///
    /// Scalar states and initials broadcast across the pin list; shorter
    /// lists are padded by repeating their last element and longer lists are
    /// truncated, independently for each argument. Pins without a handle yet
    /// are exported on the spot.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sysgpio::{Gpio, Level, PinState};
    ///
    /// let mut gpio = Gpio::new();
    /// gpio.setup(vec![7, 11], PinState::Out, Some(Level::High.into())).unwrap();
    /// gpio.setup(13, PinState::PullUp, None).unwrap();
    /// ```
    pub fn setup<P, S>(&mut self, pins: P, states: S, initials: Option<Args<Level>>) -> Result<()>
    where
        P: Into<Pins>,
        S: Into<Args<PinState>>,
    {
        let ids = pins.into().0;
        let numbers = ids
            .iter()
            .map(|id| self.resolve(id))
            .collect::<Result<Vec<u32>>>()?;

        let states = states.into().0;
        if states.is_empty() {
            return Err(Error::InvalidState("empty state list".to_string()));
        }
        let states = pad_to(states, numbers.len());
        let initials: Vec<Option<Level>> = match initials {
            Some(args) if args.0.is_empty() => {
                return Err(Error::InvalidValue("empty initial level list".to_string()));
            }
            Some(args) => pad_to(args.0, numbers.len()).into_iter().map(Some).collect(),
            None => vec![None; numbers.len()],
        };

        for ((number, state), initial) in numbers.iter().zip(states).zip(initials) {
            self.setup_number(*number, state, initial)?;
        }

        Ok(())
    }

    /// Sets up a single pin by its resolved kernel number, bypassing the
    /// numbering capability.
    fn setup_number(&mut self, number: u32, state: PinState, initial: Option<Level>) -> Result<()> {
        let (direction, initial) = match state {
            PinState::PullUp => ("in", Some(Level::High)),
            PinState::PullDown => ("in", Some(Level::Low)),
            PinState::In => ("in", initial),
            PinState::Out => ("out", initial),
        };

        let pin = match self.pins.get(&number) {
            Some(pin) => pin.clone(),
            None => {
                let pin = Arc::new(SysfsPin::new(number, &self.sysfs_root));
                pin.set_exported(true)?;
                self.pins.insert(number, pin.clone());
                pin
            }
        };

        pin.write(Attribute::Direction, direction)?;
        if let Some(level) = initial {
            pin.set_value(level)?;
        }
        debug!("pin {number}: set up as {direction}");
        Ok(())
    }

    /// Reads the current value of one or more pins, in list order. Every pin
    /// must have been set up.
    pub fn input<P: Into<Pins>>(&self, pins: P) -> Result<Vec<Level>> {
        let ids = pins.into().0;
        let mut levels = Vec::with_capacity(ids.len());
        for id in &ids {
            let number = self.resolve(id)?;
            levels.push(self.registered(number)?.value()?);
        }
        Ok(levels)
    }

    /// Reads a single pin's value.
    pub fn input_one<P: Into<PinId>>(&self, pin: P) -> Result<Level> {
        let number = self.resolve(&pin.into())?;
        self.registered(number)?.value()
    }

    /// Writes values to one or more pins. Values broadcast and pad across
    /// the pin list the same way `setup` arguments do.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sysgpio::{Gpio, Level, PinState};
    ///
    /// let mut gpio = Gpio::new();
    /// gpio.setup(vec![7, 11], PinState::Out, None).unwrap();
    /// gpio.output(vec![7, 11], Level::High).unwrap();
    /// ```
    pub fn output<P, V>(&self, pins: P, values: V) -> Result<()>
    where
        P: Into<Pins>,
        V: Into<Args<Level>>,
    {
        let ids = pins.into().0;
        let mut numbers = Vec::with_capacity(ids.len());
        for id in &ids {
            let number = self.resolve(id)?;
            self.registered(number)?;
            numbers.push(number);
        }

        let values = values.into().0;
        if values.is_empty() {
            return Err(Error::InvalidValue("empty value list".to_string()));
        }
        let values = pad_to(values, numbers.len());

        for (number, value) in numbers.iter().zip(values) {
            self.registered(*number)?.set_value(value)?;
        }

        Ok(())
    }

    /// Tears down specific pins: stops and drops any PWM channel and edge
    /// watcher, then unexports and drops the pin handle. Cleaning up a pin
    /// that was never set up is a no-op.
    pub fn cleanup<P: Into<Pins>>(&mut self, pins: P) -> Result<()> {
        let numbers = pins
            .into()
            .0
            .iter()
            .map(|id| self.resolve(id))
            .collect::<Result<Vec<u32>>>()?;
        self.cleanup_numbers(numbers)
    }

    /// Tears down every currently registered pin.
    pub fn cleanup_all(&mut self) -> Result<()> {
        let numbers: Vec<u32> = self.pins.keys().copied().collect();
        self.cleanup_numbers(numbers)
    }

    fn cleanup_numbers(&mut self, numbers: Vec<u32>) -> Result<()> {
        for number in numbers {
            if let Some(pwm) = self.pwms.remove(&number) {
                pwm.clear();
            }
            if let Some(watcher) = self.watchers.remove(&number) {
                watcher.detach();
            }
            if let Some(pin) = self.pins.remove(&number) {
                pin.set_exported(false)?;
                debug!("pin {number}: cleaned up");
            }
        }
        Ok(())
    }

    /// Opens the global interrupt gate; edge watchers resume polling.
    pub fn enable_interrupts(&self) {
        self.interrupts.set();
    }

    /// Closes the global interrupt gate. Every watcher pauses at its next
    /// poll check; an operation already past the check is not preempted.
    pub fn disable_interrupts(&self) {
        self.interrupts.clear();
    }

    /// Attaches soft edge detection to a pin that has been set up. The pin's
    /// direction is forced to input. At most one watcher per pin; detach the
    /// existing one first.
    pub fn add_event_detect<P: Into<PinId>>(
        &mut self,
        pin: P,
        edge: Edge,
        callback: Option<Callback>,
        bouncetime: Option<Duration>,
    ) -> Result<()> {
        let number = self.resolve(&pin.into())?;
        let pin = self.registered(number)?.clone();
        if self.watchers.contains_key(&number) {
            return Err(Error::AlreadyAttached(number));
        }

        let watcher = EdgeWatcher::spawn(
            pin,
            edge,
            bouncetime.unwrap_or(Duration::ZERO),
            callback.into_iter().collect(),
            self.interrupts.clone(),
        )?;
        debug!("pin {number}: edge detection attached ({edge:?})");
        self.watchers.insert(number, watcher);

        Ok(())
    }

    /// Detaches a pin's edge watcher, stopping its worker and clearing any
    /// pending triggered flag.
    pub fn remove_event_detect<P: Into<PinId>>(&mut self, pin: P) -> Result<()> {
        let number = self.resolve(&pin.into())?;
        let watcher = self
            .watchers
            .remove(&number)
            .ok_or(Error::NotAttached(number))?;
        debug!(
            "pin {number}: edge detection detached ({:?})",
            watcher.edge()
        );
        watcher.detach();
        Ok(())
    }

    /// Appends a callback to a pin's existing edge watcher.
    pub fn add_event_callback<P: Into<PinId>>(&self, pin: P, callback: Callback) -> Result<()> {
        let number = self.resolve(&pin.into())?;
        let watcher = self
            .watchers
            .get(&number)
            .ok_or(Error::NotAttached(number))?;
        watcher.add_callback(callback);
        Ok(())
    }

    /// Waits for the pin's watcher to report a confirmed edge, checking its
    /// triggered flag 10 times per second. Returns `true` and clears the flag
    /// on success (one-shot consumption); returns `false` once `timeout`
    /// elapses. `None` waits forever.
    pub fn event_detected<P: Into<PinId>>(
        &self,
        pin: P,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let number = self.resolve(&pin.into())?;
        let watcher = self
            .watchers
            .get(&number)
            .ok_or(Error::NotAttached(number))?;
        Ok(watcher.event_detected(timeout))
    }

    /// Takes the error that stopped a pin's edge worker, if any.
    pub fn event_fault<P: Into<PinId>>(&self, pin: P) -> Result<Option<Error>> {
        let number = self.resolve(&pin.into())?;
        let watcher = self
            .watchers
            .get(&number)
            .ok_or(Error::NotAttached(number))?;
        Ok(watcher.take_fault())
    }

    /// Synchronously polls a pin for an edge without involving any watcher.
    /// Returns the resolved pin number on success, or `None` once `timeout`
    /// elapses (`None` timeout waits forever). The pin must have been set up.
    pub fn wait_for_edge<P: Into<PinId>>(
        &self,
        pin: P,
        edge: Edge,
        timeout: Option<Duration>,
    ) -> Result<Option<u32>> {
        let number = self.resolve(&pin.into())?;
        let pin = self.registered(number)?;
        Ok(event::wait_for_edge(pin, edge, timeout)?.then_some(number))
    }

    /// Returns a control handle for the pin's software PWM channel, creating
    /// the channel lazily on first request.
    ///
    /// Creation sets the pin up as an output and requires a frequency; later
    /// requests may pass a frequency to retune the existing channel, or
    /// `None` to leave it untouched.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sysgpio::Gpio;
    ///
    /// let mut gpio = Gpio::new();
    /// let pwm = gpio.pwm(12, Some(50.0)).unwrap();
    /// pwm.start(30.0).unwrap();
    /// ```
    pub fn pwm<P: Into<PinId>>(&mut self, pin: P, frequency: Option<f64>) -> Result<PwmHandle> {
        let number = self.resolve(&pin.into())?;

        if let Some(pwm) = self.pwms.get(&number) {
            let handle = pwm.handle();
            if let Some(frequency) = frequency {
                handle.change_frequency(frequency)?;
            }
            return Ok(handle);
        }

        let frequency = frequency.ok_or(Error::InvalidFrequency(0.0))?;
        self.setup_number(number, PinState::Out, None)?;
        let pin = self.registered(number)?.clone();
        let pwm = SoftPwm::spawn(pin, frequency)?;
        let handle = pwm.handle();
        self.pwms.insert(number, pwm);
        debug!("pin {number}: pwm channel created at {frequency} Hz");

        Ok(handle)
    }
}

impl Default for Gpio {
    fn default() -> Gpio {
        Gpio::new()
    }
}
