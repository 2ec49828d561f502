//! User-space GPIO control for Linux boards that expose pins through the
//! sysfs interface, with two derived capabilities built on plain digital I/O:
//! a software-generated PWM signal and polled ("soft interrupt") edge
//! detection.
//!
//! All timing is best-effort and sleep-based; there is no hard real-time
//! guarantee, and edge detection is polling-based emulation rather than a
//! kernel interrupt.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sysgpio::{Edge, Gpio, Level, PinState};
//!
//! let mut gpio = Gpio::new();
//! gpio.setup(vec![7, 11], PinState::Out, Some(Level::Low.into())).unwrap();
//! gpio.output(7, Level::High).unwrap();
//!
//! gpio.setup(13, PinState::In, None).unwrap();
//! gpio.add_event_detect(13, Edge::Rising, None, Some(Duration::from_millis(20))).unwrap();
//! if gpio.event_detected(13, Some(Duration::from_secs(5))).unwrap() {
//!     println!("edge on pin 13");
//! }
//!
//! gpio.cleanup_all().unwrap();
//! ```

pub mod error;
mod event;
mod flag;
pub mod gpio;
pub mod numbering;
pub mod pwm;
pub mod sysfs;

pub use error::{Error, Result};
pub use event::Callback;
pub use gpio::{Args, Edge, Gpio, Level, PinState, Pins};
pub use numbering::{BeagleBoneBlack, Direct, PinId, PinNumbering, Sunxi};
pub use pwm::PwmHandle;
pub use sysfs::{Attribute, SysfsPin};
