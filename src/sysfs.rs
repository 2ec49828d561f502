use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::gpio::Level;

/// How long to wait for the kernel to materialize a gpio node after writing
/// the pin number to the export control file.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Attribute files exposed by an exported sysfs GPIO node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Value,
    Direction,
    ActiveLow,
    Edge,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Value,
        Attribute::Direction,
        Attribute::ActiveLow,
        Attribute::Edge,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Attribute::Value => "value",
            Attribute::Direction => "direction",
            Attribute::ActiveLow => "active_low",
            Attribute::Edge => "edge",
        }
    }
}

/// One exported GPIO pin and its open attribute channels.
///
/// The four attribute files are kept open for unbuffered read/write while the
/// pin is exported; every access seeks back to the start of the file first.
/// Reads and writes serialize against operations of the same kind only, so a
/// read may race a write. Same-kind serialization is required because the
/// seek-then-transfer pair is not atomic.
pub struct SysfsPin {
    pin: u32,
    root: PathBuf,
    path: PathBuf,
    files: RwLock<HashMap<Attribute, File>>,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl SysfsPin {
    pub fn new(pin: u32, root: &Path) -> SysfsPin {
        SysfsPin {
            pin,
            root: root.to_path_buf(),
            path: root.join(format!("gpio{pin}")),
            files: RwLock::new(HashMap::new()),
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Whether the kernel currently exposes a node for this pin.
    pub fn is_exported(&self) -> bool {
        self.path.exists()
    }

    /// Exports or unexports the pin.
    ///
    /// Exporting registers the pin through the export control file if its node
    /// does not exist yet, then (re)opens all four attribute channels; the
    /// export write itself is idempotent. Unexporting writes the unexport
    /// control file and closes the channels regardless of whether that write
    /// succeeded.
    pub fn set_exported(&self, exported: bool) -> Result<()> {
        if exported {
            if !self.path.exists() {
                self.write_control("export")?;
            }
            self.wait_for_node()?;

            let mut opened = HashMap::new();
            for attr in Attribute::ALL {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(self.path.join(attr.file_name()))
                    .map_err(|e| self.io(format!("open {}", attr.file_name()), e))?;
                opened.insert(attr, file);
            }
            *self.files.write() = opened;
            debug!("pin {}: exported, attribute channels open", self.pin);
        } else {
            let unexport = if self.path.exists() {
                self.write_control("unexport")
            } else {
                Ok(())
            };
            self.files.write().clear();
            debug!("pin {}: attribute channels closed", self.pin);
            unexport?;
        }

        Ok(())
    }

    /// Reads the full contents of an attribute channel, whitespace-trimmed.
    pub fn read(&self, attr: Attribute) -> Result<String> {
        let _serial = self.read_lock.lock();
        let files = self.files.read();
        let mut file = files.get(&attr).ok_or_else(|| self.not_open(attr))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| self.io(format!("seek {}", attr.file_name()), e))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .map_err(|e| self.io(format!("read {}", attr.file_name()), e))?;
        Ok(raw.trim().to_string())
    }

    /// Writes the string form of a value to an attribute channel.
    pub fn write(&self, attr: Attribute, data: &str) -> Result<()> {
        let _serial = self.write_lock.lock();
        let files = self.files.read();
        let mut file = files.get(&attr).ok_or_else(|| self.not_open(attr))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| self.io(format!("seek {}", attr.file_name()), e))?;
        file.write_all(data.as_bytes())
            .map_err(|e| self.io(format!("write {}", attr.file_name()), e))?;
        Ok(())
    }

    pub fn value(&self) -> Result<Level> {
        Level::from_sysfs(&self.read(Attribute::Value)?)
    }

    pub fn set_value(&self, level: Level) -> Result<()> {
        self.write(Attribute::Value, level.as_sysfs())
    }

    /// Current direction as reported by sysfs, "in" or "out".
    pub fn direction(&self) -> Result<String> {
        self.read(Attribute::Direction)
    }

    pub fn set_direction(&self, direction: &str) -> Result<()> {
        self.write(Attribute::Direction, direction)
    }

    pub fn active_low(&self) -> Result<bool> {
        match self.read(Attribute::ActiveLow)?.as_str() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(Error::InvalidValue(other.to_string())),
        }
    }

    pub fn set_active_low(&self, active_low: bool) -> Result<()> {
        self.write(Attribute::ActiveLow, if active_low { "1" } else { "0" })
    }

    /// Kernel edge setting, one of "none", "rising", "falling" or "both".
    /// Soft edge detection does not depend on it; the channel is exposed for
    /// callers that drive the kernel interface directly.
    pub fn edge(&self) -> Result<String> {
        self.read(Attribute::Edge)
    }

    pub fn set_edge(&self, edge: &str) -> Result<()> {
        self.write(Attribute::Edge, edge)
    }

    fn write_control(&self, name: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.root.join(name))
            .map_err(|e| self.io(format!("open {name}"), e))?;
        file.write_all(self.pin.to_string().as_bytes())
            .map_err(|e| self.io(format!("write {name}"), e))?;
        Ok(())
    }

    fn wait_for_node(&self) -> Result<()> {
        let deadline = Instant::now() + EXPORT_TIMEOUT;
        while !self.path.join("value").exists() {
            if Instant::now() >= deadline {
                return Err(self.io(
                    "export".to_string(),
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{} did not appear", self.path.display()),
                    ),
                ));
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn io(&self, what: String, source: io::Error) -> Error {
        Error::Io {
            pin: self.pin,
            what,
            source,
        }
    }

    fn not_open(&self, attr: Attribute) -> Error {
        self.io(
            format!("{} channel", attr.file_name()),
            io::Error::new(io::ErrorKind::NotConnected, "attribute file not open"),
        )
    }
}
