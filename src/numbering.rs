use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// A pin identifier as supplied by the caller: either a board-specific name
/// or a raw kernel GPIO number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinId {
    Number(u32),
    Name(String),
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinId::Number(n) => write!(f, "{n}"),
            PinId::Name(s) => f.write_str(s),
        }
    }
}

impl From<u32> for PinId {
    fn from(pin: u32) -> PinId {
        PinId::Number(pin)
    }
}

impl From<&str> for PinId {
    fn from(pin: &str) -> PinId {
        PinId::Name(pin.to_string())
    }
}

impl From<String> for PinId {
    fn from(pin: String) -> PinId {
        PinId::Name(pin)
    }
}

/// Board-family pin naming: resolves caller-facing identifiers to kernel GPIO
/// numbers. One implementation per board family, selected with
/// [`crate::gpio::Gpio::set_mode`].
pub trait PinNumbering: Send + Sync {
    fn resolve(&self, pin: &PinId) -> Result<u32>;
    fn name(&self) -> &'static str;
}

fn unresolved(pin: &PinId, numbering: &dyn PinNumbering) -> Error {
    Error::UnresolvedPin(pin.to_string(), numbering.name())
}

/// Kernel GPIO numbers pass through unchanged; decimal strings parse.
pub struct Direct;

impl PinNumbering for Direct {
    fn resolve(&self, pin: &PinId) -> Result<u32> {
        match pin {
            PinId::Number(n) => Ok(*n),
            PinId::Name(s) => s.trim().parse().map_err(|_| unresolved(pin, self)),
        }
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Allwinner (sunxi) port naming: "P<bank><index>" maps to
/// `32 * (bank - 'A') + index`, e.g. PA3 -> 3, PG11 -> 203.
pub struct Sunxi;

impl PinNumbering for Sunxi {
    fn resolve(&self, pin: &PinId) -> Result<u32> {
        let name = match pin {
            PinId::Name(s) => s.trim(),
            PinId::Number(_) => return Err(unresolved(pin, self)),
        };

        let rest = name.strip_prefix('P').ok_or_else(|| unresolved(pin, self))?;
        let mut chars = rest.chars();
        let bank = chars
            .next()
            .filter(char::is_ascii_uppercase)
            .ok_or_else(|| unresolved(pin, self))?;
        let index: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| unresolved(pin, self))?;

        Ok(32 * (bank as u32 - 'A' as u32) + index)
    }

    fn name(&self) -> &'static str {
        "sunxi"
    }
}

// BeagleBone Black P8/P9 expansion headers to kernel GPIO numbers.
const BBB_HEADER_MAP: &[(&str, u32)] = &[
    ("P8_03", 38),
    ("P8_04", 39),
    ("P8_05", 34),
    ("P8_06", 35),
    ("P8_07", 66),
    ("P8_08", 67),
    ("P8_09", 69),
    ("P8_10", 68),
    ("P8_11", 45),
    ("P8_12", 44),
    ("P8_13", 23),
    ("P8_14", 26),
    ("P8_15", 47),
    ("P8_16", 46),
    ("P8_17", 27),
    ("P8_18", 65),
    ("P8_19", 22),
    ("P8_20", 63),
    ("P8_21", 62),
    ("P8_22", 37),
    ("P8_23", 36),
    ("P8_24", 33),
    ("P8_25", 32),
    ("P8_26", 61),
    ("P8_27", 86),
    ("P8_28", 88),
    ("P8_29", 87),
    ("P8_30", 89),
    ("P8_31", 10),
    ("P8_32", 11),
    ("P8_33", 9),
    ("P8_34", 81),
    ("P8_35", 8),
    ("P8_36", 80),
    ("P8_37", 78),
    ("P8_38", 79),
    ("P8_39", 76),
    ("P8_40", 77),
    ("P8_41", 74),
    ("P8_42", 75),
    ("P8_43", 72),
    ("P8_44", 73),
    ("P8_45", 70),
    ("P8_46", 71),
    ("P9_11", 30),
    ("P9_12", 60),
    ("P9_13", 31),
    ("P9_14", 50),
    ("P9_15", 48),
    ("P9_16", 51),
    ("P9_17", 5),
    ("P9_18", 4),
    ("P9_19", 13),
    ("P9_20", 12),
    ("P9_21", 3),
    ("P9_22", 2),
    ("P9_23", 49),
    ("P9_24", 15),
    ("P9_25", 117),
    ("P9_26", 14),
    ("P9_27", 115),
    ("P9_28", 113),
    ("P9_29", 111),
    ("P9_30", 112),
    ("P9_31", 110),
    ("P9_41", 20),
    ("P9_41A", 20),
    ("P9_41B", 116),
    ("P9_42", 7),
    ("P9_42A", 7),
    ("P9_42B", 114),
];

/// BeagleBone Black expansion header naming. Accepts the usual spelling
/// variants: p8_08, P8.08, p8.8 and P8_8 all resolve to the same pin, and the
/// A/B suffixed P9_41/P9_42 pins are supported.
pub struct BeagleBoneBlack {
    map: HashMap<&'static str, u32>,
}

impl BeagleBoneBlack {
    pub fn new() -> BeagleBoneBlack {
        BeagleBoneBlack {
            map: BBB_HEADER_MAP.iter().copied().collect(),
        }
    }

    fn canonical(name: &str) -> Option<String> {
        let name = name.trim().to_ascii_uppercase();
        let rest = name.strip_prefix('P')?;
        let (header, pin) = rest.split_once(['_', '.'])?;
        if header != "8" && header != "9" {
            return None;
        }

        let (digits, suffix) = if let Some(d) = pin.strip_suffix('A') {
            (d, "A")
        } else if let Some(d) = pin.strip_suffix('B') {
            (d, "B")
        } else {
            (pin, "")
        };
        let n: u32 = digits.parse().ok()?;

        Some(format!("P{header}_{n:02}{suffix}"))
    }
}

impl Default for BeagleBoneBlack {
    fn default() -> BeagleBoneBlack {
        BeagleBoneBlack::new()
    }
}

impl PinNumbering for BeagleBoneBlack {
    fn resolve(&self, pin: &PinId) -> Result<u32> {
        let name = match pin {
            PinId::Name(s) => s,
            PinId::Number(_) => return Err(unresolved(pin, self)),
        };

        Self::canonical(name)
            .and_then(|key| self.map.get(key.as_str()).copied())
            .ok_or_else(|| unresolved(pin, self))
    }

    fn name(&self) -> &'static str {
        "beaglebone-black"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_passes_numbers_and_parses_decimal_names() {
        assert_eq!(Direct.resolve(&PinId::Number(17)).unwrap(), 17);
        assert_eq!(Direct.resolve(&"42".into()).unwrap(), 42);
        assert!(matches!(
            Direct.resolve(&"PA3".into()),
            Err(Error::UnresolvedPin(_, "direct"))
        ));
    }

    #[test]
    fn sunxi_bank_arithmetic() {
        assert_eq!(Sunxi.resolve(&"PA3".into()).unwrap(), 3);
        assert_eq!(Sunxi.resolve(&"PB0".into()).unwrap(), 32);
        assert_eq!(Sunxi.resolve(&"PG11".into()).unwrap(), 203);
    }

    #[test]
    fn sunxi_rejects_numbers_and_malformed_names() {
        assert!(Sunxi.resolve(&PinId::Number(3)).is_err());
        assert!(Sunxi.resolve(&"A3".into()).is_err());
        assert!(Sunxi.resolve(&"Pa3".into()).is_err());
        assert!(Sunxi.resolve(&"PA".into()).is_err());
    }

    #[test]
    fn beaglebone_accepts_spelling_variants() {
        let bbb = BeagleBoneBlack::new();
        for name in ["P8_08", "p8_08", "P8.08", "p8.8", "P8_8"] {
            assert_eq!(bbb.resolve(&name.into()).unwrap(), 67, "{name}");
        }
        assert_eq!(bbb.resolve(&"P9_41B".into()).unwrap(), 116);
        assert_eq!(bbb.resolve(&"p9.42a".into()).unwrap(), 7);
    }

    #[test]
    fn beaglebone_rejects_unknown_pins() {
        let bbb = BeagleBoneBlack::new();
        assert!(bbb.resolve(&"P8_02".into()).is_err());
        assert!(bbb.resolve(&"P7_01".into()).is_err());
        assert!(bbb.resolve(&PinId::Number(67)).is_err());
    }
}
