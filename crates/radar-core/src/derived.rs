//! Fields derived from an item's position.
//!
//! `distance` is persisted alongside every position write; `zone` is always
//! computed on demand and never stored.

use serde::{Deserialize, Serialize};

/// Distance from the radar origin.
pub fn distance(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

/// Quadrant classification of a position.
///
/// Points on either axis (and NaN coordinates) fall in [`Zone::X`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    P1,
    P2,
    P3,
    P4,
    X,
}

impl Zone {
    pub const ALL: [Zone; 5] = [Zone::P1, Zone::P2, Zone::P3, Zone::P4, Zone::X];

    pub fn of(x: f64, y: f64) -> Zone {
        if x < 0.0 && y < 0.0 {
            Zone::P1
        } else if x > 0.0 && y < 0.0 {
            Zone::P2
        } else if x < 0.0 && y > 0.0 {
            Zone::P3
        } else if x > 0.0 && y > 0.0 {
            Zone::P4
        } else {
            Zone::X
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::P1 => "P1",
            Zone::P2 => "P2",
            Zone::P3 => "P3",
            Zone::P4 => "P4",
            Zone::X => "X",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P1" => Ok(Zone::P1),
            "P2" => Ok(Zone::P2),
            "P3" => Ok(Zone::P3),
            "P4" => Ok(Zone::P4),
            "X" => Ok(Zone::X),
            other => Err(format!("unknown zone: {}", other)),
        }
    }
}

/// Shorthand for [`Zone::of`].
pub fn zone(x: f64, y: f64) -> Zone {
    Zone::of(x, y)
}
