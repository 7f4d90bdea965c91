//! Signal quality grading

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    Excellent,
    Good,
    Fair,
    Poor,
    Unusable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    E,
    F,
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Letter::APlus => "A+",
            Letter::A => "A",
            Letter::BPlus => "B+",
            Letter::B => "B",
            Letter::CPlus => "C+",
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
            Letter::F => "F",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGrade {
    pub score: u8,
    pub letter: Letter,
    pub category: QualityCategory,
}

/// Grade an RSSI reading. Band lower bounds are inclusive: -60, -70, -80,
/// -90 dBm; each band splits into an upper and lower letter at its midpoint.
/// The numeric score runs linearly from 0 at -90 dBm to 100 at -50 dBm.
pub fn grade(rssi_dbm: i32) -> QualityGrade {
    let (letter, category) = match rssi_dbm {
        r if r >= -50 => (Letter::APlus, QualityCategory::Excellent),
        r if r >= -60 => (Letter::A, QualityCategory::Excellent),
        r if r >= -65 => (Letter::BPlus, QualityCategory::Good),
        r if r >= -70 => (Letter::B, QualityCategory::Good),
        r if r >= -75 => (Letter::CPlus, QualityCategory::Fair),
        r if r >= -80 => (Letter::C, QualityCategory::Fair),
        r if r >= -85 => (Letter::D, QualityCategory::Poor),
        r if r >= -90 => (Letter::E, QualityCategory::Poor),
        _ => (Letter::F, QualityCategory::Unusable),
    };
    let score = ((rssi_dbm as f64 + 90.0) * 2.5).clamp(0.0, 100.0).round() as u8;
    QualityGrade { score, letter, category }
}
