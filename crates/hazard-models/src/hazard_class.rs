//! Road-damage classes recognized by the detection model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hazard classes produced by the road-damage detection model.
///
/// The numeric ids match the model's output head; `Unknown` preserves ids
/// from newer model revisions this build does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardClass {
    AlligatorCrack,
    BlockCrack,
    ConstructionJointCrack,
    CrosswalkBlur,
    LaneBlur,
    LongitudinalCrack,
    Manhole,
    PatchRepair,
    Pothole,
    TransverseCrack,
    WheelMarkCrack,
    Unknown(u32),
}

impl HazardClass {
    /// Map a model class id to a hazard class.
    pub fn from_class_id(class_id: u32) -> Self {
        match class_id {
            0 => Self::AlligatorCrack,
            1 => Self::BlockCrack,
            2 => Self::ConstructionJointCrack,
            3 => Self::CrosswalkBlur,
            4 => Self::LaneBlur,
            5 => Self::LongitudinalCrack,
            6 => Self::Manhole,
            7 => Self::PatchRepair,
            8 => Self::Pothole,
            9 => Self::TransverseCrack,
            10 => Self::WheelMarkCrack,
            other => Self::Unknown(other),
        }
    }

    /// Human-readable class name, matching the model's label table.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlligatorCrack => "Alligator Crack",
            Self::BlockCrack => "Block Crack",
            Self::ConstructionJointCrack => "Construction Joint Crack",
            Self::CrosswalkBlur => "Crosswalk Blur",
            Self::LaneBlur => "Lane Blur",
            Self::LongitudinalCrack => "Longitudinal Crack",
            Self::Manhole => "Manhole",
            Self::PatchRepair => "Patch Repair",
            Self::Pothole => "Pothole",
            Self::TransverseCrack => "Transverse Crack",
            Self::WheelMarkCrack => "Wheel Mark Crack",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Parse a class from a backend-provided label string.
    ///
    /// Falls back to `Unknown(u32::MAX)` for labels outside the table.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Alligator Crack" => Self::AlligatorCrack,
            "Block Crack" => Self::BlockCrack,
            "Construction Joint Crack" => Self::ConstructionJointCrack,
            "Crosswalk Blur" => Self::CrosswalkBlur,
            "Lane Blur" => Self::LaneBlur,
            "Longitudinal Crack" => Self::LongitudinalCrack,
            "Manhole" => Self::Manhole,
            "Patch Repair" => Self::PatchRepair,
            "Pothole" => Self::Pothole,
            "Transverse Crack" => Self::TransverseCrack,
            "Wheel Mark Crack" => Self::WheelMarkCrack,
            _ => Self::Unknown(u32::MAX),
        }
    }
}

impl fmt::Display for HazardClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown_{}", id),
            other => f.write_str(other.label()),
        }
    }
}
