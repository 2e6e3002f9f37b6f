//! Instruction records carried over the TCP channel.
//!
//! A frame is a JSON object whose top-level key names the category. Keys are
//! tested in [`InstructionKind::ALL`] order and the first present one wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualDriveInstruction {
    pub throttle: f64,
    pub steering: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SemiDriveInstruction {
    pub direction: i32,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveMission {
    pub id: String,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfiguration {
    pub steering_kp: f64,
    pub steering_kd: f64,
    pub speed_kp: f64,
    pub speed_ki: f64,
    pub turn_kd: f64,
    pub angle_offset: f64,
}

/// Map frames are kept whole; the control loop interprets them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapPayload(pub Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    ManualDrive,
    SemiDrive,
    DriveMission,
    Parameters,
    Map,
}

impl InstructionKind {
    /// Classification priority.
    pub const ALL: [InstructionKind; 5] = [
        InstructionKind::ManualDrive,
        InstructionKind::SemiDrive,
        InstructionKind::DriveMission,
        InstructionKind::Parameters,
        InstructionKind::Map,
    ];

    pub fn key(self) -> &'static str {
        match self {
            InstructionKind::ManualDrive => "ManualDriveInstruction",
            InstructionKind::SemiDrive => "SemiDriveInstruction",
            InstructionKind::DriveMission => "DriveMission",
            InstructionKind::Parameters => "ParameterConfiguration",
            InstructionKind::Map => "MapData",
        }
    }

    /// First recognised key present in `object`.
    pub fn classify(object: &Map<String, Value>) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| object.contains_key(kind.key()))
    }
}

impl core::fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    ManualDrive(ManualDriveInstruction),
    SemiDrive(SemiDriveInstruction),
    DriveMission(DriveMission),
    Parameters(ParameterConfiguration),
    Map(MapPayload),
}

impl Instruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::ManualDrive(_) => InstructionKind::ManualDrive,
            Instruction::SemiDrive(_) => InstructionKind::SemiDrive,
            Instruction::DriveMission(_) => InstructionKind::DriveMission,
            Instruction::Parameters(_) => InstructionKind::Parameters,
            Instruction::Map(_) => InstructionKind::Map,
        }
    }

    /// Parses one line received from the client.
    ///
    /// `Ok(None)` means the frame was valid JSON but carried none of the
    /// recognised keys.
    pub fn from_frame(frame: &[u8]) -> Result<Option<Self>, FrameError> {
        let value: Value = serde_json::from_slice(frame).map_err(FrameError::from)?;
        let Value::Object(mut object) = value else {
            return Ok(None);
        };
        let Some(kind) = InstructionKind::classify(&object) else {
            return Ok(None);
        };

        let instruction = match kind {
            InstructionKind::Map => Instruction::Map(MapPayload(Value::Object(object))),
            _ => {
                let body = object.remove(kind.key()).unwrap_or(Value::Null);
                Self::from_body(kind, body)?
            }
        };
        Ok(Some(instruction))
    }

    fn from_body(kind: InstructionKind, body: Value) -> Result<Self, FrameError> {
        let instruction = match kind {
            InstructionKind::ManualDrive => Instruction::ManualDrive(serde_json::from_value(body)?),
            InstructionKind::SemiDrive => Instruction::SemiDrive(serde_json::from_value(body)?),
            InstructionKind::DriveMission => {
                Instruction::DriveMission(serde_json::from_value(body)?)
            }
            InstructionKind::Parameters => Instruction::Parameters(serde_json::from_value(body)?),
            InstructionKind::Map => Instruction::Map(MapPayload(body)),
        };
        Ok(instruction)
    }
}

/// Why a frame could not be turned into an instruction.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Bad input from the peer; the frame is dropped and reading continues.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The stream can no longer be trusted; the reader stops.
    #[error("fatal frame error: {0}")]
    Fatal(String),
}

impl FrameError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Malformed(_))
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Syntax | Category::Data | Category::Eof => {
                FrameError::Malformed(err.to_string())
            }
            Category::Io => FrameError::Fatal(err.to_string()),
        }
    }
}
