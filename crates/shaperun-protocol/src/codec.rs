//! Encoding and decoding of individual control lines.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Handshake line a worker emits once, after warm-up, before any task.
pub const READY: &str = "READY";

/// Line that ends a worker's task loop.
pub const EXIT: &str = "EXIT";

/// Replacement for embedded newlines in path-pair failure lines.
pub const FLATTEN_SEPARATOR: &str = " || ";

/// Suffix appended to an output path to name its error sidecar.
pub const SIDECAR_SUFFIX: &str = ".err";

/// `<output>.err`, keeping the full output file name (`t.brep` → `t.brep.err`).
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Collapse multi-line detail into one line. Trailing newlines are dropped
/// rather than turned into a dangling separator.
pub fn flatten(detail: &str) -> String {
    detail
        .trim_end_matches(['\r', '\n'])
        .replace("\r\n", "\n")
        .replace('\n', FLATTEN_SEPARATOR)
}

// ============================================================================
// Path-pair variant
// ============================================================================

/// `<scriptPath>|<outputPath>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPairRequest {
    pub script_path: PathBuf,
    pub output_path: PathBuf,
}

impl PathPairRequest {
    pub fn new(script_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            output_path: output_path.into(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let script = line_safe_path(&self.script_path)?;
        let output = line_safe_path(&self.output_path)?;
        Ok(format!("{}|{}", script, output))
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = line.split('|').collect();
        match parts.as_slice() {
            [script, output] => Ok(Self::new(*script, *output)),
            _ => Err(ProtocolError::InvalidRequest(line.to_string())),
        }
    }
}

fn line_safe_path(path: &Path) -> Result<&str, ProtocolError> {
    let text = path
        .to_str()
        .ok_or_else(|| ProtocolError::Unencodable(format!("non UTF-8 path {:?}", path)))?;
    if text.contains(['|', '\n', '\r']) {
        return Err(ProtocolError::Unencodable(format!(
            "path contains a separator: {}",
            text
        )));
    }
    Ok(text)
}

/// Leading tag of a path-pair failure line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Anticipated failure (missing file, missing `result`, bad type, null shape).
    Error,
    /// The script raised; the line carries the flattened trace.
    Exception,
    /// The worker loop itself failed while handling the line.
    Fatal,
}

impl FailureKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FailureKind::Error => "ERROR:",
            FailureKind::Exception => "EXCEPTION:",
            FailureKind::Fatal => "FATAL:",
        }
    }

    fn of_line(line: &str) -> Option<Self> {
        [FailureKind::Error, FailureKind::Exception, FailureKind::Fatal]
            .into_iter()
            .find(|kind| line.starts_with(kind.prefix()))
    }
}

/// Response to a path-pair request.
///
/// Failure lines are kept verbatim (prefix included, separators not undone);
/// the payload is the whole line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPairResponse {
    Success { material: Option<String> },
    Failure { kind: FailureKind, line: String },
}

impl PathPairResponse {
    /// Success, upper-casing the material tag.
    pub fn success(material: Option<&str>) -> Self {
        Self::Success {
            material: material
                .filter(|m| !m.is_empty())
                .map(|m| m.to_uppercase()),
        }
    }

    /// Failure line `"<PREFIX> <message>"`, flattened.
    pub fn failure(kind: FailureKind, message: &str) -> Self {
        Self::Failure {
            kind,
            line: flatten(&format!("{} {}", kind.prefix(), message)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Success { material: None } => "SUCCESS".to_string(),
            Self::Success {
                material: Some(material),
            } => format!("SUCCESS|{}", flatten(material)),
            Self::Failure { line, .. } => flatten(line),
        }
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        if line == "SUCCESS" {
            return Ok(Self::Success { material: None });
        }
        if let Some(material) = line.strip_prefix("SUCCESS|") {
            return Ok(Self::Success {
                material: (!material.is_empty()).then(|| material.to_string()),
            });
        }
        match FailureKind::of_line(line) {
            Some(kind) => Ok(Self::Failure {
                kind,
                line: line.to_string(),
            }),
            None => Err(ProtocolError::UnexpectedResponse(line.to_string())),
        }
    }
}

// ============================================================================
// Structured-task variant
// ============================================================================

/// One task as a JSON object on a single line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRequest {
    #[serde(alias = "code_file")]
    pub code_file: PathBuf,
    #[serde(alias = "args_file")]
    pub args_file: PathBuf,
    #[serde(alias = "output_path")]
    pub output_path: PathBuf,
}

impl StructuredRequest {
    pub fn new(
        code_file: impl Into<PathBuf>,
        args_file: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            code_file: code_file.into(),
            args_file: args_file.into(),
            output_path: output_path.into(),
        }
    }

    /// JSON escapes control characters, so the result is always one line.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line).map_err(|e| {
            ProtocolError::InvalidRequest(format!("{} ({})", e, preview(line)))
        })
    }

    /// Best-effort recovery of the output path from a line that failed to
    /// decode, so the worker can still leave a sidecar behind.
    pub fn salvage_output_path(line: &str) -> Option<PathBuf> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        ["outputPath", "output_path"]
            .iter()
            .find_map(|key| value.get(key)?.as_str())
            .map(PathBuf::from)
    }
}

/// Response to a structured request.
///
/// `OK` may carry the material tag as `OK|<MATERIAL>`; failure detail never
/// travels on the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredResponse {
    Ok { material: Option<String> },
    Err,
}

impl StructuredResponse {
    pub fn ok(material: Option<&str>) -> Self {
        Self::Ok {
            material: material
                .filter(|m| !m.is_empty())
                .map(|m| m.to_uppercase()),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Ok { material: None } => "OK".to_string(),
            Self::Ok {
                material: Some(material),
            } => format!("OK|{}", flatten(material)),
            Self::Err => "ERR".to_string(),
        }
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        match line {
            "OK" => Ok(Self::Ok { material: None }),
            "ERR" => Ok(Self::Err),
            other => match other.strip_prefix("OK|") {
                Some(material) => Ok(Self::Ok {
                    material: (!material.is_empty()).then(|| material.to_string()),
                }),
                None => Err(ProtocolError::UnexpectedResponse(other.to_string())),
            },
        }
    }
}

impl fmt::Display for StructuredResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn preview(line: &str) -> String {
    line.chars().take(200).collect()
}
