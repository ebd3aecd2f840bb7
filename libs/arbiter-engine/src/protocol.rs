/// Framed Protocol Between Engine and Execution Unit
///
/// **Wire Format:**
/// Every message is a 4-byte big-endian length followed by that many bytes of
/// UTF-8 JSON. The unit writes frames on a descriptor that user code cannot
/// reach through its console, so printed text never lands inside a frame.
///
/// **Direction:**
/// - Engine → unit: one [`UnitRequest`] as plain JSON on stdin
/// - Unit → engine: one or more [`UnitFrame`]s on stdout; the last terminal
///   frame wins

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const FRAME_HEADER_LEN: usize = 4;

/// What the harness does with the code it receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitTask {
    /// Load the code, find the entry function and call it with `args`
    #[default]
    Invoke,
    /// Transpile TypeScript to JavaScript and answer with a `transpiled` frame
    Transpile,
    /// Run the code top to bottom and report what it printed
    Script,
}

/// Everything a harness needs for one unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRequest {
    pub code: String,
    #[serde(default)]
    pub task: UnitTask,
    /// Names to try in order, verbatim first
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typescript_module: Option<String>,
}

/// Heap or RSS readings taken inside the unit around the invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub start_bytes: f64,
    pub end_bytes: f64,
}

impl MemorySnapshot {
    /// Growth during the invocation in KB, never negative
    pub fn delta_kb(&self) -> f64 {
        (self.end_bytes - self.start_bytes).max(0.0) / 1024.0
    }
}

/// Message emitted by an execution unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UnitFrame {
    /// The function returned
    #[serde(rename_all = "camelCase")]
    Result {
        return_value: String,
        #[serde(default)]
        stdout: Vec<String>,
        #[serde(default)]
        memory: Option<MemorySnapshot>,
        #[serde(default)]
        elapsed_ns: Option<f64>,
    },
    /// Transpilation succeeded; `code` is plain JavaScript
    Transpiled { code: String },
    /// Loading, lookup or invocation failed
    #[serde(rename_all = "camelCase")]
    Error {
        phase: UnitErrorPhase,
        message: String,
        #[serde(default)]
        detail: Option<String>,
        #[serde(default)]
        stdout: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitErrorPhase {
    Compile,
    Runtime,
}

/// Encode one frame
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message).context("Failed to serialize frame")?;
    let len = u32::try_from(body.len()).context("Frame too large")?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode every frame in a byte stream
///
/// Fails on a truncated header or body, or a body that is not a valid frame.
pub fn decode_frames(mut bytes: &[u8]) -> Result<Vec<UnitFrame>> {
    let mut frames = Vec::new();

    while !bytes.is_empty() {
        if bytes.len() < FRAME_HEADER_LEN {
            bail!("Truncated frame header ({} bytes)", bytes.len());
        }
        let (header, rest) = bytes.split_at(FRAME_HEADER_LEN);
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if rest.len() < len {
            bail!("Truncated frame body: expected {} bytes, got {}", len, rest.len());
        }
        let (body, rest) = rest.split_at(len);
        let frame: UnitFrame =
            serde_json::from_slice(body).context("Malformed frame body")?;
        frames.push(frame);
        bytes = rest;
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_result_frame_from_harness_json() {
        let body = br#"{"type":"result","returnValue":"[0,1]","stdout":["a","b"],"memory":{"startBytes":100,"endBytes":2148},"elapsedNs":1500000}"#;
        let mut bytes = (body.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(body);

        let frames = decode_frames(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            UnitFrame::Result { return_value, stdout, memory, elapsed_ns } => {
                assert_eq!(return_value, "[0,1]");
                assert_eq!(stdout, &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(memory.unwrap().delta_kb(), 2.0);
                assert_eq!(*elapsed_ns, Some(1_500_000.0));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_decode_multiple_frames() {
        let first = UnitFrame::Error {
            phase: UnitErrorPhase::Compile,
            message: "SyntaxError: Unexpected token".to_string(),
            detail: None,
            stdout: vec![],
        };
        let second = UnitFrame::Result {
            return_value: "RESULT_MARKER:1".to_string(),
            stdout: vec!["OUTPUT_MARKER".to_string()],
            memory: None,
            elapsed_ns: None,
        };
        let mut bytes = encode_frame(&first).unwrap();
        bytes.extend(encode_frame(&second).unwrap());

        let frames = decode_frames(&bytes).unwrap();
        assert_eq!(frames, vec![first, second]);
    }

    #[test]
    fn test_stray_bytes_are_rejected() {
        let mut bytes = b"hello from print\n".to_vec();
        bytes.extend(
            encode_frame(&UnitFrame::Result {
                return_value: "1".to_string(),
                stdout: vec![],
                memory: None,
                elapsed_ns: None,
            })
            .unwrap(),
        );
        assert!(decode_frames(&bytes).is_err());
    }

    #[test]
    fn test_truncated_frame() {
        let bytes = encode_frame(&UnitFrame::Result {
            return_value: "42".to_string(),
            stdout: vec![],
            memory: None,
            elapsed_ns: None,
        })
        .unwrap();
        assert!(decode_frames(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_frames(&bytes[..2]).is_err());
    }

    #[test]
    fn test_empty_stream_has_no_frames() {
        assert!(decode_frames(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_transpiled_frame_and_task_names() {
        let body = br#"{"type":"transpiled","code":"function f(n) { return n; }"}"#;
        let mut bytes = (body.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(body);

        let frames = decode_frames(&bytes).unwrap();
        assert_eq!(
            frames,
            vec![UnitFrame::Transpiled { code: "function f(n) { return n; }".to_string() }]
        );

        let request: UnitRequest =
            serde_json::from_str(r#"{"code":"print(1)","task":"script"}"#).unwrap();
        assert_eq!(request.task, UnitTask::Script);
        assert!(request.candidates.is_empty());
        let request: UnitRequest = serde_json::from_str(r#"{"code":"x"}"#).unwrap();
        assert_eq!(request.task, UnitTask::Invoke);
    }

    #[test]
    fn test_negative_memory_delta_clamps_to_zero() {
        let snapshot = MemorySnapshot { start_bytes: 4096.0, end_bytes: 1024.0 };
        assert_eq!(snapshot.delta_kb(), 0.0);
    }
}
