//! Line-delimited JSON protocol spoken with the engine bridge.
//!
//! Each request is one JSON object on one line of the bridge's stdin,
//! tagged by `"op"`. The bridge answers every request with exactly one
//! line on stdout:
//!
//! ```text
//! -> {"op":"set","name":"Valve Type","value":{"kind":"text","value":"Ball valve"}}
//! <- {"ok":true}
//! -> {"op":"get","name":"Calculated Cv Max","kind":"number"}
//! <- {"ok":true,"value":{"kind":"number","value":41.7}}
//! -> {"op":"calculate"}
//! <- {"ok":false,"error":"Flow exceeds valve capacity"}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use valvesize_core::codec::{EngineValue, ParamKind};

use crate::session::{EngineError, ExportKind};

/// A request sent to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    /// Open the working file at `path`.
    Open { path: PathBuf },
    Set { name: String, value: EngineValue },
    Get { name: String, kind: ParamKind },
    Calculate,
    Save,
    Export { format: ExportKind, path: PathBuf },
    Close,
}

impl BridgeRequest {
    /// Short operation name for logs and errors.
    pub fn op(&self) -> &'static str {
        match self {
            BridgeRequest::Open { .. } => "open",
            BridgeRequest::Set { .. } => "set",
            BridgeRequest::Get { .. } => "get",
            BridgeRequest::Calculate => "calculate",
            BridgeRequest::Save => "save",
            BridgeRequest::Export { .. } => "export",
            BridgeRequest::Close => "close",
        }
    }

    /// Serialize as one protocol line, newline included.
    pub fn to_line(&self) -> Result<String, EngineError> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| EngineError::Protocol(format!("Failed to encode request: {e}")))?;
        line.push('\n');
        Ok(line)
    }
}

/// The bridge's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<EngineValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    /// Parse one protocol line.
    pub fn parse(line: &str) -> Result<Self, EngineError> {
        serde_json::from_str(line.trim()).map_err(|e| {
            EngineError::Protocol(format!("Malformed bridge response '{}': {e}", line.trim()))
        })
    }

    /// Turn the response into the operation's result.
    pub fn into_result(self, op: &'static str) -> Result<Option<EngineValue>, EngineError> {
        if self.ok {
            Ok(self.value)
        } else {
            Err(EngineError::Rejected {
                op,
                message: self.error.unwrap_or_else(|| "unspecified error".to_string()),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn set_request_wire_format() {
        let req = BridgeRequest::Set {
            name: "Valve Type".into(),
            value: EngineValue::Text("Ball valve".into()),
        };
        let line = req.to_line().unwrap();
        assert!(line.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "op": "set",
                "name": "Valve Type",
                "value": {"kind": "text", "value": "Ball valve"}
            })
        );
    }

    #[test]
    fn unit_requests_carry_only_the_op() {
        let json: serde_json::Value =
            serde_json::from_str(&BridgeRequest::Calculate.to_line().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"op": "calculate"}));
    }

    #[test]
    fn export_request_names_format() {
        let req = BridgeRequest::Export {
            format: ExportKind::Report,
            path: PathBuf::from("/results/R/R_1.report.html"),
        };
        let json: serde_json::Value = serde_json::from_str(&req.to_line().unwrap()).unwrap();
        assert_eq!(json["format"], "report");
        assert_eq!(req.op(), "export");
    }

    #[test]
    fn ok_response_with_value() {
        let line = r#"{"ok":true,"value":{"kind":"number","value":41.7}}"#;
        let resp = BridgeResponse::parse(line).unwrap();
        assert_eq!(resp.into_result("get").unwrap(), Some(EngineValue::Number(41.7)));
    }

    #[test]
    fn error_response_becomes_rejected() {
        let resp = BridgeResponse::parse(r#"{"ok":false,"error":"no convergence"}"#).unwrap();
        assert_matches!(
            resp.into_result("calculate"),
            Err(EngineError::Rejected { op: "calculate", message }) if message == "no convergence"
        );
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert_matches!(BridgeResponse::parse("Segmentation fault"), Err(EngineError::Protocol(_)));
    }
}
