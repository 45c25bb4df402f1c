use super::ArbiterControl;
use crate::error::ProtocolError;
use serde_json::Value;
use tracing::debug;

/// Locate a JSON object in arbiter output.
///
/// First the whole text, then the slice from the first `{` to the last `}`.
fn extract_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = raw.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn non_empty(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Interpret one arbiter response.
///
/// Text with no control object in it (no JSON, or JSON carrying neither
/// `state` nor `final_markdown`) is taken verbatim as the final report.
/// A control object that is neither a complete query nor a final report is a
/// protocol error.
pub fn parse_control(raw: &str) -> Result<ArbiterControl, ProtocolError> {
    let Some(map) = extract_object(raw) else {
        debug!("Arbiter output is not JSON; using it as the final report");
        return Ok(ArbiterControl::Final {
            report: raw.trim().to_string(),
        });
    };

    if !map.contains_key("state") && !map.contains_key("final_markdown") {
        debug!("JSON in arbiter output is not a control object; using the text as the final report");
        return Ok(ArbiterControl::Final {
            report: raw.trim().to_string(),
        });
    }

    let state = map.get("state").and_then(Value::as_str).unwrap_or_default();
    match state {
        "query" => match (
            non_empty(&map, "target_reviewer"),
            non_empty(&map, "question"),
        ) {
            (Some(target), Some(question)) => {
                if let Some(reason) = non_empty(&map, "reason") {
                    debug!("Arbiter query reason: {}", reason);
                }
                Ok(ArbiterControl::Query { target, question })
            }
            _ => Err(ProtocolError::MalformedControl {
                raw: raw.trim().to_string(),
            }),
        },
        _ => match map.get("final_markdown").and_then(Value::as_str) {
            Some(report) if state == "final" || !report.trim().is_empty() => {
                Ok(ArbiterControl::Final {
                    report: report.trim().to_string(),
                })
            }
            _ => Err(ProtocolError::MalformedControl {
                raw: raw.trim().to_string(),
            }),
        },
    }
}
