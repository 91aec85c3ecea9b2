//! Console summary of a CAD calls response.

use std::io::{self, Write};

use serde_json::{Map, Value};

const UNKNOWN: &str = "Unknown";

/// Read-only view over one entry of `CADCalls`.
pub struct CallRecord<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> CallRecord<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Field as display text; missing or null fields read `Unknown`.
    pub fn text(&self, key: &str) -> String {
        match self.fields.get(key) {
            None | Some(Value::Null) => UNKNOWN.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// `StartTime` as `YYYY-MM-DD HH:MM:SS`, timezone dropped.
    pub fn start_time(&self) -> String {
        match self.fields.get("StartTime") {
            Some(Value::String(raw)) => format_start_time(raw),
            _ => self.text("StartTime"),
        }
    }

    pub fn has_location(&self) -> bool {
        match self.fields.get("HasLocation") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(_) => true,
        }
    }
}

/// Split an ISO-style timestamp into date and time and drop the offset.
///
/// `2024-03-01T12:34:56.123-05:00` becomes `2024-03-01 12:34:56.123`.
/// Strings without a `T` are returned unchanged.
pub fn format_start_time(raw: &str) -> String {
    let Some((date, time)) = raw.split_once('T') else {
        return raw.to_string();
    };
    let time = time
        .split(['-', '+', 'Z'])
        .next()
        .unwrap_or(time);
    format!("{date} {time}")
}

/// Print a decoded response body.
pub fn render_calls(data: &Value, out: &mut impl Write) -> io::Result<()> {
    let Some(calls) = data.get("CADCalls").and_then(Value::as_array) else {
        writeln!(out, "No CAD calls data found in response")?;
        return Ok(());
    };

    let total = match data.get("Total") {
        Some(Value::Null) | None => calls.len().to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    writeln!(out, "\n=== CAD Calls ({total} total) ===\n")?;

    if calls.is_empty() {
        writeln!(out, "No calls found matching your criteria.")?;
        return Ok(());
    }

    let empty = Map::new();
    for (i, call) in calls.iter().enumerate() {
        let record = CallRecord::new(call.as_object().unwrap_or(&empty));
        writeln!(out, "Call #{}:", i + 1)?;
        writeln!(out, "  Status: {}", record.text("CallType"))?;
        writeln!(out, "  Time: {}", record.start_time())?;
        writeln!(out, "  Nature: {}", record.text("Nature"))?;
        writeln!(out, "  Address: {}", record.text("Address"))?;
        writeln!(out, "  Agency: {}", record.text("Agency"))?;
        writeln!(out, "  Incident ID: {}", record.text("IncidentId"))?;
        if record.has_location() {
            writeln!(
                out,
                "  Location: ({}, {})",
                record.text("Latitude"),
                record.text("Longitude")
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(data: &Value) -> String {
        let mut buf = Vec::new();
        render_calls(data, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_renders_total_and_blocks() {
        let data = json!({
            "CADCalls": [
                {
                    "CallType": "Open",
                    "StartTime": "2024-03-01T12:34:56-05:00",
                    "Nature": "TRAFFIC STOP",
                    "Address": "5800 SUNSET DR",
                    "Agency": "South Miami PD",
                    "IncidentId": 1234567,
                    "HasLocation": true,
                    "Latitude": 25.7069,
                    "Longitude": -80.2928
                },
                {
                    "CallType": "Closed",
                    "StartTime": "2024-03-01T11:00:00",
                    "Nature": "ALARM",
                    "HasLocation": false
                }
            ],
            "Total": 57
        });
        let text = render(&data);

        assert!(text.contains("=== CAD Calls (57 total) ==="));
        assert_eq!(text.matches("Call #").count(), 2);
        assert!(text.contains("  Status: Open\n"));
        assert!(text.contains("  Time: 2024-03-01 12:34:56\n"));
        assert!(text.contains("  Incident ID: 1234567\n"));
        assert!(text.contains("  Location: (25.7069, -80.2928)\n"));
        assert!(text.contains("  Time: 2024-03-01 11:00:00\n"));
        assert!(text.contains("  Address: Unknown\n"));
        assert_eq!(text.matches("Location:").count(), 1);
    }

    #[test]
    fn test_total_defaults_to_length() {
        let text = render(&json!({ "CADCalls": [{}, {}, {}] }));
        assert!(text.contains("(3 total)"));
        assert_eq!(text.matches("  Status: Unknown").count(), 3);
    }

    #[test]
    fn test_empty_calls() {
        let text = render(&json!({ "CADCalls": [], "Total": 0 }));
        assert!(text.contains("(0 total)"));
        assert!(text.contains("No calls found matching your criteria."));
        assert!(!text.contains("Call #"));
    }

    #[test]
    fn test_missing_calls_field() {
        assert_eq!(
            render(&json!({ "Message": "error" })),
            "No CAD calls data found in response\n"
        );
        assert_eq!(
            render(&json!({ "CADCalls": "nope" })),
            "No CAD calls data found in response\n"
        );
    }

    #[test]
    fn test_format_start_time() {
        assert_eq!(format_start_time("2024-03-01T12:34:56-05:00"), "2024-03-01 12:34:56");
        assert_eq!(format_start_time("2024-03-01T12:34:56+01:00"), "2024-03-01 12:34:56");
        assert_eq!(format_start_time("2024-03-01T12:34:56Z"), "2024-03-01 12:34:56");
        assert_eq!(format_start_time("2024-03-01T12:34:56.5"), "2024-03-01 12:34:56.5");
        assert_eq!(format_start_time("yesterday"), "yesterday");
    }

    #[test]
    fn test_non_string_start_time_is_shown_raw() {
        let text = render(&json!({ "CADCalls": [{ "StartTime": 17 }, { "StartTime": null }] }));
        assert!(text.contains("  Time: 17\n"));
        assert!(text.contains("  Time: Unknown\n"));
    }
}
