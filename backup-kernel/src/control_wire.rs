//! Line-delimited JSON verb protocol for the control server.

use serde::{Deserialize, Serialize};

/// One control-wire frame: a verb plus its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlFrame {
    /// The requested operation.
    #[serde(default)]
    pub verb: Option<Verb>,
    /// Arguments supplied with the verb.
    #[serde(default)]
    pub args: ControlArgs,
}

/// The three verbs the control server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verb {
    /// Registers a new agent.
    #[serde(rename = "REGISTER")]
    Register,
    /// Removes a registered agent.
    #[serde(rename = "UNREGISTER")]
    Unregister,
    /// Streams back an agent's `Log` file.
    #[serde(rename = "QUERY")]
    Query,
}

/// Arguments carried by a [`ControlFrame`]. All fields are optional at the
/// wire level; validity is checked per-verb by the control server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlArgs {
    /// Agent host.
    #[serde(default)]
    pub ip: Option<String>,
    /// Agent port.
    #[serde(default)]
    pub port: Option<String>,
    /// Directory path served by the agent.
    #[serde(default)]
    pub path: Option<String>,
    /// Requested pull cadence (REGISTER only).
    #[serde(default)]
    pub freq: Option<String>,
}

impl ControlFrame {
    /// Parses a single line of control-wire JSON.
    ///
    /// Malformed JSON is treated as an empty frame (no verb, no args) rather
    /// than a parse error, so downstream validation produces the normal
    /// "missing required field" response instead of a protocol-level crash.
    #[must_use]
    pub fn parse_line(line: &str) -> Self {
        serde_json::from_str(line).unwrap_or_else(|_| Self {
            verb: None,
            args: ControlArgs::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_frame() {
        let line = r#"{"Verb":"REGISTER","Args":{"Ip":"10.0.0.2","Port":"9000","Path":"/data","Freq":"1s"}}"#;
        let frame = ControlFrame::parse_line(line);
        assert_eq!(frame.verb, Some(Verb::Register));
        assert_eq!(frame.args.ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(frame.args.freq.as_deref(), Some("1s"));
    }

    #[test]
    fn malformed_json_becomes_empty_frame() {
        let frame = ControlFrame::parse_line("not json at all");
        assert!(frame.verb.is_none());
        assert!(frame.args.ip.is_none());
    }

    #[test]
    fn unknown_verb_fails_to_parse_into_known_variant() {
        let frame = ControlFrame::parse_line(r#"{"Verb":"DESTROY","Args":{}}"#);
        assert!(frame.verb.is_none());
    }
}
