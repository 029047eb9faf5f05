//! Parsers for `.top`, `.events` and `.snap` files

use crate::models::snapshot::{GlobalSnapshot, RecordedMessage};
use crate::orchestrator::engine::{LinkConfig, NodeConfig, SimulatorConfig};
use crate::scenario::ScenarioError;
use std::str::FromStr;

/// One line of an event script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    /// `send src dest tokens`
    Send {
        src: String,
        dest: String,
        tokens: u64,
    },

    /// `snapshot node`
    Snapshot { node_id: String },

    /// `tick [n]`
    Tick(u64),
}

/// Non-comment, non-blank lines with their 1-based line numbers, split on whitespace
fn content_lines(input: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    input
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| (n, line.split_whitespace().collect()))
}

fn number<T: FromStr>(line: usize, field: &str, what: &str) -> Result<T, ScenarioError> {
    field
        .parse()
        .map_err(|_| ScenarioError::parse(line, format!("invalid {} {:?}", what, field)))
}

/// Parse a `.top` topology into a config with default seed and delay
pub fn parse_topology(input: &str) -> Result<SimulatorConfig, ScenarioError> {
    let mut config = SimulatorConfig::default();
    let mut nodes_left: Option<usize> = None;

    for (line, parts) in content_lines(input) {
        let Some(left) = nodes_left.as_mut() else {
            if parts.len() != 1 {
                return Err(ScenarioError::parse(line, "expected node count"));
            }
            nodes_left = Some(number(line, parts[0], "node count")?);
            continue;
        };

        let [first, second] = parts[..] else {
            return Err(ScenarioError::parse(
                line,
                format!("expected 2 fields, found {}", parts.len()),
            ));
        };

        if *left > 0 {
            config.nodes.push(NodeConfig {
                id: first.to_string(),
                tokens: number(line, second, "token count")?,
            });
            *left -= 1;
        } else {
            config.links.push(LinkConfig {
                src: first.to_string(),
                dest: second.to_string(),
            });
        }
    }

    match nodes_left {
        None => Err(ScenarioError::parse(0, "missing node count")),
        Some(left) if left > 0 => Err(ScenarioError::parse(
            0,
            format!("topology ended with {} node lines missing", left),
        )),
        Some(_) => Ok(config),
    }
}

/// Parse an `.events` script
pub fn parse_events(input: &str) -> Result<Vec<ScriptCommand>, ScenarioError> {
    content_lines(input)
        .map(|(line, parts)| parse_command(line, &parts))
        .collect()
}

fn parse_command(line: usize, parts: &[&str]) -> Result<ScriptCommand, ScenarioError> {
    match *parts {
        ["send", src, dest, tokens] => Ok(ScriptCommand::Send {
            src: src.to_string(),
            dest: dest.to_string(),
            tokens: number(line, tokens, "token amount")?,
        }),
        ["snapshot", node_id] => Ok(ScriptCommand::Snapshot {
            node_id: node_id.to_string(),
        }),
        ["tick"] => Ok(ScriptCommand::Tick(1)),
        ["tick", n] => Ok(ScriptCommand::Tick(number(line, n, "tick count")?)),
        [command, ..] => Err(ScenarioError::parse(
            line,
            format!("malformed {:?} command", command),
        )),
        [] => Err(ScenarioError::parse(line, "empty command")),
    }
}

/// Parse a `.snap` expected snapshot
pub fn parse_snapshot(input: &str) -> Result<GlobalSnapshot, ScenarioError> {
    let mut snapshot: Option<GlobalSnapshot> = None;

    for (line, parts) in content_lines(input) {
        let Some(current) = snapshot.as_mut() else {
            let [id] = parts[..] else {
                return Err(ScenarioError::parse(line, "expected snapshot id"));
            };
            snapshot = Some(GlobalSnapshot::new(number(line, id, "snapshot id")?));
            continue;
        };

        match parts[..] {
            [node_id, tokens] => {
                current
                    .token_map
                    .insert(node_id.to_string(), number(line, tokens, "token count")?);
            }
            [src, dest, message] => {
                let amount = message
                    .strip_prefix("token(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| {
                        ScenarioError::parse(line, format!("unknown message {:?}", message))
                    })?;
                current.messages.push(RecordedMessage::new(
                    src,
                    dest,
                    number(line, amount, "token amount")?,
                ));
            }
            _ => {
                return Err(ScenarioError::parse(
                    line,
                    format!("unexpected {} fields", parts.len()),
                ))
            }
        }
    }

    snapshot.ok_or_else(|| ScenarioError::parse(0, "missing snapshot id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topology_with_comments() {
        let config = parse_topology("# two nodes\n2\nN1 10\n\nN2 0\n# links\nN1 N2\n").unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].tokens, 10);
        assert_eq!(config.links.len(), 1);
        assert_eq!(config.links[0].dest, "N2");
    }

    #[test]
    fn test_parse_topology_missing_nodes() {
        assert!(matches!(
            parse_topology("3\nN1 1\nN2 2\n"),
            Err(ScenarioError::Parse { .. })
        ));
        assert!(parse_topology("# nothing\n").is_err());
    }

    #[test]
    fn test_parse_events() {
        let script = parse_events("send N1 N2 3\nsnapshot N2\ntick\ntick 4\n").unwrap();
        assert_eq!(
            script,
            vec![
                ScriptCommand::Send {
                    src: "N1".to_string(),
                    dest: "N2".to_string(),
                    tokens: 3
                },
                ScriptCommand::Snapshot {
                    node_id: "N2".to_string()
                },
                ScriptCommand::Tick(1),
                ScriptCommand::Tick(4),
            ]
        );
    }

    #[test]
    fn test_parse_events_reports_line_number() {
        match parse_events("tick\nsend N1 N2 lots\n") {
            Err(ScenarioError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(parse_events("teleport N1\n").is_err());
    }

    #[test]
    fn test_parse_snapshot() {
        let snapshot = parse_snapshot("1\nN1 4\nN2 0\nN2 N1 token(3)\nN2 N1 token(2)\n").unwrap();
        assert_eq!(snapshot.id, 1);
        assert_eq!(snapshot.token_map["N1"], 4);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.total_tokens(), 9);
    }

    #[test]
    fn test_parse_snapshot_rejects_markers() {
        assert!(parse_snapshot("0\nN1 N2 marker(0)\n").is_err());
    }
}
