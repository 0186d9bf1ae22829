//! Termination conditions evaluated after every appended turn.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Turn;

/// Which turns a [`TerminationCondition::TextMention`] inspects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionScope {
    #[default]
    FullTranscript,
    LatestTurn,
}

/// When a session should stop. Evaluation is pure.
///
/// # Examples
/// ```
/// use autogen_agentchat::team::TerminationCondition;
///
/// let stop = TerminationCondition::any_of(vec![
///     TerminationCondition::text_mention("TERMINATE"),
///     TerminationCondition::max_turns(10),
/// ]);
/// assert!(!stop.is_satisfied(&[], &["a".to_string()]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationCondition {
    TextMention {
        text: String,
        #[serde(default)]
        scope: MentionScope,
    },
    MaxTurns {
        max_turns: u64,
    },
    AllParticipantsIdle,
    AnyOf {
        conditions: Vec<TerminationCondition>,
    },
    AllOf {
        conditions: Vec<TerminationCondition>,
    },
}

impl TerminationCondition {
    pub fn text_mention(text: impl Into<String>) -> Self {
        TerminationCondition::TextMention {
            text: text.into(),
            scope: MentionScope::FullTranscript,
        }
    }

    pub fn max_turns(max_turns: u64) -> Self {
        TerminationCondition::MaxTurns { max_turns }
    }

    pub fn any_of(conditions: Vec<TerminationCondition>) -> Self {
        TerminationCondition::AnyOf { conditions }
    }

    pub fn all_of(conditions: Vec<TerminationCondition>) -> Self {
        TerminationCondition::AllOf { conditions }
    }

    /// Structural problems that would make the condition unusable
    pub fn validate(&self) -> Result<(), String> {
        match self {
            TerminationCondition::TextMention { text, .. } if text.is_empty() => {
                Err("text_mention requires non-empty text".to_string())
            }
            TerminationCondition::MaxTurns { max_turns: 0 } => Err("max_turns must be at least 1".to_string()),
            TerminationCondition::AnyOf { conditions } | TerminationCondition::AllOf { conditions } => {
                if conditions.is_empty() {
                    return Err("combinators need at least one condition".to_string());
                }
                conditions.iter().try_for_each(TerminationCondition::validate)
            }
            _ => Ok(()),
        }
    }

    /// Whether the session should end after `turns`.
    ///
    /// # Arguments
    /// * `turns` - The full transcript, in sequence order
    /// * `participants` - Ids of every participant in the session
    pub fn is_satisfied(&self, turns: &[Turn], participants: &[String]) -> bool {
        match self {
            TerminationCondition::TextMention { text, scope } => match scope {
                MentionScope::FullTranscript => turns.iter().any(|t| t.message.contains(text.as_str())),
                MentionScope::LatestTurn => turns.last().is_some_and(|t| t.message.contains(text.as_str())),
            },
            TerminationCondition::MaxTurns { max_turns } => turns.len() as u64 >= *max_turns,
            TerminationCondition::AllParticipantsIdle => all_idle(turns, participants),
            TerminationCondition::AnyOf { conditions } => {
                conditions.iter().any(|c| c.is_satisfied(turns, participants))
            }
            TerminationCondition::AllOf { conditions } => {
                !conditions.is_empty() && conditions.iter().all(|c| c.is_satisfied(turns, participants))
            }
        }
    }
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCondition::TextMention { text, .. } => write!(f, "text_mention({})", text),
            TerminationCondition::MaxTurns { max_turns } => write!(f, "max_turns({})", max_turns),
            TerminationCondition::AllParticipantsIdle => f.write_str("all_participants_idle"),
            TerminationCondition::AnyOf { conditions } => write_list(f, "any_of", conditions),
            TerminationCondition::AllOf { conditions } => write_list(f, "all_of", conditions),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, conditions: &[TerminationCondition]) -> fmt::Result {
    let parts: Vec<String> = conditions.iter().map(ToString::to_string).collect();
    write!(f, "{}({})", name, parts.join(", "))
}

/// Every participant has spoken and each one's latest turn was idle
fn all_idle(turns: &[Turn], participants: &[String]) -> bool {
    if participants.is_empty() {
        return false;
    }
    participants.iter().all(|id| {
        let mut own = turns.iter().rev().filter(|t| &t.participant_id == id);
        match own.next() {
            Some(latest) => latest.is_idle(own.next()),
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(seq: u64, who: &str, message: &str) -> Turn {
        Turn {
            session_id: "s".to_string(),
            participant_id: who.to_string(),
            sequence_number: seq,
            message: message.to_string(),
            tool_calls: Vec::new(),
            handoff: None,
            limitation: None,
            created_at: Utc::now(),
        }
    }

    fn ids() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn test_text_mention_scopes() {
        let turns = vec![turn(1, "a", "done, TERMINATE"), turn(2, "b", "more")];
        assert!(TerminationCondition::text_mention("TERMINATE").is_satisfied(&turns, &ids()));
        let latest = TerminationCondition::TextMention {
            text: "TERMINATE".to_string(),
            scope: MentionScope::LatestTurn,
        };
        assert!(!latest.is_satisfied(&turns, &ids()));
        assert!(latest.is_satisfied(&turns[..1], &ids()));
    }

    #[test]
    fn test_max_turns() {
        let condition = TerminationCondition::max_turns(2);
        assert!(!condition.is_satisfied(&[turn(1, "a", "x")], &ids()));
        assert!(condition.is_satisfied(&[turn(1, "a", "x"), turn(2, "b", "y")], &ids()));
    }

    #[test]
    fn test_all_participants_idle() {
        let condition = TerminationCondition::AllParticipantsIdle;
        let mut turns = vec![turn(1, "a", "plan"), turn(2, "b", "ok")];
        assert!(!condition.is_satisfied(&turns, &ids()));

        turns.push(turn(3, "a", "plan"));
        assert!(!condition.is_satisfied(&turns, &ids()));

        turns.push(turn(4, "b", "ok"));
        assert!(condition.is_satisfied(&turns, &ids()));

        assert!(!condition.is_satisfied(&[turn(1, "a", "")], &ids()));
    }

    #[test]
    fn test_combinators() {
        let turns = vec![turn(1, "a", "hello")];
        let any = TerminationCondition::any_of(vec![
            TerminationCondition::text_mention("bye"),
            TerminationCondition::max_turns(1),
        ]);
        let all = TerminationCondition::all_of(vec![
            TerminationCondition::text_mention("bye"),
            TerminationCondition::max_turns(1),
        ]);
        assert!(any.is_satisfied(&turns, &ids()));
        assert!(!all.is_satisfied(&turns, &ids()));
        assert_eq!(any.to_string(), "any_of(text_mention(bye), max_turns(1))");
    }

    #[test]
    fn test_validate() {
        assert!(TerminationCondition::max_turns(0).validate().is_err());
        assert!(TerminationCondition::any_of(vec![]).validate().is_err());
        assert!(TerminationCondition::text_mention("STOP").validate().is_ok());
    }

    #[test]
    fn test_serde_tagging() {
        let parsed: TerminationCondition =
            serde_json::from_str(r#"{"type": "text_mention", "text": "TERMINATE"}"#).unwrap();
        assert_eq!(parsed, TerminationCondition::text_mention("TERMINATE"));
        let parsed: TerminationCondition = serde_json::from_str(r#"{"type": "max_turns", "max_turns": 5}"#).unwrap();
        assert_eq!(parsed, TerminationCondition::max_turns(5));
    }
}
