use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single constraint the proposal must respect, e.g. `{type: "budget", value: "< 5000"}`.
///
/// Both fields default to empty when absent so an incomplete constraint can be
/// loaded and then rejected by [`ProposalRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

impl Constraint {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// The immutable input of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalRequest {
    /// Problem statement the proposal answers
    pub problem: String,
    /// Ordered goals
    pub goals: Vec<String>,
    /// Constraints, each with a type and a value
    pub constraints: Vec<Constraint>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Problem statement is empty")]
    EmptyProblem,

    #[error("Constraint #{index} is missing its '{missing}' field")]
    InvalidConstraint { index: usize, missing: &'static str },
}

impl ProposalRequest {
    pub fn new(problem: impl Into<String>, goals: Vec<String>, constraints: Vec<Constraint>) -> Self {
        Self {
            problem: problem.into(),
            goals,
            constraints,
        }
    }

    /// Check the request before any backend is contacted
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.problem.trim().is_empty() {
            return Err(RequestError::EmptyProblem);
        }

        for (index, constraint) in self.constraints.iter().enumerate() {
            if constraint.kind.trim().is_empty() {
                return Err(RequestError::InvalidConstraint {
                    index,
                    missing: "type",
                });
            }
            if constraint.value.trim().is_empty() {
                return Err(RequestError::InvalidConstraint {
                    index,
                    missing: "value",
                });
            }
        }

        Ok(())
    }

    /// Goals rendered as a bullet list
    pub fn goals_text(&self) -> String {
        bullet_list(self.goals.iter().map(String::as_str))
    }

    /// Constraints rendered as `- type: value` lines
    pub fn constraints_text(&self) -> String {
        let lines: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{}: {}", c.kind, c.value))
            .collect();
        bullet_list(lines.iter().map(String::as_str))
    }
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<String> = items.map(|item| format!("- {}", item)).collect();
    if lines.is_empty() {
        "- (none)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProposalRequest {
        ProposalRequest::new(
            "How can the team collaborate better?",
            vec!["Low cost".into(), "Works remotely".into()],
            vec![Constraint::new("time", "one month")],
        )
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn constraint_without_value_is_rejected() {
        let constraint: Constraint = serde_json::from_str(r#"{"type": "x"}"#).unwrap();
        let mut request = sample();
        request.constraints.push(constraint);
        assert_eq!(
            request.validate(),
            Err(RequestError::InvalidConstraint {
                index: 1,
                missing: "value"
            })
        );
    }

    #[test]
    fn constraint_without_type_is_rejected() {
        let constraint: Constraint = serde_json::from_str(r#"{"value": "cheap"}"#).unwrap();
        let request = ProposalRequest::new("problem", vec![], vec![constraint]);
        assert_eq!(
            request.validate(),
            Err(RequestError::InvalidConstraint {
                index: 0,
                missing: "type"
            })
        );
    }

    #[test]
    fn blank_problem_is_rejected() {
        let request = ProposalRequest::new("   ", vec![], vec![]);
        assert_eq!(request.validate(), Err(RequestError::EmptyProblem));
    }

    #[test]
    fn goals_must_be_a_list() {
        let raw = r#"{"problem": "p", "goals": "just one goal", "constraints": []}"#;
        assert!(serde_json::from_str::<ProposalRequest>(raw).is_err());
    }

    #[test]
    fn goals_and_constraints_are_required() {
        assert!(serde_json::from_str::<ProposalRequest>(r#"{"problem": "p"}"#).is_err());
        assert!(
            serde_json::from_str::<ProposalRequest>(r#"{"problem": "p", "goals": []}"#).is_err()
        );
        assert!(serde_json::from_str::<ProposalRequest>(
            r#"{"problem": "p", "goals": [], "constraints": []}"#
        )
        .is_ok());
    }

    #[test]
    fn loads_from_toml() {
        let raw = r#"
problem = "Reduce onboarding time"
goals = ["Halve time to first commit"]

[[constraints]]
type = "budget"
value = "no new tooling spend"
"#;
        let request: ProposalRequest = toml::from_str(raw).unwrap();
        assert_eq!(request.constraints[0].kind, "budget");
        assert_eq!(request.validate(), Ok(()));
    }

    #[test]
    fn renders_prompt_lists() {
        let request = sample();
        assert_eq!(request.goals_text(), "- Low cost\n- Works remotely");
        assert_eq!(request.constraints_text(), "- time: one month");

        let empty = ProposalRequest::new("p", vec![], vec![]);
        assert_eq!(empty.goals_text(), "- (none)");
    }
}
