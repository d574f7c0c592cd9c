//! Reasoning chain domain types and the per-chain state machine.
//!
//! A chain starts `in_progress`, accumulates immutable numbered steps, and
//! ends with exactly one terminal transition to `completed` or `failed`.
//! Terminal transitions are irreversible; a repeated conclude with the same
//! outcome is accepted, a conflicting one is rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::utc_now_iso;
use crate::error::{HubError, HubResult};

/// Chain lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    InProgress,
    Completed,
    Failed,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::InProgress => "in_progress",
            ChainStatus::Completed => "completed",
            ChainStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChainStatus::InProgress)
    }
}

impl std::str::FromStr for ChainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ChainStatus::InProgress),
            "completed" => Ok(ChainStatus::Completed),
            "failed" => Ok(ChainStatus::Failed),
            _ => Err(format!("unknown chain status: {}", s)),
        }
    }
}

/// Kind of one reasoning step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Observation,
    Analysis,
    Inference,
    Conclusion,
    Question,
    Hypothesis,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Observation => "observation",
            StepType::Analysis => "analysis",
            StepType::Inference => "inference",
            StepType::Conclusion => "conclusion",
            StepType::Question => "question",
            StepType::Hypothesis => "hypothesis",
        }
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observation" => Ok(StepType::Observation),
            "analysis" => Ok(StepType::Analysis),
            "inference" => Ok(StepType::Inference),
            "conclusion" => Ok(StepType::Conclusion),
            "question" => Ok(StepType::Question),
            "hypothesis" => Ok(StepType::Hypothesis),
            _ => Err(format!("unknown step type: {}", s)),
        }
    }
}

/// One immutable reasoning step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_number: u32,
    pub thought: String,
    pub step_type: StepType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub created_at: String,
}

/// One reasoning chain with its ordered steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub status: ChainStatus,
    #[serde(default)]
    pub steps: Vec<ReasoningStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_from: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Whether the terminal export reached the notebook; retried on access
    /// when false.
    #[serde(default)]
    pub exported: bool,
}

impl ReasoningChain {
    pub fn new(prompt: impl Into<String>) -> Self {
        let now = utc_now_iso();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            goal: None,
            context: None,
            tags: Vec::new(),
            status: ChainStatus::InProgress,
            steps: Vec::new(),
            conclusion: None,
            confidence: None,
            branch_from: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
            exported: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Appends the next step. Step numbers are contiguous from 1; terminal
    /// chains reject appends.
    pub fn add_step(
        &mut self,
        thought: impl Into<String>,
        step_type: StepType,
        confidence: Option<f64>,
        data: Option<Value>,
    ) -> HubResult<&ReasoningStep> {
        if self.is_terminal() {
            return Err(HubError::InvalidInput(format!(
                "chain {} is {}; no further steps",
                self.id,
                self.status.as_str()
            )));
        }
        if let Some(c) = confidence {
            validate_confidence(c)?;
        }
        let step = ReasoningStep {
            step_number: self.steps.len() as u32 + 1,
            thought: thought.into(),
            step_type,
            confidence,
            data,
            created_at: utc_now_iso(),
        };
        self.steps.push(step);
        self.updated_at = utc_now_iso();
        Ok(self.steps.last().expect("step just pushed"))
    }

    /// Terminal transition. Repeating an identical conclude is a no-op
    /// success; a conflicting conclude is rejected.
    pub fn conclude(
        &mut self,
        conclusion: impl Into<String>,
        success: bool,
        confidence: Option<f64>,
    ) -> HubResult<()> {
        let conclusion = conclusion.into();
        let target = if success {
            ChainStatus::Completed
        } else {
            ChainStatus::Failed
        };
        if let Some(c) = confidence {
            validate_confidence(c)?;
        }
        if self.is_terminal() {
            if self.status == target && self.conclusion.as_deref() == Some(conclusion.as_str()) {
                return Ok(());
            }
            return Err(HubError::InvalidInput(format!(
                "chain {} already concluded as {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = target;
        self.conclusion = Some(conclusion);
        if confidence.is_some() {
            self.confidence = confidence;
        }
        let now = utc_now_iso();
        self.updated_at = now.clone();
        self.completed_at = Some(now);
        Ok(())
    }

    /// Copies steps `1..=at_step` (all when `None`) into a fresh
    /// `in_progress` chain tagged `branch`. The original is untouched.
    pub fn branch(&self, at_step: Option<u32>) -> HubResult<ReasoningChain> {
        let cut = match at_step {
            Some(n) => {
                if n == 0 || n as usize > self.steps.len() {
                    return Err(HubError::InvalidInput(format!(
                        "branch point {} outside 1..={}",
                        n,
                        self.steps.len()
                    )));
                }
                n as usize
            }
            None => self.steps.len(),
        };
        let mut child = ReasoningChain::new(self.prompt.clone());
        child.goal = self.goal.clone();
        child.context = self.context.clone();
        child.tags = self.tags.clone();
        if !child.tags.iter().any(|t| t == "branch") {
            child.tags.push("branch".to_string());
        }
        child.branch_from = Some(self.id.clone());
        child.steps = self.steps[..cut].to_vec();
        Ok(child)
    }
}

fn validate_confidence(c: f64) -> HubResult<()> {
    if (0.0..=1.0).contains(&c) {
        Ok(())
    } else {
        Err(HubError::InvalidInput(format!(
            "confidence {} outside [0, 1]",
            c
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: steps number contiguously from 1 and each append grows
    /// the chain by one.
    #[test]
    fn step_numbering() {
        let mut chain = ReasoningChain::new("why?");
        for i in 1..=5u32 {
            let step = chain
                .add_step(format!("step {}", i), StepType::Analysis, None, None)
                .unwrap();
            assert_eq!(step.step_number, i);
        }
        let numbers: Vec<u32> = chain.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    /// **Scenario**: terminal chains reject add_step.
    #[test]
    fn terminal_rejects_steps() {
        let mut chain = ReasoningChain::new("q");
        chain.conclude("done", true, Some(0.9)).unwrap();
        let err = chain
            .add_step("late", StepType::Observation, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    /// **Scenario**: conclude is idempotent for an identical outcome and
    /// rejects a conflicting one.
    #[test]
    fn conclude_idempotency() {
        let mut chain = ReasoningChain::new("q");
        chain.conclude("answer", true, None).unwrap();
        assert_eq!(chain.status, ChainStatus::Completed);
        assert!(chain.completed_at.is_some());

        chain.conclude("answer", true, None).unwrap();
        let err = chain.conclude("different", true, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        let err = chain.conclude("answer", false, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    /// **Scenario**: failure conclude lands in `failed`, also terminal.
    #[test]
    fn failed_conclude() {
        let mut chain = ReasoningChain::new("q");
        chain.conclude("dead end", false, None).unwrap();
        assert_eq!(chain.status, ChainStatus::Failed);
        assert!(chain.is_terminal());
    }

    /// **Scenario**: branch copies a prefix, tags the child, and leaves the
    /// parent untouched; branching a terminal chain is permitted.
    #[test]
    fn branching() {
        let mut chain = ReasoningChain::new("q");
        chain
            .add_step("one", StepType::Observation, None, Some(json!({"k": 1})))
            .unwrap();
        chain.add_step("two", StepType::Inference, None, None).unwrap();
        chain.conclude("done", true, None).unwrap();

        let child = chain.branch(Some(1)).unwrap();
        assert_eq!(child.status, ChainStatus::InProgress);
        assert_eq!(child.steps.len(), 1);
        assert_eq!(child.steps[0].thought, "one");
        assert_eq!(child.branch_from.as_deref(), Some(chain.id.as_str()));
        assert!(child.tags.contains(&"branch".to_string()));
        assert_eq!(chain.steps.len(), 2);
        assert!(chain.is_terminal());

        let full = chain.branch(None).unwrap();
        assert_eq!(full.steps.len(), 2);

        assert!(chain.branch(Some(0)).is_err());
        assert!(chain.branch(Some(3)).is_err());
    }

    /// **Scenario**: confidence outside [0, 1] is invalid everywhere.
    #[test]
    fn confidence_bounds() {
        let mut chain = ReasoningChain::new("q");
        assert!(chain
            .add_step("x", StepType::Analysis, Some(1.5), None)
            .is_err());
        assert!(chain.conclude("x", true, Some(-0.1)).is_err());
        assert!(chain.conclude("x", true, Some(1.0)).is_ok());
    }

    /// **Scenario**: status strings round-trip for persistence.
    #[test]
    fn status_round_trip() {
        for status in [ChainStatus::InProgress, ChainStatus::Completed, ChainStatus::Failed] {
            assert_eq!(status.as_str().parse::<ChainStatus>().unwrap(), status);
        }
        for step in [
            StepType::Observation,
            StepType::Analysis,
            StepType::Inference,
            StepType::Conclusion,
            StepType::Question,
            StepType::Hypothesis,
        ] {
            assert_eq!(step.as_str().parse::<StepType>().unwrap(), step);
        }
    }
}
