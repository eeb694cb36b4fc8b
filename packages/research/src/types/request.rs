//! Research request and plan types.

use serde::{Deserialize, Serialize};

use crate::error::ResearchError;

/// Coarse knob for subquery count and per-query result size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    #[default]
    Normal,
    Deep,
}

impl Depth {
    /// Maximum number of planned subqueries.
    pub fn subquery_cap(&self) -> usize {
        match self {
            Depth::Quick => 3,
            Depth::Normal => 4,
            Depth::Deep => 6,
        }
    }

    /// Results requested per subquery search.
    pub fn results_per_query(&self) -> usize {
        match self {
            Depth::Quick => 5,
            Depth::Normal => 8,
            Depth::Deep => 10,
        }
    }
}

/// Optional publication window constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// A research run request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub question: String,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub disallowed_domains: Vec<String>,
    #[serde(default)]
    pub visitor_id: Option<String>,
}

impl ResearchRequest {
    /// Minimal request for the given question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            depth: Depth::default(),
            time_range: None,
            region: None,
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
            visitor_id: None,
        }
    }

    /// Set the depth.
    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    /// Reject malformed requests before any pipeline work happens.
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.question.trim().chars().count() < 8 {
            return Err(ResearchError::InvalidInput {
                reason: "question must be at least 8 characters".to_string(),
            });
        }
        Ok(())
    }
}

/// The planner's decomposition of a question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub subqueries: Vec<String>,
    #[serde(default)]
    pub focus: Vec<String>,
}

impl Plan {
    /// Fallback plan when the planner output cannot be parsed: the question
    /// itself is the only subquery.
    pub fn naive(question: &str) -> Self {
        Self {
            intent: None,
            subqueries: vec![question.to_string()],
            focus: Vec::new(),
        }
    }

    /// Cap subqueries by depth, always keeping at least one.
    pub fn capped(mut self, depth: Depth, question: &str) -> Self {
        self.subqueries.retain(|q| !q.trim().is_empty());
        if self.subqueries.is_empty() {
            self.subqueries.push(question.to_string());
        }
        self.subqueries.truncate(depth.subquery_cap());
        self
    }
}
