/*!
 * Types exposed to the flow/automation surface.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use muxnode_core::types::EndpointId;

use crate::error::Error;

/// A row in the endpoint autocomplete listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSummary {
    /// The endpoint id
    pub id: EndpointId,
    /// The endpoint's resolved display name
    pub label: String,
}

/// Comparison operators for condition evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Ge,
    /// Less than
    Lt,
    /// Less than or equal to
    Le,
}

impl CompareOp {
    /// Evaluate the comparison of two values
    pub fn evaluate(&self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        };
        write!(f, "{}", token)
    }
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(CompareOp::Eq),
            "ne" => Ok(CompareOp::Ne),
            "gt" => Ok(CompareOp::Gt),
            "ge" => Ok(CompareOp::Ge),
            "lt" => Ok(CompareOp::Lt),
            "le" => Ok(CompareOp::Le),
            other => Err(Error::invalid_command(format!(
                "unknown comparison operator: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate() {
        assert!(CompareOp::Eq.evaluate(0.5, 0.5));
        assert!(!CompareOp::Eq.evaluate(0.5, 0.6));
        assert!(CompareOp::Ne.evaluate(0.5, 0.6));
        assert!(CompareOp::Gt.evaluate(0.8, 0.5));
        assert!(CompareOp::Ge.evaluate(0.5, 0.5));
        assert!(CompareOp::Lt.evaluate(0.2, 0.5));
        assert!(CompareOp::Le.evaluate(0.5, 0.5));
    }

    #[test]
    fn test_parse() {
        assert_eq!("gt".parse::<CompareOp>().unwrap(), CompareOp::Gt);
        assert_eq!("le".parse::<CompareOp>().unwrap(), CompareOp::Le);
        assert!("between".parse::<CompareOp>().is_err());
    }
}
