//! ZK circuit definitions.

mod eligibility;
pub mod gadgets;

pub use eligibility::{EligibilityCircuit, SCORE_BITS};
