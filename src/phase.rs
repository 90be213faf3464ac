//! The fixed 7-phase pipeline, represented as data.
//!
//! Phases are structurally identical (generate → score → maybe-feedback →
//! advance), so each one is a `PhasePlan` row driving the single generic
//! executor rather than a branch per phase. Feedback enablement is a
//! configuration fact and deliberately not part of this table.

use crate::gateway::GenerationParams;

/// Number of phases in every session. Fixed cardinality and order.
pub const PHASE_COUNT: u8 = 7;

/// Static description of one phase: id, display name, and the base
/// generation parameters sent to the gateway.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub id: u8,
    pub name: &'static str,
    pub params: GenerationParams,
}

impl PhasePlan {
    fn new(id: u8, name: &'static str, medium: &str) -> Self {
        let mut params = GenerationParams::default();
        params.set("medium", medium);
        params.set("phase", name);
        Self { id, name, params }
    }
}

/// The full ordered phase table.
pub fn phase_plans() -> Vec<PhasePlan> {
    vec![
        PhasePlan::new(1, "concept", "text"),
        PhasePlan::new(2, "outline", "text"),
        PhasePlan::new(3, "draft", "text"),
        PhasePlan::new(4, "imagery", "image"),
        PhasePlan::new(5, "refinement", "text"),
        PhasePlan::new(6, "layout", "image"),
        PhasePlan::new(7, "final", "text"),
    ]
}

/// Look up a single phase plan by id.
pub fn plan_for(id: u8) -> Option<PhasePlan> {
    phase_plans().into_iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_seven_ordered_phases() {
        let plans = phase_plans();
        assert_eq!(plans.len(), PHASE_COUNT as usize);
        for (i, plan) in plans.iter().enumerate() {
            assert_eq!(plan.id as usize, i + 1);
        }
    }

    #[test]
    fn plan_params_carry_medium_and_phase_name() {
        let plan = plan_for(4).unwrap();
        assert_eq!(plan.name, "imagery");
        assert_eq!(plan.params.get("medium"), Some("image"));
        assert_eq!(plan.params.get("phase"), Some("imagery"));
    }

    #[test]
    fn plan_for_unknown_id_is_none() {
        assert!(plan_for(0).is_none());
        assert!(plan_for(8).is_none());
    }
}
