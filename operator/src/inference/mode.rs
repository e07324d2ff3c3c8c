use ome_types::DeploymentMode;
use std::str::FromStr;

/// Decides the deployment mode for one component (spec.md §4.5,
/// "Decision rules (applied top-down; first match wins)").
///
/// `cluster_allows_serverless` reflects the operator's own configuration
/// intent (`inferenceService` config subtree), not whether the Knative CRD
/// is actually installed — that live capability check happens at dispatch
/// time and is reported as the typed `ServerlessModeRejected` failure
/// (spec.md §8 scenario 6) rather than silently downgrading the mode here.
pub fn decide_mode(
    annotation_override: Option<&str>,
    has_leader_and_worker: bool,
    runtime_distributed: bool,
    cluster_allows_serverless: bool,
) -> DeploymentMode {
    if let Some(raw) = annotation_override {
        if let Ok(mode) = DeploymentMode::from_str(raw) {
            return mode;
        }
    }
    if has_leader_and_worker {
        DeploymentMode::MultiNode
    } else if runtime_distributed {
        DeploymentMode::MultiNodeRayVLLM
    } else if cluster_allows_serverless {
        DeploymentMode::Serverless
    } else {
        DeploymentMode::RawDeployment
    }
}

/// spec.md §4.5 "For the ingress layer, the chosen mode is router ?
/// router-mode : decoder ? decoder-mode : engine-mode (router wins because
/// it is the external hop)."
pub fn ingress_mode(
    router: Option<DeploymentMode>,
    decoder: Option<DeploymentMode>,
    engine: DeploymentMode,
) -> DeploymentMode {
    router.or(decoder).unwrap_or(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_override_wins_over_every_signal() {
        let mode = decide_mode(Some("VirtualDeployment"), true, true, true);
        assert_eq!(mode, DeploymentMode::VirtualDeployment);
    }

    #[test]
    fn unrecognized_annotation_falls_through_to_rules() {
        let mode = decide_mode(Some("not-a-real-mode"), false, false, true);
        assert_eq!(mode, DeploymentMode::Serverless);
    }

    #[test]
    fn leader_and_worker_takes_priority_over_ray_and_serverless() {
        let mode = decide_mode(None, true, true, true);
        assert_eq!(mode, DeploymentMode::MultiNode);
    }

    #[test]
    fn distributed_runtime_wins_over_serverless() {
        let mode = decide_mode(None, false, true, true);
        assert_eq!(mode, DeploymentMode::MultiNodeRayVLLM);
    }

    #[test]
    fn serverless_when_cluster_allows_it() {
        let mode = decide_mode(None, false, false, true);
        assert_eq!(mode, DeploymentMode::Serverless);
    }

    #[test]
    fn falls_back_to_raw_deployment_when_serverless_disallowed() {
        let mode = decide_mode(None, false, false, false);
        assert_eq!(mode, DeploymentMode::RawDeployment);
    }

    #[test]
    fn ingress_mode_prefers_router_over_decoder_over_engine() {
        assert_eq!(
            ingress_mode(Some(DeploymentMode::Serverless), Some(DeploymentMode::RawDeployment), DeploymentMode::MultiNode),
            DeploymentMode::Serverless
        );
        assert_eq!(
            ingress_mode(None, Some(DeploymentMode::RawDeployment), DeploymentMode::MultiNode),
            DeploymentMode::RawDeployment
        );
        assert_eq!(ingress_mode(None, None, DeploymentMode::MultiNode), DeploymentMode::MultiNode);
    }
}
