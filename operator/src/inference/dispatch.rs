use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Api, Client};
use ome_types::{
    DeploymentMode, FailureReason, InferenceService, KnativeService, KnativeServiceSpec,
    LeaderWorkerSet, LeaderWorkerSetSpec, RayService, RayServiceSpec, TrafficTarget,
};
use std::collections::BTreeMap;

use super::actions::{delete_if_present, owner_ref, reconcile_owned};
use crate::util::{messages, Error};

/// Input to [`dispatch`]: everything resolver+render already produced for
/// one component (spec.md §4.6 steps 1-4). `VirtualDeployment` never
/// reaches here -- it short-circuits reconciliation before any child
/// object is rendered (spec.md §4.5).
pub struct RenderedComponent {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub pod_template: PodTemplateSpec,
    pub leader_template: Option<PodTemplateSpec>,
    pub worker_template: Option<PodTemplateSpec>,
    pub replicas: i32,
    pub traffic: Vec<TrafficTarget>,
}

/// What [`dispatch`] actually reconciled, so the caller's status fold
/// (spec.md §4.7) knows which child object to read back.
pub enum DispatchOutcome {
    RawDeployment(Deployment),
    MultiNode(LeaderWorkerSet),
    Ray(RayService),
    Serverless(KnativeService),
}

/// spec.md §4.6 step 5: "Each renderer sets the InferenceService as owner,
/// performs checkExist->create|update in the workload kind its mode
/// implies." Serverless additionally requires the live Knative CRD check
/// (spec.md §8 scenario 6); a decided-but-unavailable Serverless mode is a
/// typed, terminal `ServerlessModeRejected` failure, not a silent fallback.
pub async fn dispatch(
    client: Client,
    namespace: &str,
    name: &str,
    mode: DeploymentMode,
    rendered: &RenderedComponent,
    service: &InferenceService,
    knative_installed: bool,
) -> Result<DispatchOutcome, DispatchError> {
    let owner = owner_ref(service);
    match mode {
        DeploymentMode::RawDeployment => {
            let api: Api<Deployment> = Api::namespaced(client, namespace);
            dispatch_raw_deployment(&api, name, owner, rendered)
                .await
                .map(DispatchOutcome::RawDeployment)
                .map_err(DispatchError::Infra)
        }
        DeploymentMode::MultiNode => {
            let api: Api<LeaderWorkerSet> = Api::namespaced(client, namespace);
            dispatch_multi_node(&api, name, owner, rendered)
                .await
                .map(DispatchOutcome::MultiNode)
                .map_err(DispatchError::Infra)
        }
        DeploymentMode::MultiNodeRayVLLM => {
            let api: Api<RayService> = Api::namespaced(client, namespace);
            dispatch_ray(&api, name, owner, rendered)
                .await
                .map(DispatchOutcome::Ray)
                .map_err(DispatchError::Infra)
        }
        DeploymentMode::Serverless => {
            if !knative_installed {
                return Err(DispatchError::Reason(FailureReason::ServerlessModeRejected));
            }
            let api: Api<KnativeService> = Api::namespaced(client, namespace);
            dispatch_serverless(&api, name, owner, rendered)
                .await
                .map(DispatchOutcome::Serverless)
                .map_err(DispatchError::Infra)
        }
        DeploymentMode::VirtualDeployment => {
            unreachable!("VirtualDeployment short-circuits before dispatch")
        }
    }
}

#[derive(Debug)]
pub enum DispatchError {
    Infra(Error),
    Reason(FailureReason),
}

impl DispatchError {
    pub fn message(&self) -> String {
        match self {
            DispatchError::Infra(e) => e.to_string(),
            DispatchError::Reason(FailureReason::ServerlessModeRejected) => {
                messages::SERVERLESS_MODE_REJECTED.to_owned()
            }
            DispatchError::Reason(reason) => format!("{reason:?}"),
        }
    }
}

async fn dispatch_raw_deployment(
    api: &Api<Deployment>,
    name: &str,
    owner: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
    rendered: &RenderedComponent,
) -> Result<Deployment, Error> {
    let selector = LabelSelector {
        match_labels: Some(rendered.labels.clone()),
        ..Default::default()
    };
    let desired_spec = DeploymentSpec {
        replicas: Some(rendered.replicas),
        selector: selector.clone(),
        template: rendered.pod_template.clone(),
        ..Default::default()
    };
    reconcile_owned(
        api,
        name,
        owner,
        |name| Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                labels: Some(rendered.labels.clone()),
                annotations: Some(rendered.annotations.clone()),
                ..Default::default()
            },
            spec: Some(desired_spec.clone()),
            ..Default::default()
        },
        |existing| existing.spec.as_ref() != Some(&desired_spec),
        |existing| existing.spec = Some(desired_spec.clone()),
    )
    .await
}

async fn dispatch_multi_node(
    api: &Api<LeaderWorkerSet>,
    name: &str,
    owner: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
    rendered: &RenderedComponent,
) -> Result<LeaderWorkerSet, Error> {
    let desired_spec = LeaderWorkerSetSpec {
        leader_template: rendered.leader_template.clone().or_else(|| Some(rendered.pod_template.clone())),
        worker_template: rendered.worker_template.clone(),
        replicas: rendered.replicas,
    };
    reconcile_owned(
        api,
        name,
        owner,
        |name| {
            let mut lws = LeaderWorkerSet::new(name, desired_spec.clone());
            lws.metadata.labels = Some(rendered.labels.clone());
            lws.metadata.annotations = Some(rendered.annotations.clone());
            lws
        },
        |existing| existing.spec != desired_spec,
        |existing| existing.spec = desired_spec.clone(),
    )
    .await
}

async fn dispatch_ray(
    api: &Api<RayService>,
    name: &str,
    owner: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
    rendered: &RenderedComponent,
) -> Result<RayService, Error> {
    let desired_spec = RayServiceSpec {
        head_template: Some(rendered.pod_template.clone()),
        worker_template: rendered.worker_template.clone(),
    };
    reconcile_owned(
        api,
        name,
        owner,
        |name| {
            let mut rs = RayService::new(name, desired_spec.clone());
            rs.metadata.labels = Some(rendered.labels.clone());
            rs.metadata.annotations = Some(rendered.annotations.clone());
            rs
        },
        |existing| existing.spec != desired_spec,
        |existing| existing.spec = desired_spec.clone(),
    )
    .await
}

async fn dispatch_serverless(
    api: &Api<KnativeService>,
    name: &str,
    owner: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
    rendered: &RenderedComponent,
) -> Result<KnativeService, Error> {
    let desired_spec = KnativeServiceSpec {
        template: Some(rendered.pod_template.clone()),
        traffic: rendered.traffic.clone(),
    };
    reconcile_owned(
        api,
        name,
        owner,
        |name| {
            let mut ks = KnativeService::new(name, desired_spec.clone());
            ks.metadata.labels = Some(rendered.labels.clone());
            ks.metadata.annotations = Some(rendered.annotations.clone());
            ks
        },
        |existing| existing.spec != desired_spec,
        |existing| existing.spec = desired_spec.clone(),
    )
    .await
}

/// Deletes every child object kind a component could have produced across
/// its lifetime, keyed only by name. Idempotent and safe to call whenever
/// a mode switch retires one workload kind in favor of another, or when
/// the component itself is torn down (spec.md §4.6 step 6).
pub async fn teardown(client: Client, namespace: &str, name: &str) -> Result<(), Error> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let lws: Api<LeaderWorkerSet> = Api::namespaced(client.clone(), namespace);
    let ray: Api<RayService> = Api::namespaced(client.clone(), namespace);
    let knative: Api<KnativeService> = Api::namespaced(client, namespace);

    delete_if_present(&deployments, name).await?;
    delete_if_present(&lws, name).await?;
    delete_if_present(&ray, name).await?;
    delete_if_present(&knative, name).await?;
    Ok(())
}
