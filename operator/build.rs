use kube::CustomResourceExt;
use ome_types::*;
use std::fs;

fn main() {
    fs::create_dir_all("../crds").unwrap();
    fs::write(
        "../crds/ome.io_clustercapacityreservation_crd.yaml",
        serde_yaml::to_string(&ClusterCapacityReservation::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/ome.io_clusterqueue_crd.yaml",
        serde_yaml::to_string(&ClusterQueue::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/ome.io_basemodel_crd.yaml",
        serde_yaml::to_string(&BaseModel::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/ome.io_clusterbasemodel_crd.yaml",
        serde_yaml::to_string(&ClusterBaseModel::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/ome.io_inferenceservice_crd.yaml",
        serde_yaml::to_string(&InferenceService::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/ome.io_clusterservingruntime_crd.yaml",
        serde_yaml::to_string(&ClusterServingRuntime::crd()).unwrap(),
    )
    .unwrap();
}
