use crate::capacity::{ClusterCapacityReservation, ClusterCapacityReservationStatus};
use crate::inference::{InferenceService, InferenceServiceStatus};
use crate::model::{BaseModel, ClusterBaseModel, ModelStatus};

/// Returns a mutable reference to the status object, initializing it with
/// the default value if it does not exist yet. Mirrors the teacher's
/// `Object`/`Status` traits (`operator/src/util/patch.rs`) so that
/// `util::patch::patch_status` can stay generic over resource kind.
pub trait StatusObject<S: StatusTimestamp> {
    fn mut_status(&mut self) -> &mut S;
}

pub trait StatusTimestamp {
    fn set_last_updated(&mut self, last_updated: String);
}

impl StatusObject<ClusterCapacityReservationStatus> for ClusterCapacityReservation {
    fn mut_status(&mut self) -> &mut ClusterCapacityReservationStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl StatusTimestamp for ClusterCapacityReservationStatus {
    fn set_last_updated(&mut self, last_updated: String) {
        self.last_updated = Some(last_updated);
    }
}

impl StatusObject<ModelStatus> for BaseModel {
    fn mut_status(&mut self) -> &mut ModelStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl StatusObject<ModelStatus> for ClusterBaseModel {
    fn mut_status(&mut self) -> &mut ModelStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl StatusTimestamp for ModelStatus {
    fn set_last_updated(&mut self, last_updated: String) {
        self.last_updated = Some(last_updated);
    }
}

impl StatusObject<InferenceServiceStatus> for InferenceService {
    fn mut_status(&mut self) -> &mut InferenceServiceStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl StatusTimestamp for InferenceServiceStatus {
    fn set_last_updated(&mut self, last_updated: String) {
        self.last_updated = Some(last_updated);
    }
}
