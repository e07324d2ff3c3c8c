use ome_types::{Amount, FlavorQuota};

/// Outcome of [`admit`] (spec.md §4.2 `admit(reservation) -> {Sufficient,
/// Insufficient}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    Sufficient,
    Insufficient,
}

/// Admission-controls a `ClusterCapacityReservation`'s desired resource
/// groups against available cluster capacity minus what other reservations
/// already hold (spec.md §4.2).
///
/// - `desired` — flattened `spec.resourceGroups` (`D`).
/// - `current_capacity` — `status.capacity` as currently recorded; empty on
///   creation.
/// - `available` — cluster-wide available capacity per flavor/resource
///   (`A`).
/// - `allocated` — sum of `status.allocatable` across all other existing
///   reservations (`R`).
pub fn admit(
    desired: &FlavorQuota,
    current_capacity: &FlavorQuota,
    available: &FlavorQuota,
    allocated: &FlavorQuota,
) -> AdmissionResult {
    let change = change_map(desired, current_capacity);

    // I1: shortcut when every delta is non-positive (P1).
    if change.all_non_positive() {
        return AdmissionResult::Sufficient;
    }

    for (flavor, resources) in change.0.iter() {
        let flavor_available = match available.0.get(flavor) {
            Some(r) => r,
            // Missing flavor in available capacity: nothing to admit against.
            None => return AdmissionResult::Insufficient,
        };
        for (resource, &delta) in resources.iter() {
            let a = flavor_available.get(resource).copied().unwrap_or(Amount::ZERO);
            let r = allocated
                .0
                .get(flavor)
                .and_then(|resources| resources.get(resource))
                .copied()
                .unwrap_or(Amount::ZERO);
            let budget = a - r;
            if budget - delta < Amount::ZERO {
                return AdmissionResult::Insufficient;
            }
        }
    }
    AdmissionResult::Sufficient
}

/// Builds the change map `D - current` (spec.md §4.2 step 1), or `D` itself
/// if `current` is empty (first admission of a freshly created reservation).
pub fn change_map(desired: &FlavorQuota, current_capacity: &FlavorQuota) -> FlavorQuota {
    if current_capacity.is_empty() {
        desired.clone()
    } else {
        desired.diff(current_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(entries: &[(&str, &str, &str)]) -> FlavorQuota {
        let mut q = FlavorQuota::new();
        for (flavor, resource, qty) in entries {
            q.set(flavor, resource, Amount::parse(qty).unwrap());
        }
        q
    }

    /// P1: if every change entry is <= 0, admit = Sufficient regardless of
    /// A, R.
    #[test]
    fn shortcut_on_non_positive_change_ignores_capacity() {
        let desired = quota(&[("bm-gpu-h100-8", "nvidia.com/gpu", "2")]);
        let current = quota(&[("bm-gpu-h100-8", "nvidia.com/gpu", "4")]);
        let empty = FlavorQuota::new();
        assert_eq!(
            admit(&desired, &current, &empty, &empty),
            AdmissionResult::Sufficient
        );
    }

    /// Scenario 1: resource-sufficient creation.
    #[test]
    fn sufficient_creation() {
        let desired = quota(&[
            ("bm-gpu-h100-8", "cpu", "10"),
            ("bm-gpu-h100-8", "memory", "10Gi"),
            ("bm-gpu-h100-8", "nvidia.com/gpu", "2"),
        ]);
        let available = quota(&[
            ("bm-gpu-h100-8", "cpu", "32768"),
            ("bm-gpu-h100-8", "memory", "256Ti"),
            ("bm-gpu-h100-8", "nvidia.com/gpu", "512"),
        ]);
        let empty = FlavorQuota::new();
        assert_eq!(
            admit(&desired, &empty, &available, &empty),
            AdmissionResult::Sufficient
        );
    }

    /// Scenario 2: resource-insufficient creation.
    #[test]
    fn insufficient_creation() {
        let desired = quota(&[
            ("bm-gpu-h100-8", "cpu", "10"),
            ("bm-gpu-h100-8", "memory", "10Gi"),
            ("bm-gpu-h100-8", "nvidia.com/gpu", "2000"),
        ]);
        let available = quota(&[
            ("bm-gpu-h100-8", "cpu", "32768"),
            ("bm-gpu-h100-8", "memory", "256Ti"),
            ("bm-gpu-h100-8", "nvidia.com/gpu", "512"),
        ]);
        let empty = FlavorQuota::new();
        assert_eq!(
            admit(&desired, &empty, &available, &empty),
            AdmissionResult::Insufficient
        );
    }

    /// Scenario 3: update with no increase shortcuts without consulting A.
    #[test]
    fn update_with_decrease_shortcuts() {
        let current = quota(&[("bm-gpu-h100-8", "nvidia.com/gpu", "4")]);
        let desired = quota(&[("bm-gpu-h100-8", "nvidia.com/gpu", "2")]);
        let empty = FlavorQuota::new();
        assert_eq!(
            admit(&desired, &current, &empty, &empty),
            AdmissionResult::Sufficient
        );
    }

    /// Missing flavor in available capacity is always insufficient, even
    /// for a tiny request.
    #[test]
    fn missing_flavor_is_insufficient() {
        let desired = quota(&[("bm-gpu-a100-8", "nvidia.com/gpu", "1")]);
        let available = quota(&[("bm-gpu-h100-8", "nvidia.com/gpu", "512")]);
        let empty = FlavorQuota::new();
        assert_eq!(
            admit(&desired, &empty, &available, &empty),
            AdmissionResult::Insufficient
        );
    }

    /// P2: rendering is stable — two invocations on the same quota produce
    /// byte-identical flavor-usage lists, lexicographically ordered (I2).
    #[test]
    fn flavor_usage_rendering_is_stable_and_sorted() {
        let mut q = FlavorQuota::new();
        q.set("z-flavor", "memory", Amount::parse("1Gi").unwrap());
        q.set("a-flavor", "nvidia.com/gpu", Amount::parse("1").unwrap());
        q.set("a-flavor", "cpu", Amount::parse("2").unwrap());
        let first = q.to_flavor_usage();
        let second = q.to_flavor_usage();
        assert_eq!(first, second);
        assert_eq!(first[0].name, "a-flavor");
        assert_eq!(first[0].resources[0].name, "cpu");
        assert_eq!(first[1].name, "z-flavor");
    }
}
