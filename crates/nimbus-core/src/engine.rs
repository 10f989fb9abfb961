//! Reconciliation engine
//!
//! One pass per allocation compares what the allocation record says against
//! what the provider holds: members, quotas and, for backends with a project
//! shape, labels and limit ranges. Each axis is evaluated independently and
//! a failure on one never suppresses the others. With `apply` the pass also
//! corrects what it finds.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use nimbus_common::attributes::ALLOCATION_PROJECT_ID;
use nimbus_common::{Allocation, AllocationHandle, AllocationSource, AttributeStore, Result};
use nimbus_plugin::{Allocator, PluginRegistry, ShapedProject};

use crate::diff::{QuotaCheck, check_quota, diff_limits, diff_users, missing_labels};
use crate::report::{
    Action, Discrepancy, DiscrepancyKind, RunSummary, SkipReason, ValidationReport,
};

const DEFAULT_CONCURRENCY: usize = 4;

/// Runs validation passes over allocations
pub struct Reconciler {
    registry: Arc<PluginRegistry>,
    source: Arc<dyn AllocationSource>,
    store: Arc<dyn AttributeStore>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        registry: Arc<PluginRegistry>,
        source: Arc<dyn AllocationSource>,
        store: Arc<dyn AttributeStore>,
    ) -> Self {
        Self {
            registry,
            source,
            store,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Number of allocations validated in parallel by [`Reconciler::validate_all`]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// One pass over one allocation; never fails, problems land in the report
    pub async fn validate(&self, allocation: &Allocation, apply: bool) -> ValidationReport {
        let report = ValidationReport::new(&allocation.id, &allocation.resource_name, apply);

        let resource = match self.source.resource(&allocation.resource_name).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                warn!(
                    allocation_id = %allocation.id,
                    resource = %allocation.resource_name,
                    "Resource not found"
                );
                return report.skipped(SkipReason::ResourceNotFound);
            }
            Err(e) => {
                let mut report = report.skipped(SkipReason::BackendError);
                report.error(e);
                return report;
            }
        };

        let handle = AllocationHandle::new(allocation.clone(), self.store.clone());
        match self.registry.resolve(&resource, handle).await {
            Ok(Some(allocator)) => reconcile(allocator.as_ref(), apply).await,
            Ok(None) => report.skipped(SkipReason::UnsupportedResource),
            Err(e) => {
                error!(
                    allocation_id = %allocation.id,
                    resource = %resource.name,
                    "Failed to build backend: {}", e
                );
                let mut report = report.skipped(SkipReason::BackendError);
                report.error(e);
                report
            }
        }
    }

    /// Validate every active allocation; one allocation's failure never stops the run
    pub async fn validate_all(&self, apply: bool) -> Result<(Vec<ValidationReport>, RunSummary)> {
        let started_at = Utc::now();
        let allocations = self.source.active_allocations().await?;
        info!(count = allocations.len(), apply, "Validating allocations");

        let reports: Vec<ValidationReport> = futures::stream::iter(allocations.iter())
            .map(|allocation| self.validate(allocation, apply))
            .buffered(self.concurrency)
            .collect()
            .await;

        let summary = RunSummary::from_reports(apply, started_at, &reports);
        info!(
            total = summary.total,
            clean = summary.clean,
            with_discrepancies = summary.with_discrepancies,
            failed = summary.failed,
            actions = summary.actions,
            "Validation finished"
        );
        Ok((reports, summary))
    }
}

/// Validate one allocation against an already resolved backend
pub async fn reconcile(allocator: &dyn Allocator, apply: bool) -> ValidationReport {
    let handle = allocator.allocation();
    let mut report = ValidationReport::new(handle.id(), &allocator.resource().name, apply);

    let project_id = match handle.get_text(ALLOCATION_PROJECT_ID).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            error!(allocation_id = %handle.id(), "Allocation has no project id, skipping");
            return report.skipped(SkipReason::MissingProjectId);
        }
        Err(e) => {
            report.error(e);
            return report.skipped(SkipReason::BackendError);
        }
    };
    report.project_id = Some(project_id.clone());

    match allocator.get_project(&project_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(
                allocation_id = %handle.id(),
                project_id = %project_id,
                "Project not found on provider"
            );
            return report.skipped(SkipReason::ProjectNotFound);
        }
        Err(e) => {
            error!(project_id = %project_id, "Failed to look up project: {}", e);
            report.error(e);
            return report.skipped(SkipReason::BackendError);
        }
    }

    reconcile_users(allocator, &project_id, apply, &mut report).await;
    reconcile_quotas(allocator, &project_id, apply, &mut report).await;
    if let Some(shaped) = allocator.shaped() {
        reconcile_labels(shaped, &project_id, apply, &mut report).await;
        reconcile_limits(shaped, &project_id, apply, &mut report).await;
    }

    debug!(
        allocation_id = %handle.id(),
        project_id = %project_id,
        discrepancies = report.discrepancies.len(),
        actions = report.actions.len(),
        "Allocation checked"
    );
    report
}

async fn reconcile_users(
    allocator: &dyn Allocator,
    project_id: &str,
    apply: bool,
    report: &mut ValidationReport,
) {
    let actual = match allocator.get_users(project_id).await {
        Ok(users) => users,
        Err(e) => {
            error!(project_id = %project_id, "Failed to list project users: {}", e);
            report.error(format!("listing users: {}", e));
            return;
        }
    };
    let diff = diff_users(&allocator.allocation().allocation.members, &actual);

    for username in &diff.missing {
        warn!(project_id = %project_id, username = %username, "User missing from project");
        report.discrepancy(Discrepancy::new(
            DiscrepancyKind::MissingUser,
            username,
            Some("member".to_string()),
            None,
        ));
        if !apply {
            continue;
        }
        let added = async {
            allocator.get_or_create_federated_user(username).await?;
            allocator.assign_role_on_user(username, project_id).await
        };
        match added.await {
            Ok(()) => report.action(Action::AddedUser {
                username: username.clone(),
            }),
            Err(e) => {
                error!(project_id = %project_id, username = %username, "Failed to add user: {}", e);
                report.error(format!("adding {}: {}", username, e));
            }
        }
    }

    for username in &diff.extra {
        warn!(project_id = %project_id, username = %username, "User not in allocation");
        report.discrepancy(Discrepancy::new(
            DiscrepancyKind::ExtraUser,
            username,
            None,
            Some("member".to_string()),
        ));
        if !apply {
            continue;
        }
        match allocator.remove_role_from_user(username, project_id).await {
            Ok(()) => report.action(Action::RemovedUser {
                username: username.clone(),
            }),
            Err(e) => {
                error!(project_id = %project_id, username = %username, "Failed to remove user: {}", e);
                report.error(format!("removing {}: {}", username, e));
            }
        }
    }
}

async fn reconcile_quotas(
    allocator: &dyn Allocator,
    project_id: &str,
    apply: bool,
    report: &mut ValidationReport,
) {
    let handle = allocator.allocation();
    let observed = match allocator.get_quota(project_id).await {
        Ok(observed) => observed,
        Err(e) => {
            error!(project_id = %project_id, "Failed to read provider quota: {}", e);
            report.error(format!("reading quota: {}", e));
            return;
        }
    };

    let mut reapply = false;
    for (attribute, spec) in allocator.quota_specs().iter() {
        if !allocator.manages_quota(spec.category) {
            debug!(
                project_id = %project_id,
                attribute = %attribute,
                category = %spec.category,
                "Quota category not handled by backend, skipping"
            );
            continue;
        }
        let current = observed.get(&spec.label);
        let checked = async {
            let expected = handle.get_int(attribute).await?;
            check_quota(spec, expected, current).map(|c| (expected, c))
        };
        let (expected, check) = match checked.await {
            Ok(result) => result,
            Err(e) => {
                warn!(project_id = %project_id, attribute = %attribute, "Cannot compare quota: {}", e);
                report.error(format!("{}: {}", attribute, e));
                continue;
            }
        };

        let actual = current.map(|v| v.to_string());
        match check {
            QuotaCheck::Match => continue,
            QuotaCheck::NeverSet => {
                let value = spec.quota_by_quantity(handle.quantity());
                info!(project_id = %project_id, attribute = %attribute, "Quota never set");
                report.discrepancy(Discrepancy::new(
                    DiscrepancyKind::Quota,
                    attribute,
                    Some(value.to_string()),
                    None,
                ));
                if apply {
                    match handle.set(attribute, value).await {
                        Ok(()) => {
                            report.action(Action::PersistedDefaultQuota {
                                attribute: attribute.clone(),
                                value,
                            });
                            reapply = true;
                        }
                        Err(e) => report.error(format!("{}: {}", attribute, e)),
                    }
                }
            }
            QuotaCheck::Adopt(value) => {
                info!(
                    project_id = %project_id,
                    attribute = %attribute,
                    value,
                    "Provider quota not recorded on allocation"
                );
                report.discrepancy(Discrepancy::new(DiscrepancyKind::Quota, attribute, None, actual));
                if apply {
                    match handle.set(attribute, value).await {
                        Ok(()) => report.action(Action::AdoptedQuota {
                            attribute: attribute.clone(),
                            value,
                        }),
                        Err(e) => report.error(format!("{}: {}", attribute, e)),
                    }
                }
            }
            QuotaCheck::Mismatch => {
                warn!(
                    project_id = %project_id,
                    attribute = %attribute,
                    expected = ?expected,
                    actual = ?actual,
                    "Quota mismatch"
                );
                report.discrepancy(Discrepancy::new(
                    DiscrepancyKind::Quota,
                    attribute,
                    expected.map(|v| v.to_string()),
                    actual,
                ));
                reapply = true;
            }
        }
    }

    if apply && reapply {
        match allocator.set_quota(project_id).await {
            Ok(()) => {
                info!(allocation_id = %handle.id(), project_id = %project_id, "Quota reapplied");
                report.action(Action::ReappliedQuota);
            }
            Err(e) => {
                error!(
                    allocation_id = %handle.id(),
                    project_id = %project_id,
                    "Failed to reapply quota: {}", e
                );
                report.error(format!("setting quota: {}", e));
            }
        }
    }
}

async fn reconcile_labels(
    shaped: &dyn ShapedProject,
    project_id: &str,
    apply: bool,
    report: &mut ValidationReport,
) {
    let actual = match shaped.get_project_labels(project_id).await {
        Ok(Some(labels)) => labels,
        Ok(None) => return,
        Err(e) => {
            report.error(format!("reading labels: {}", e));
            return;
        }
    };
    let missing = missing_labels(shaped.default_labels(), &actual);
    if missing.is_empty() {
        return;
    }

    for (key, value) in &missing {
        report.discrepancy(Discrepancy::new(
            DiscrepancyKind::Label,
            key,
            Some(value.clone()),
            actual.get(key).cloned(),
        ));
    }
    warn!(project_id = %project_id, missing = missing.len(), "Project labels out of date");

    if apply {
        match shaped.merge_project_labels(project_id, &missing).await {
            Ok(()) => report.action(Action::MergedLabels {
                labels: missing.keys().cloned().collect(),
            }),
            Err(e) => report.error(format!("merging labels: {}", e)),
        }
    }
}

async fn reconcile_limits(
    shaped: &dyn ShapedProject,
    project_id: &str,
    apply: bool,
    report: &mut ValidationReport,
) {
    let diffs = match shaped.get_limits(project_id).await {
        Ok(Some(actual)) => diff_limits(shaped.expected_limits(), &actual),
        Ok(None) => diff_limits(shaped.expected_limits(), &[]),
        Err(e) => {
            report.error(format!("reading limits: {}", e));
            return;
        }
    };
    if diffs.is_empty() {
        return;
    }

    for diff in diffs {
        report.discrepancy(Discrepancy::new(
            DiscrepancyKind::LimitRange,
            diff.path,
            diff.expected,
            diff.actual,
        ));
    }
    warn!(project_id = %project_id, "Limit ranges differ from configuration");

    if apply {
        match shaped.replace_limits(project_id).await {
            Ok(()) => report.action(Action::ReplacedLimits),
            Err(e) => report.error(format!("replacing limits: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use nimbus_common::{AllocationStatus, InMemoryStore, Resource};
    use nimbus_quota::{
        GIB_BYTES, OBJECT_STORAGE_LABEL, QuotaCategory, QuotaSpec, QuotaSpecDocument, QuotaValue,
    };

    use crate::fake::{FakeAllocator, FakeCloud, FakePlugin, default_limits};

    const CORES: &str = "OpenStack Compute vCPU Quota";
    const RAM: &str = "OpenStack Compute RAM Quota (MiB)";
    const SWIFT: &str = "OpenStack Swift Quota (GiB)";
    const OCP_RAM: &str = "OpenShift Limit on RAM Quota (MiB)";

    fn names(users: &[&str]) -> BTreeSet<String> {
        users.iter().map(|s| s.to_string()).collect()
    }

    fn openstack_resource() -> Resource {
        let mut specs = QuotaSpecDocument::new();
        specs
            .add(CORES, QuotaSpec::new("cores", QuotaCategory::Compute).with_multiplier(1))
            .unwrap();
        specs
            .add(RAM, QuotaSpec::new("ram", QuotaCategory::Compute).with_multiplier(4096))
            .unwrap();
        specs
            .add(SWIFT, QuotaSpec::new(OBJECT_STORAGE_LABEL, QuotaCategory::ObjectStorage))
            .unwrap();
        let mut resource = Resource::new("stack", "OpenStack");
        specs.write_to(&mut resource).unwrap();
        resource
    }

    fn openshift_resource() -> Resource {
        let mut specs = QuotaSpecDocument::new();
        specs
            .add(
                OCP_RAM,
                QuotaSpec::new("limits.memory", QuotaCategory::Cluster)
                    .with_multiplier(4096)
                    .with_suffix("Mi"),
            )
            .unwrap();
        let mut resource = Resource::new("ocp", "OpenShift");
        specs.write_to(&mut resource).unwrap();
        resource
    }

    fn allocator(
        resource: Resource,
        allocation: Allocation,
        cloud: &FakeCloud,
    ) -> (Arc<InMemoryStore>, FakeAllocator) {
        let store = Arc::new(InMemoryStore::new());
        let handle = AllocationHandle::new(allocation, store.clone());
        let allocator = FakeAllocator::new(resource, handle, cloud.clone()).unwrap();
        (store, allocator)
    }

    /// An OpenStack allocation whose provider state matches exactly
    async fn matching_openstack(cloud: &FakeCloud) -> FakeAllocator {
        let allocation = Allocation::new("1", "stack", 2).with_pi("pi").with_member("alice");
        let (_, allocator) = allocator(openstack_resource(), allocation, cloud);
        let handle = allocator.allocation();
        handle.set(ALLOCATION_PROJECT_ID, "p1").await.unwrap();
        handle.set(CORES, 2).await.unwrap();
        handle.set(RAM, 8192).await.unwrap();
        handle.set(SWIFT, 0).await.unwrap();

        cloud.add_project("p1", &[]);
        cloud.set_members("p1", &["pi", "alice"]);
        cloud.set_observed("p1", "cores", QuotaValue::Number(2));
        cloud.set_observed("p1", "ram", QuotaValue::Number(8192));
        cloud.set_observed("p1", OBJECT_STORAGE_LABEL, QuotaValue::Number(1));
        allocator
    }

    #[tokio::test]
    async fn test_matching_allocation_is_clean_and_untouched() {
        let cloud = FakeCloud::new();
        let allocator = matching_openstack(&cloud).await;

        let report = reconcile(&allocator, true).await;
        assert!(report.is_clean(), "{:?}", report);
        assert!(report.actions.is_empty());
        assert_eq!(cloud.mutations(), 0);
    }

    #[tokio::test]
    async fn test_users_reconciled_both_directions() {
        let cloud = FakeCloud::new();
        let allocation = Allocation::new("1", "stack", 1).with_member("a").with_member("b");
        let (_, allocator) = allocator(openstack_resource(), allocation, &cloud);
        allocator.allocation().set(ALLOCATION_PROJECT_ID, "p1").await.unwrap();
        cloud.add_project("p1", &[]);
        cloud.set_members("p1", &["b", "c"]);

        let dry = reconcile(&allocator, false).await;
        assert_eq!(dry.of_kind(DiscrepancyKind::MissingUser).count(), 1);
        assert_eq!(dry.of_kind(DiscrepancyKind::ExtraUser).count(), 1);
        assert_eq!(cloud.members("p1"), names(&["b", "c"]));

        let report = reconcile(&allocator, true).await;
        assert_eq!(cloud.members("p1"), names(&["a", "b"]));
        assert!(report.actions.contains(&Action::AddedUser { username: "a".to_string() }));
        assert!(report.actions.contains(&Action::RemovedUser { username: "c".to_string() }));
        assert!(cloud.with(|s| s.federated.contains("a")));
    }

    #[tokio::test]
    async fn test_quota_never_set_is_persisted_and_applied() {
        let cloud = FakeCloud::new();
        let (store, allocator) = allocator(
            openshift_resource(),
            Allocation::new("7", "ocp", 2),
            &cloud,
        );
        allocator.allocation().set(ALLOCATION_PROJECT_ID, "p1").await.unwrap();
        cloud.add_project("p1", &[("modelmesh-enabled", "true")]);
        cloud.with(|s| s.limits.insert("p1".to_string(), default_limits()));

        let dry = reconcile(&allocator, false).await;
        let quota: Vec<_> = dry.of_kind(DiscrepancyKind::Quota).collect();
        assert_eq!(quota.len(), 1);
        assert_eq!(quota[0].expected.as_deref(), Some("8192"));
        assert_eq!(quota[0].actual, None);
        assert!(store.attributes_of("7").get(OCP_RAM).is_none());

        let report = reconcile(&allocator, true).await;
        assert!(report.actions.contains(&Action::PersistedDefaultQuota {
            attribute: OCP_RAM.to_string(),
            value: 8192,
        }));
        assert!(report.actions.contains(&Action::ReappliedQuota));
        assert_eq!(allocator.allocation().get_int(OCP_RAM).await.unwrap(), Some(8192));
        assert_eq!(
            cloud.observed("p1").get("limits.memory"),
            Some(&QuotaValue::Quantity("8192Mi".to_string()))
        );

        let again = reconcile(&allocator, true).await;
        assert!(again.is_clean(), "{:?}", again);
    }

    #[tokio::test]
    async fn test_provider_quota_is_adopted_without_touching_provider() {
        let cloud = FakeCloud::new();
        matching_openstack(&cloud).await;
        cloud.set_observed("p1", "cores", QuotaValue::Number(4));

        // same project, but nothing recorded for cores
        let allocation = Allocation::new("2", "stack", 1).with_pi("pi").with_member("alice");
        let (_, fresh) = allocator_with_project(&cloud, allocation).await;

        let report = reconcile(&fresh, true).await;
        assert!(report.actions.contains(&Action::AdoptedQuota {
            attribute: CORES.to_string(),
            value: 4,
        }));
        assert!(!report.actions.contains(&Action::ReappliedQuota));
        assert_eq!(fresh.allocation().get_int(CORES).await.unwrap(), Some(4));
        assert_eq!(cloud.observed("p1").get("cores"), Some(&QuotaValue::Number(4)));
        assert_eq!(cloud.with(|s| s.set_quota_calls), 0);
    }

    async fn allocator_with_project(
        cloud: &FakeCloud,
        allocation: Allocation,
    ) -> (Arc<InMemoryStore>, FakeAllocator) {
        let (store, allocator) = allocator(openstack_resource(), allocation, cloud);
        let handle = allocator.allocation();
        handle.set(ALLOCATION_PROJECT_ID, "p1").await.unwrap();
        handle.set(RAM, 8192).await.unwrap();
        handle.set(SWIFT, 0).await.unwrap();
        (store, allocator)
    }

    #[tokio::test]
    async fn test_mismatches_reapply_quota_once() {
        let cloud = FakeCloud::new();
        let allocator = matching_openstack(&cloud).await;
        cloud.set_observed("p1", "cores", QuotaValue::Number(1));
        cloud.set_observed("p1", "ram", QuotaValue::Number(1024));

        let dry = reconcile(&allocator, false).await;
        assert_eq!(dry.of_kind(DiscrepancyKind::Quota).count(), 2);
        assert!(dry.actions.is_empty());
        assert_eq!(cloud.with(|s| s.set_quota_calls), 0);

        let report = reconcile(&allocator, true).await;
        assert_eq!(cloud.with(|s| s.set_quota_calls), 1);
        assert_eq!(report.actions, vec![Action::ReappliedQuota]);
        assert_eq!(cloud.observed("p1").get("cores"), Some(&QuotaValue::Number(2)));
    }

    #[tokio::test]
    async fn test_object_storage_zero_expects_sentinel() {
        let cloud = FakeCloud::new();
        let allocator = matching_openstack(&cloud).await;
        cloud.set_observed("p1", OBJECT_STORAGE_LABEL, QuotaValue::Number(0));

        let report = reconcile(&allocator, true).await;
        let swift: Vec<_> = report.of_kind(DiscrepancyKind::Quota).collect();
        assert_eq!(swift.len(), 1);
        assert_eq!(swift[0].field, SWIFT);
        assert_eq!(
            cloud.observed("p1").get(OBJECT_STORAGE_LABEL),
            Some(&QuotaValue::Number(1))
        );

        allocator.allocation().set(SWIFT, 5).await.unwrap();
        reconcile(&allocator, true).await;
        assert_eq!(
            cloud.observed("p1").get(OBJECT_STORAGE_LABEL),
            Some(&QuotaValue::Number(5 * GIB_BYTES))
        );
    }

    #[tokio::test]
    async fn test_unmanaged_quota_category_is_ignored() {
        let cloud = FakeCloud::new();
        let allocator = matching_openstack(&cloud).await;
        let mut resource = allocator.resource().clone();
        let mut specs = QuotaSpecDocument::from_resource(&resource).unwrap();
        specs
            .add(
                OCP_RAM,
                QuotaSpec::new("limits.memory", QuotaCategory::Cluster).with_multiplier(4096),
            )
            .unwrap();
        specs.write_to(&mut resource).unwrap();
        let allocator =
            FakeAllocator::new(resource, allocator.allocation().clone(), cloud.clone()).unwrap();
        allocator.allocation().set(OCP_RAM, 8192).await.unwrap();

        for _ in 0..2 {
            let report = reconcile(&allocator, true).await;
            assert!(report.is_clean(), "{:?}", report);
        }
        assert_eq!(cloud.with(|s| s.set_quota_calls), 0);
        assert!(cloud.observed("p1").get("limits.memory").is_none());
    }

    #[tokio::test]
    async fn test_set_quota_failure_is_reported_not_raised() {
        let cloud = FakeCloud::new();
        let allocator = matching_openstack(&cloud).await;
        cloud.set_observed("p1", "cores", QuotaValue::Number(9));
        cloud.set_members("p1", &["pi"]);
        cloud.with(|s| s.fail_set_quota = true);

        let report = reconcile(&allocator, true).await;
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("setting quota"));
        // the user axis still ran
        assert!(report.actions.contains(&Action::AddedUser { username: "alice".to_string() }));
    }

    #[tokio::test]
    async fn test_bad_stored_value_only_skips_that_attribute() {
        let cloud = FakeCloud::new();
        let allocator = matching_openstack(&cloud).await;
        allocator.allocation().set(CORES, "many").await.unwrap();
        cloud.set_observed("p1", "ram", QuotaValue::Number(1));

        let report = reconcile(&allocator, false).await;
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with(CORES));
        let quota: Vec<_> = report.of_kind(DiscrepancyKind::Quota).collect();
        assert_eq!(quota.len(), 1);
        assert_eq!(quota[0].field, RAM);
    }

    #[tokio::test]
    async fn test_missing_project_id_and_missing_project_are_skipped() {
        let cloud = FakeCloud::new();
        let (_, allocator) = allocator(openstack_resource(), Allocation::new("1", "stack", 1), &cloud);
        let report = reconcile(&allocator, true).await;
        assert_eq!(report.outcome, crate::report::Outcome::Skipped(SkipReason::MissingProjectId));

        allocator.allocation().set(ALLOCATION_PROJECT_ID, "gone").await.unwrap();
        let report = reconcile(&allocator, true).await;
        assert_eq!(report.outcome, crate::report::Outcome::Skipped(SkipReason::ProjectNotFound));
        assert_eq!(cloud.mutations(), 0);
    }

    #[tokio::test]
    async fn test_labels_merged_and_limits_recreated() {
        let cloud = FakeCloud::new();
        let (_, allocator) = allocator(openshift_resource(), Allocation::new("7", "ocp", 1), &cloud);
        let handle = allocator.allocation();
        handle.set(ALLOCATION_PROJECT_ID, "p1").await.unwrap();
        handle.set(OCP_RAM, 4096).await.unwrap();
        cloud.add_project("p1", &[("modelmesh-enabled", "false"), ("team", "physics")]);
        cloud.set_observed("p1", "limits.memory", QuotaValue::from("4Gi"));

        let dry = reconcile(&allocator, false).await;
        assert_eq!(dry.of_kind(DiscrepancyKind::Label).count(), 1);
        let limits: Vec<_> = dry.of_kind(DiscrepancyKind::LimitRange).collect();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0].field, "limits[Container]");

        let report = reconcile(&allocator, true).await;
        assert!(report.actions.contains(&Action::ReplacedLimits));
        let labels = cloud.with(|s| s.projects["p1"].labels.clone());
        assert_eq!(labels.get("modelmesh-enabled").unwrap(), "true");
        assert_eq!(labels.get("team").unwrap(), "physics");

        assert!(reconcile(&allocator, false).await.is_clean());
    }

    #[tokio::test]
    async fn test_validate_all_through_registry() {
        let cloud = FakeCloud::new();
        let store = Arc::new(InMemoryStore::new());
        store.insert_resource(openstack_resource());
        store.insert_resource(Resource::new("hpc", "Slurm"));
        store.insert_allocation(
            Allocation::new("1", "stack", 1)
                .with_pi("pi")
                .with_status(AllocationStatus::Active),
        );
        store.insert_allocation(
            Allocation::new("2", "hpc", 1).with_status(AllocationStatus::Active),
        );
        store.insert_allocation(
            Allocation::new("3", "stack", 1).with_status(AllocationStatus::Active),
        );
        store
            .set_attribute("1", ALLOCATION_PROJECT_ID, "p1".into())
            .await
            .unwrap();
        cloud.add_project("p1", &[]);

        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(FakePlugin::new(cloud.clone())));
        let reconciler = Reconciler::new(Arc::new(registry), store.clone(), store.clone())
            .with_concurrency(2);

        let (reports, summary) = reconciler.validate_all(true).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.unsupported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.with_discrepancies, 1);

        let first = reports.iter().find(|r| r.allocation_id == "1").unwrap();
        assert!(first.actions.contains(&Action::AddedUser { username: "pi".to_string() }));
        assert!(first.actions.contains(&Action::ReappliedQuota));
        assert_eq!(
            store.attributes_of("1").get(CORES).and_then(|v| v.as_int()),
            Some(1)
        );
        assert_eq!(cloud.observed("p1").get("cores"), Some(&QuotaValue::Number(1)));
    }
}
