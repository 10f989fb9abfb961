//! Default quota spec documents per resource kind
//!
//! Installed by `add-quota-to-resource --defaults` when a resource is first
//! configured.

use nimbus_common::ResourceKind;

use crate::spec::{OBJECT_STORAGE_LABEL, QuotaCategory, QuotaSpec, QuotaSpecDocument};

type Row = (&'static str, &'static str, i64, i64, &'static str, QuotaCategory, &'static str);

// (display name, label, multiplier, static, suffix, category, invoice name)
const OPENSTACK: &[Row] = &[
    ("OpenStack Compute Instance Quota", "instances", 1, 0, "", QuotaCategory::Compute, ""),
    ("OpenStack Compute RAM Quota (MiB)", "ram", 4096, 0, "", QuotaCategory::Compute, ""),
    ("OpenStack Compute vCPU Quota", "cores", 1, 0, "", QuotaCategory::Compute, "CPU"),
    ("OpenStack Number of Volumes Quota", "volumes", 2, 0, "", QuotaCategory::Volume, ""),
    ("OpenStack Volume Quota (GiB)", "gigabytes", 20, 0, "", QuotaCategory::Volume, "Storage"),
    ("OpenStack Floating IP Quota", "floatingip", 0, 2, "", QuotaCategory::Network, ""),
    ("OpenStack Swift Quota (GiB)", OBJECT_STORAGE_LABEL, 1, 0, "", QuotaCategory::ObjectStorage, "Object Storage"),
];

const ESI: &[Row] = &[
    ("ESI Floating IP Quota", "floatingip", 0, 1, "", QuotaCategory::Network, ""),
    ("ESI Network Quota", "network", 0, 1, "", QuotaCategory::Network, ""),
];

const OPENSHIFT: &[Row] = &[
    ("OpenShift Limit on CPU Quota", "limits.cpu", 1, 0, "", QuotaCategory::Cluster, "CPU"),
    ("OpenShift Limit on RAM Quota (MiB)", "limits.memory", 4096, 0, "Mi", QuotaCategory::Cluster, ""),
    ("OpenShift Limit on Ephemeral Storage Quota (GiB)", "limits.ephemeral-storage", 5, 0, "Gi", QuotaCategory::Cluster, ""),
    ("OpenShift Request on Storage Quota (GiB)", "requests.storage", 20, 0, "Gi", QuotaCategory::Cluster, "Storage"),
    ("OpenShift Request on GPU Quota", "requests.nvidia.com/gpu", 0, 0, "", QuotaCategory::Cluster, "GPU"),
    ("OpenShift Persistent Volume Claims Quota", "persistentvolumeclaims", 2, 0, "", QuotaCategory::Cluster, ""),
];

const OPENSHIFT_VM: &[Row] = &[
    ("OpenShift Request on CPU Quota", "requests.cpu", 1, 0, "", QuotaCategory::Cluster, "CPU"),
    ("OpenShift Request on RAM Quota (MiB)", "requests.memory", 4096, 0, "Mi", QuotaCategory::Cluster, ""),
    ("OpenShift Limit on CPU Quota", "limits.cpu", 1, 0, "", QuotaCategory::Cluster, ""),
    ("OpenShift Limit on RAM Quota (MiB)", "limits.memory", 4096, 0, "Mi", QuotaCategory::Cluster, ""),
    ("OpenShift Request on Storage Quota (GiB)", "requests.storage", 20, 0, "Gi", QuotaCategory::Cluster, "Storage"),
    ("OpenShift Request on GPU Quota", "requests.nvidia.com/gpu", 0, 0, "", QuotaCategory::Cluster, "GPU"),
    ("OpenShift Persistent Volume Claims Quota", "persistentvolumeclaims", 2, 0, "", QuotaCategory::Cluster, ""),
];

/// Default spec document for a backend kind
pub fn default_quota_specs(kind: ResourceKind) -> QuotaSpecDocument {
    let rows = match kind {
        ResourceKind::OpenStack => OPENSTACK,
        ResourceKind::Esi => ESI,
        ResourceKind::OpenShift => OPENSHIFT,
        ResourceKind::OpenShiftVm => OPENSHIFT_VM,
    };

    let mut document = QuotaSpecDocument::new();
    for (name, label, multiplier, static_addend, suffix, category, invoice) in rows {
        let spec = QuotaSpec::new(*label, *category)
            .with_multiplier(*multiplier)
            .with_static(*static_addend)
            .with_suffix(*suffix)
            .with_invoice_name(*invoice);
        if let Err(e) = document.add(*name, spec) {
            tracing::warn!("Skipping default quota '{}': {}", name, e);
        }
    }
    document
}
