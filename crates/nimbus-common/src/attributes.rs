//! Attribute names shared with the allocation-management application.
//!
//! These strings are the keys of the application's attribute tables and must
//! match them exactly.

// Allocation attributes
pub const ALLOCATION_PROJECT_ID: &str = "Allocated Project ID";
pub const ALLOCATION_PROJECT_NAME: &str = "Allocated Project Name";
pub const ALLOCATION_INSTITUTION_SPECIFIC_CODE: &str = "Institution-Specific Code";

// Resource attributes
pub const RESOURCE_QUOTA_RESOURCES: &str = "Available Quota Resources";
pub const RESOURCE_AUTH_URL: &str = "Identity Endpoint URL";
pub const RESOURCE_API_URL: &str = "OpenShift API Endpoint URL";
pub const RESOURCE_ROLE: &str = "Role for User in Project";
pub const RESOURCE_PROJECT_DOMAIN: &str = "OpenStack Domain for Projects";
pub const RESOURCE_USER_DOMAIN: &str = "OpenStack Domain for Users";
pub const RESOURCE_IDP: &str = "OpenStack Identity Provider";
pub const RESOURCE_FEDERATION_PROTOCOL: &str = "OpenStack Federation Protocol";
pub const RESOURCE_DEFAULT_PUBLIC_NETWORK: &str = "OpenStack Public Network ID";
pub const RESOURCE_DEFAULT_NETWORK_CIDR: &str = "OpenStack Default Network CIDR";
pub const RESOURCE_IDENTITY_NAME: &str = "OpenShift Identity Provider Name";
