//! Command line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use nimbus_quota::QuotaCategory;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(
    name = "nimbus-server",
    version,
    about = "Cloud allocation provisioning and quota reconciliation"
)]
pub struct Cli {
    /// Configuration file
    #[arg(
        short = 'c',
        long = "config",
        env = "NIMBUS_CONFIG_FILE",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// Inventory file, overriding `inventory.path`
    #[arg(long = "inventory", env = "NIMBUS_INVENTORY_PATH")]
    pub inventory: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare every active allocation with its provider project
    ValidateAllocations {
        /// Correct discrepancies instead of only reporting them
        #[arg(long)]
        apply: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Add or replace a quota spec on a resource
    AddQuotaToResource(AddQuotaArgs),

    /// Remove a quota spec; existing allocations keep their attribute values
    RemoveQuotaFromResource {
        #[arg(long)]
        resource: String,
        #[arg(long)]
        display_name: String,
    },

    /// Print a resource's quota specs
    ListQuotas {
        #[arg(long)]
        resource: String,
    },

    /// Create or re-enable the project of an allocation
    Activate {
        #[arg(long)]
        allocation: String,
    },

    /// Disable the project of an allocation
    Disable {
        #[arg(long)]
        allocation: String,
    },

    AddUser {
        #[arg(long)]
        allocation: String,
        #[arg(long)]
        username: String,
    },

    RemoveUser {
        #[arg(long)]
        allocation: String,
        #[arg(long)]
        username: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct AddQuotaArgs {
    #[arg(long)]
    pub resource: String,

    /// Install the default quota specs for the resource type
    #[arg(long, conflicts_with_all = ["display_name", "label", "category"])]
    pub defaults: bool,

    #[arg(long, required_unless_present = "defaults")]
    pub display_name: Option<String>,

    /// Provider-side quota key
    #[arg(long, required_unless_present = "defaults")]
    pub label: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub multiplier: i64,

    #[arg(long, default_value_t = 0)]
    pub static_quota: i64,

    #[arg(long, default_value = "")]
    pub unit_suffix: String,

    /// compute, volume, network, object_storage or cluster
    #[arg(long, required_unless_present = "defaults")]
    pub category: Option<QuotaCategory>,

    #[arg(long, default_value = "")]
    pub invoice_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from([
            "nimbus-server",
            "--inventory",
            "inv.json",
            "validate-allocations",
            "--apply",
            "--output",
            "json",
        ]);
        assert_eq!(cli.inventory.as_deref(), Some("inv.json"));
        assert!(matches!(
            cli.command,
            Command::ValidateAllocations {
                apply: true,
                output: OutputFormat::Json
            }
        ));
    }

    #[test]
    fn test_parse_add_quota() {
        let cli = Cli::parse_from([
            "nimbus-server",
            "add-quota-to-resource",
            "--resource",
            "NERC",
            "--display-name",
            "OpenStack Compute GPU Quota",
            "--label",
            "gpu",
            "--multiplier",
            "1",
            "--category",
            "compute",
        ]);
        let Command::AddQuotaToResource(args) = cli.command else {
            panic!("expected add-quota-to-resource");
        };
        assert_eq!(args.label.as_deref(), Some("gpu"));
        assert_eq!(args.category, Some(QuotaCategory::Compute));
        assert!(!args.defaults);
    }

    #[test]
    fn test_add_quota_requires_label_without_defaults() {
        let result = Cli::try_parse_from([
            "nimbus-server",
            "add-quota-to-resource",
            "--resource",
            "NERC",
            "--display-name",
            "x",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "nimbus-server",
            "add-quota-to-resource",
            "--resource",
            "NERC",
            "--defaults",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::AddQuotaToResource(AddQuotaArgs { defaults: true, .. })
        ));
    }
}
