//! Subcommand handlers
//!
//! Handlers write their human or JSON output to the given writer; progress
//! and diagnostics go through `tracing`.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use nimbus_common::attributes::ALLOCATION_PROJECT_ID;
use nimbus_common::{AllocationSource, AttributeStore, NimbusError, Resource, Result};
use nimbus_core::{
    Action, Outcome, Reconciler, RunSummary, Task, TaskConfig, TaskDispatcher, TaskRunner,
    TokioSleeper, ValidationReport,
};
use nimbus_plugin::PluginRegistry;
use nimbus_quota::{QuotaSpec, QuotaSpecDocument, default_quota_specs};

use crate::cli::{AddQuotaArgs, Command, OutputFormat};

/// Everything a subcommand needs
pub struct Context {
    pub registry: Arc<PluginRegistry>,
    pub source: Arc<dyn AllocationSource>,
    pub store: Arc<dyn AttributeStore>,
    pub task: TaskConfig,
    pub concurrency: usize,
}

pub async fn execute(ctx: &Context, command: Command, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::ValidateAllocations { apply, output } => {
            validate_allocations(ctx, apply, output, out).await?;
        }
        Command::AddQuotaToResource(args) => {
            let document = add_quota(ctx.source.as_ref(), &args).await?;
            writeln!(
                out,
                "Resource '{}' now has {} quota specs",
                args.resource,
                document.len()
            )?;
        }
        Command::RemoveQuotaFromResource {
            resource,
            display_name,
        } => {
            if remove_quota(ctx.source.as_ref(), &resource, &display_name).await? {
                writeln!(out, "Removed '{}' from '{}'", display_name, resource)?;
            } else {
                writeln!(out, "'{}' has no quota '{}'", resource, display_name)?;
            }
        }
        Command::ListQuotas { resource } => {
            let document = load_document(ctx.source.as_ref(), &resource).await?.1;
            render_quotas(&document, out)?;
        }
        Command::Activate { allocation } => {
            run_task(ctx, Task::Activate { allocation_id: allocation.clone() }).await?;
            match ctx.store.get_attribute(&allocation, ALLOCATION_PROJECT_ID).await? {
                Some(project_id) => {
                    writeln!(out, "Allocation {}: project {}", allocation, project_id)?
                }
                None => writeln!(out, "Allocation {}: no project recorded", allocation)?,
            }
        }
        Command::Disable { allocation } => {
            run_task(ctx, Task::Disable { allocation_id: allocation }).await?;
        }
        Command::AddUser {
            allocation,
            username,
        } => {
            run_task(
                ctx,
                Task::AddUser {
                    allocation_id: allocation,
                    username,
                },
            )
            .await?;
        }
        Command::RemoveUser {
            allocation,
            username,
        } => {
            run_task(
                ctx,
                Task::RemoveUser {
                    allocation_id: allocation,
                    username,
                },
            )
            .await?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ValidationOutput<'a> {
    reports: &'a [ValidationReport],
    summary: &'a RunSummary,
}

pub async fn validate_allocations(
    ctx: &Context,
    apply: bool,
    output: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<RunSummary> {
    let reconciler = Reconciler::new(ctx.registry.clone(), ctx.source.clone(), ctx.store.clone())
        .with_concurrency(ctx.concurrency);
    let (reports, summary) = reconciler.validate_all(apply).await?;

    match output {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &ValidationOutput {
                    reports: &reports,
                    summary: &summary,
                },
            )?;
            writeln!(out)?;
        }
        OutputFormat::Text => render_reports(&reports, &summary, out)?,
    }

    info!(
        apply,
        total = summary.total,
        with_discrepancies = summary.with_discrepancies,
        failed = summary.failed,
        actions = summary.actions,
        "Validation finished"
    );
    Ok(summary)
}

fn describe(action: &Action) -> String {
    match action {
        Action::AddedUser { username } => format!("added user {}", username),
        Action::RemovedUser { username } => format!("removed user {}", username),
        Action::PersistedDefaultQuota { attribute, value } => {
            format!("set '{}' to {} from allocation quantity", attribute, value)
        }
        Action::AdoptedQuota { attribute, value } => {
            format!("recorded provider value {} for '{}'", value, attribute)
        }
        Action::ReappliedQuota => "re-applied quota to provider".to_string(),
        Action::MergedLabels { labels } => format!("merged labels {}", labels.join(", ")),
        Action::ReplacedLimits => "replaced limit ranges".to_string(),
    }
}

fn render_reports(
    reports: &[ValidationReport],
    summary: &RunSummary,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    for report in reports {
        let project = report.project_id.as_deref().unwrap_or("-");
        match report.outcome {
            Outcome::Skipped(reason) => {
                writeln!(
                    out,
                    "[{}] {}: skipped ({})",
                    report.allocation_id, report.resource, reason
                )?;
            }
            Outcome::Checked if report.is_clean() => {
                writeln!(
                    out,
                    "[{}] {} project {}: ok",
                    report.allocation_id, report.resource, project
                )?;
                continue;
            }
            Outcome::Checked => {
                writeln!(
                    out,
                    "[{}] {} project {}: {} discrepancies",
                    report.allocation_id,
                    report.resource,
                    project,
                    report.discrepancies.len()
                )?;
            }
        }
        for discrepancy in &report.discrepancies {
            writeln!(out, "  - {}", discrepancy)?;
        }
        for action in &report.actions {
            writeln!(out, "  * {}", describe(action))?;
        }
        for error in &report.errors {
            writeln!(out, "  ! {}", error)?;
        }
    }

    writeln!(
        out,
        "{} allocations: {} ok, {} with discrepancies, {} skipped, {} unsupported, {} failed, {} actions{}",
        summary.total,
        summary.clean,
        summary.with_discrepancies,
        summary.skipped,
        summary.unsupported,
        summary.failed,
        summary.actions,
        if summary.apply { "" } else { " (dry run)" }
    )
}

async fn load_document(
    source: &dyn AllocationSource,
    resource_name: &str,
) -> Result<(Resource, QuotaSpecDocument)> {
    let resource = source
        .resource(resource_name)
        .await?
        .ok_or_else(|| NimbusError::not_found(format!("resource {}", resource_name)))?;
    let document = QuotaSpecDocument::from_resource(&resource)?;
    Ok((resource, document))
}

/// Add one spec, or with `--defaults` every default spec not already present
///
/// Existing allocations pick up a new spec on their next reconciliation pass.
pub async fn add_quota(
    source: &dyn AllocationSource,
    args: &AddQuotaArgs,
) -> Result<QuotaSpecDocument> {
    let (mut resource, mut document) = load_document(source, &args.resource).await?;

    if args.defaults {
        let kind = resource.kind().ok_or_else(|| {
            NimbusError::Config(format!(
                "resource '{}' has unsupported type '{}'",
                resource.name, resource.resource_type
            ))
        })?;
        for (name, spec) in default_quota_specs(kind).iter() {
            if document.get(name).is_none() {
                document.add(name.clone(), spec.clone())?;
            }
        }
    } else {
        let (Some(display_name), Some(label), Some(category)) =
            (&args.display_name, &args.label, args.category)
        else {
            return Err(NimbusError::Parse(
                "--display-name, --label and --category are required".to_string(),
            ));
        };
        let spec = QuotaSpec::new(label.clone(), category)
            .with_multiplier(args.multiplier)
            .with_static(args.static_quota)
            .with_suffix(args.unit_suffix.clone())
            .with_invoice_name(args.invoice_name.clone());
        document.add(display_name.clone(), spec)?;
    }

    document.write_to(&mut resource)?;
    source.save_resource(&resource).await?;
    info!(resource = %resource.name, specs = document.len(), "Quota specs updated");
    Ok(document)
}

/// Returns whether a spec was removed
pub async fn remove_quota(
    source: &dyn AllocationSource,
    resource_name: &str,
    display_name: &str,
) -> Result<bool> {
    let (mut resource, mut document) = load_document(source, resource_name).await?;
    if document.remove(display_name).is_none() {
        return Ok(false);
    }
    document.write_to(&mut resource)?;
    source.save_resource(&resource).await?;
    info!(resource = %resource.name, display_name, "Quota spec removed");
    Ok(true)
}

fn render_quotas(document: &QuotaSpecDocument, out: &mut dyn Write) -> std::io::Result<()> {
    for (name, spec) in document.iter() {
        writeln!(
            out,
            "{}: label={} category={} multiplier={} static={} suffix={} invoice={}",
            name,
            spec.label,
            spec.category,
            spec.multiplier,
            spec.static_addend,
            spec.unit_suffix,
            spec.invoice_name
        )?;
    }
    Ok(())
}

async fn run_task(ctx: &Context, task: Task) -> anyhow::Result<()> {
    let runner = Arc::new(TaskRunner::new(
        ctx.registry.clone(),
        ctx.source.clone(),
        ctx.store.clone(),
        ctx.task.user_poller(Arc::new(TokioSleeper)),
    ));
    let dispatcher = TaskDispatcher::from_config(runner, &ctx.task);

    let (name, allocation_id) = (task.name(), task.allocation_id().to_string());
    let result = dispatcher.dispatch(task).await;
    dispatcher.shutdown().await;
    result?;

    info!(task = name, allocation_id = %allocation_id, "Task dispatched");
    Ok(())
}
