mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use xcform_client::{ClientConfig, HttpTransport};
use xcform_core::catalog::builtin_registry;
use xcform_core::controller::{Applied, OperationContext, ReadOutcome};
use xcform_core::dispatch::{GenericResource, ProviderServer};
use xcform_core::plan::{self, ChangeAction, PlannedChange};
use xcform_core::schema::AttributeMode;
use xcform_state::backends::LocalBackend;
use xcform_state::{LockInfo, ResourceState, StateBackend, StateFile};

use crate::config::Desired;

#[derive(Parser)]
#[command(name = "xcform")]
#[command(about = "Manage F5 Distributed Cloud configuration objects", long_about = None)]
struct Cli {
    /// Path to the state file
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    /// Provider name used as resource type prefix
    #[arg(long, global = true, default_value = "f5xc")]
    provider: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported resource types
    Resources,
    /// Show the attributes of a resource type
    Schema {
        /// Resource type, with or without provider prefix
        resource_type: String,
    },
    /// Validate the configuration file
    Validate {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Refresh tracked resources before planning
        #[arg(long)]
        refresh: bool,
    },
    /// Apply changes to reach the desired state
    Apply {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Bring an existing object under management
    Import {
        resource_type: String,
        /// `<namespace>/<name>`
        id: String,
    },
    /// Update tracked resources from the remote API
    Refresh,
    /// Delete every tracked resource
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Remove a lock left behind by an interrupted run
    ForceUnlock { lock_id: String },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Resources => run_resources(&cli),
        Commands::Schema { resource_type } => run_schema(&cli, resource_type),
        Commands::Validate { file } => run_validate(&cli, file),
        Commands::Plan { file, refresh } => run_plan(&cli, file, *refresh).await,
        Commands::Apply { file } => run_apply(&cli, file).await,
        Commands::Import { resource_type, id } => run_import(&cli, resource_type, id).await,
        Commands::Refresh => run_refresh(&cli).await,
        Commands::Destroy { auto_approve } => run_destroy(&cli, *auto_approve).await,
        Commands::ForceUnlock { lock_id } => run_force_unlock(&cli, lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Server whose transport fails every call; enough for offline commands
fn offline_server(cli: &Cli) -> ProviderServer {
    ProviderServer::new(&cli.provider, builtin_registry(), Arc::new(offline::Offline))
}

fn online_server(cli: &Cli) -> Result<ProviderServer, String> {
    let config = ClientConfig::from_env().map_err(|e| e.to_string())?;
    log::debug!("Using {:?}", config);
    let transport = HttpTransport::new(config).map_err(|e| e.to_string())?;
    Ok(ProviderServer::new(
        &cli.provider,
        builtin_registry(),
        Arc::new(transport),
    ))
}

/// Context cancelled by Ctrl-C
fn interruptible() -> OperationContext {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling in-flight operation...".yellow());
            child.cancel();
        }
    });
    OperationContext::with_token(token)
}

fn run_resources(cli: &Cli) -> Result<(), String> {
    let server = offline_server(cli);
    for resource in server.resources() {
        let metadata = resource.metadata();
        println!(
            "{:<40} {}",
            metadata.type_name,
            metadata.timeout_category.to_string().dimmed()
        );
    }
    Ok(())
}

fn run_schema(cli: &Cli, resource_type: &str) -> Result<(), String> {
    let server = offline_server(cli);
    let resource = server.resource(resource_type).map_err(|e| e.to_string())?;
    let schema = resource.schema();

    println!("{}", resource.metadata().type_name.cyan().bold());
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }
    println!();

    for name in schema.attribute_names() {
        let Some(attr) = schema.get(name) else {
            continue;
        };
        let mode = match attr.mode {
            AttributeMode::Required => "required".red(),
            AttributeMode::Optional => "optional".normal(),
            AttributeMode::Computed => "computed".dimmed(),
            AttributeMode::OptionalComputed => "optional, computed".normal(),
        };
        let mut flags = Vec::new();
        if attr.requires_replace {
            flags.push("forces replacement".to_string());
        }
        if !attr.conflicts_with.is_empty() {
            flags.push(format!("conflicts with {}", attr.conflicts_with.join(", ")));
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join("; ")).yellow().to_string()
        };
        println!("  {:<36} {:<10} {}{}", name, attr.attr_type, mode, flags);
    }
    Ok(())
}

fn run_validate(cli: &Cli, file: &Path) -> Result<(), String> {
    let server = offline_server(cli);
    let desired = config::load(file, &server)?;

    let mut errors = Vec::new();
    for item in &desired {
        let resource = server.resource(&item.kind).map_err(|e| e.to_string())?;
        if let Err(e) = resource.plan(None, &item.instance) {
            errors.push(format!("{}: {}", item.instance.address(), e));
        }
    }

    if errors.is_empty() {
        println!("{}", "Configuration is valid.".green());
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

async fn run_plan(cli: &Cli, file: &Path, refresh: bool) -> Result<(), String> {
    let backend = LocalBackend::with_path(cli.state.clone());
    let mut state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    let server = if refresh {
        let server = online_server(cli)?;
        refresh_all(&server, &mut state, &interruptible()).await?;
        server
    } else {
        offline_server(cli)
    };

    let desired = config::load(file, &server)?;
    let changes = plan_all(&server, &state, &desired)?;
    print_plan(&changes);
    Ok(())
}

/// One planned step with the resource that carries it out
struct Step {
    resource: GenericResource,
    change: PlannedChange,
    prior: Option<ResourceState>,
    config: Option<Desired>,
}

fn plan_all(
    server: &ProviderServer,
    state: &StateFile,
    desired: &[Desired],
) -> Result<Vec<Step>, String> {
    let mut steps = Vec::new();

    for item in desired {
        let resource = server.resource(&item.kind).map_err(|e| e.to_string())?;
        let prior = state.find(&item.kind, &item.id()).cloned();
        let prior_instance = prior.as_ref().map(ResourceState::to_instance);
        let change = resource
            .plan(prior_instance.as_ref(), &item.instance)
            .map_err(|e| e.to_string())?;
        steps.push(Step {
            resource,
            change,
            prior,
            config: Some(item.clone()),
        });
    }

    // Tracked but no longer configured
    for tracked in state.resources.iter().rev() {
        let configured = desired
            .iter()
            .any(|d| d.kind == tracked.resource_type && d.id() == tracked.id);
        if configured || tracked.provider != server.name() {
            continue;
        }
        let resource = server
            .resource(&tracked.resource_type)
            .map_err(|e| e.to_string())?;
        steps.push(Step {
            resource,
            change: plan::plan_delete(&tracked.to_instance()),
            prior: Some(tracked.clone()),
            config: None,
        });
    }

    Ok(steps)
}

fn print_plan(steps: &[Step]) {
    let changes: Vec<&Step> = steps.iter().filter(|s| s.change.action.is_change()).collect();
    if changes.is_empty() {
        println!("{}", "No changes. Configuration is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    for step in &changes {
        let change = &step.change;
        let symbol = match change.action {
            ChangeAction::Create => change.action.symbol().green(),
            ChangeAction::Update => change.action.symbol().yellow(),
            ChangeAction::Replace => change.action.symbol().magenta(),
            ChangeAction::Delete => change.action.symbol().red(),
            ChangeAction::NoOp => change.action.symbol().normal(),
        };
        println!("  {} {}", symbol, change.planned.address().bold());
        for attr in &change.changed_attributes {
            if change.replace_attributes.contains(attr) {
                println!("      {} {}", attr, "(forces replacement)".magenta());
            } else {
                println!("      {}", attr);
            }
        }
    }

    let count = |action: ChangeAction| changes.iter().filter(|s| s.change.action == action).count();
    println!();
    println!(
        "Plan: {} to create, {} to update, {} to replace, {} to delete.",
        count(ChangeAction::Create),
        count(ChangeAction::Update),
        count(ChangeAction::Replace),
        count(ChangeAction::Delete)
    );
}

/// Run `body` under the state lock, releasing it whatever the outcome
async fn with_lock<F, Fut>(backend: &LocalBackend, operation: &str, body: F) -> Result<(), String>
where
    F: FnOnce(StateFile) -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let lock: LockInfo = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| e.to_string())?;

    let result = match backend.read_state().await {
        Ok(state) => body(state.unwrap_or_default()).await,
        Err(e) => Err(e.to_string()),
    };

    if let Err(e) = backend.release_lock(&lock).await {
        log::error!("Failed to release state lock {}: {}", lock.id, e);
        eprintln!(
            "{} state lock {} was not released: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
    result
}

async fn save(backend: &LocalBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend.write_state(state).await.map_err(|e| e.to_string())
}

fn record(state: &mut StateFile, provider: &str, applied: &Applied) {
    state.upsert(ResourceState::from_instance(
        provider,
        &applied.instance,
        applied.private.clone(),
    ));
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("    {} {}", "Warning:".yellow().bold(), warning);
    }
}

async fn run_apply(cli: &Cli, file: &Path) -> Result<(), String> {
    let server = online_server(cli)?;
    let desired = config::load(file, &server)?;
    let backend = &LocalBackend::with_path(cli.state.clone());
    let ctx = interruptible();

    with_lock(backend, "apply", |mut state| async move {
        let steps = plan_all(&server, &state, &desired)?;
        print_plan(&steps);
        if !steps.iter().any(|s| s.change.action.is_change()) {
            return Ok(());
        }
        println!();

        let mut applied_count = 0;
        for step in &steps {
            apply_step(&server, backend, &mut state, &ctx, step).await?;
            if step.change.action.is_change() {
                applied_count += 1;
            }
        }

        println!();
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", applied_count)
                .green()
                .bold()
        );
        Ok(())
    })
    .await
}

/// Carry out one step and persist the result before the next one starts
async fn apply_step(
    server: &ProviderServer,
    backend: &LocalBackend,
    state: &mut StateFile,
    ctx: &OperationContext,
    step: &Step,
) -> Result<(), String> {
    let resource = &step.resource;
    let address = step.change.planned.address();
    let kind = &resource.descriptor().type_name;
    let prior = step.prior.as_ref().map(|p| (p.to_instance(), p.private.clone()));
    let fail = |e: xcform_core::error::ResourceError| {
        println!("  {} {}", "✗".red(), address);
        format!("{}: {}", address, e)
    };

    match (step.change.action, &step.config, prior) {
        (ChangeAction::NoOp, _, _) => return Ok(()),
        (ChangeAction::Create, Some(config), _) => {
            let applied = resource.create(ctx, &config.instance).await.map_err(fail)?;
            record(state, server.name(), &applied);
            print_warnings(&applied.warnings);
        }
        (ChangeAction::Update, Some(config), Some((instance, private))) => {
            let applied = resource
                .update(ctx, &instance, &config.instance, &private)
                .await
                .map_err(fail)?;
            record(state, server.name(), &applied);
            print_warnings(&applied.warnings);
        }
        (ChangeAction::Replace, Some(config), Some((instance, private))) => {
            let warnings = resource
                .delete(ctx, &instance, &private)
                .await
                .map_err(fail)?;
            print_warnings(&warnings);
            if let Some(tracked) = &step.prior {
                state.remove(kind, &tracked.id);
            }
            save(backend, state).await?;
            let applied = resource.create(ctx, &config.instance).await.map_err(fail)?;
            record(state, server.name(), &applied);
            print_warnings(&applied.warnings);
        }
        (ChangeAction::Delete, _, Some((instance, private))) => {
            let warnings = resource
                .delete(ctx, &instance, &private)
                .await
                .map_err(fail)?;
            print_warnings(&warnings);
            if let Some(tracked) = &step.prior {
                state.remove(kind, &tracked.id);
            }
        }
        (action, _, _) => return Err(format!("{}: cannot {} without prior state", address, action)),
    }

    println!("  {} {}", "✓".green(), address);
    save(backend, state).await
}

async fn run_import(cli: &Cli, resource_type: &str, id: &str) -> Result<(), String> {
    let server = online_server(cli)?;
    let resource = server.resource(resource_type).map_err(|e| e.to_string())?;
    let backend = &LocalBackend::with_path(cli.state.clone());
    let ctx = interruptible();

    with_lock(backend, "import", |mut state| async move {
        let kind = resource.descriptor().type_name.clone();
        if state.find(&kind, id).is_some() {
            return Err(format!("{}.{} is already managed", kind, id));
        }

        let applied = resource
            .import_state(&ctx, id)
            .await
            .map_err(|e| e.to_string())?;
        record(&mut state, server.name(), &applied);
        save(backend, &mut state).await?;

        print_warnings(&applied.warnings);
        println!(
            "{} {}",
            "Imported".green().bold(),
            applied.instance.address()
        );
        Ok(())
    })
    .await
}

/// Refresh every tracked resource; removed objects leave the state
async fn refresh_all(
    server: &ProviderServer,
    state: &mut StateFile,
    ctx: &OperationContext,
) -> Result<(), String> {
    let tracked: Vec<ResourceState> = state
        .resources
        .iter()
        .filter(|r| r.provider == server.name())
        .cloned()
        .collect();

    for entry in tracked {
        let resource = server
            .resource(&entry.resource_type)
            .map_err(|e| e.to_string())?;
        match resource
            .read(ctx, &entry.to_instance(), &entry.private)
            .await
            .map_err(|e| format!("{}: {}", entry.address(), e))?
        {
            ReadOutcome::Found(applied) => {
                print_warnings(&applied.warnings);
                record(state, server.name(), &applied);
            }
            ReadOutcome::Removed => {
                println!(
                    "  {} {} no longer exists",
                    "-".red(),
                    entry.address()
                );
                state.remove(&entry.resource_type, &entry.id);
            }
        }
    }
    Ok(())
}

async fn run_refresh(cli: &Cli) -> Result<(), String> {
    let server = online_server(cli)?;
    let backend = &LocalBackend::with_path(cli.state.clone());
    let ctx = interruptible();

    with_lock(backend, "refresh", |mut state| async move {
        refresh_all(&server, &mut state, &ctx).await?;
        save(backend, &mut state).await?;
        println!(
            "{}",
            format!("Refreshed {} resources.", state.resources.len()).green()
        );
        Ok(())
    })
    .await
}

async fn run_destroy(cli: &Cli, auto_approve: bool) -> Result<(), String> {
    let server = online_server(cli)?;
    let backend = &LocalBackend::with_path(cli.state.clone());
    let ctx = interruptible();

    with_lock(backend, "destroy", |mut state| async move {
        let steps = plan_all(&server, &state, &[])?;
        if steps.is_empty() {
            println!("{}", "No resources to destroy.".green());
            return Ok(());
        }
        print_plan(&steps);

        if !auto_approve {
            println!();
            println!("Do you really want to destroy all resources? Only 'yes' will be accepted.");
            let mut input = String::new();
            std::io::stdin()
                .read_line(&mut input)
                .map_err(|e| format!("Failed to read input: {}", e))?;
            if input.trim() != "yes" {
                println!("{}", "Destroy cancelled.".yellow());
                return Ok(());
            }
        }

        println!();
        for step in &steps {
            apply_step(&server, backend, &mut state, &ctx, step).await?;
        }
        println!();
        println!("{}", "Destroy complete!".green().bold());
        Ok(())
    })
    .await
}

async fn run_force_unlock(cli: &Cli, lock_id: &str) -> Result<(), String> {
    let backend = LocalBackend::with_path(cli.state.clone());
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", "State lock removed.".green());
    Ok(())
}

mod offline {
    use async_trait::async_trait;

    use xcform_core::descriptor::ResourceDescriptor;
    use xcform_core::envelope::Envelope;
    use xcform_core::transport::{
        ClientTransport, TransportError, TransportErrorKind, TransportResult,
    };

    /// Transport for commands that never reach the API
    pub struct Offline;

    fn unavailable<T>() -> TransportResult<T> {
        Err(TransportError::new(
            TransportErrorKind::Other,
            "this command does not contact the API",
        ))
    }

    #[async_trait]
    impl ClientTransport for Offline {
        async fn get(
            &self,
            _descriptor: &ResourceDescriptor,
            _namespace: &str,
            _name: &str,
        ) -> TransportResult<Envelope> {
            unavailable()
        }

        async fn create(
            &self,
            _descriptor: &ResourceDescriptor,
            _envelope: &Envelope,
        ) -> TransportResult<Envelope> {
            unavailable()
        }

        async fn update(
            &self,
            _descriptor: &ResourceDescriptor,
            _envelope: &Envelope,
        ) -> TransportResult<Envelope> {
            unavailable()
        }

        async fn delete(
            &self,
            _descriptor: &ResourceDescriptor,
            _namespace: &str,
            _name: &str,
        ) -> TransportResult<()> {
            unavailable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcform_core::mock::MockTransport;

    fn server() -> ProviderServer {
        ProviderServer::new("f5xc", builtin_registry(), Arc::new(MockTransport::new()))
    }

    fn tracked_label(name: &str, value: &str) -> ResourceState {
        ResourceState::new("known_label", format!("shared/{}", name), "f5xc")
            .with_attribute("name", serde_json::json!(name))
            .with_attribute("namespace", serde_json::json!("shared"))
            .with_attribute("id", serde_json::json!(format!("shared/{}", name)))
            .with_attribute("key", serde_json::json!("env"))
            .with_attribute("value", serde_json::json!(value))
    }

    fn desired(content: &str) -> Vec<Desired> {
        config::parse(content, &server()).unwrap()
    }

    #[test]
    fn plan_classifies_each_tracked_and_configured_instance() {
        let mut state = StateFile::new();
        state.upsert(tracked_label("same", "prod"));
        state.upsert(tracked_label("changed", "prod"));
        state.upsert(tracked_label("orphan", "prod"));

        let desired = desired(
            r#"{"resources": [
                {"type": "known_label", "name": "same", "namespace": "shared", "key": "env", "value": "prod"},
                {"type": "known_label", "name": "changed", "namespace": "shared", "key": "env", "value": "dev"},
                {"type": "known_label", "name": "new", "namespace": "shared", "key": "env", "value": "qa"}
            ]}"#,
        );

        let steps = plan_all(&server(), &state, &desired).unwrap();
        let actions: Vec<(String, ChangeAction)> = steps
            .iter()
            .map(|s| (s.change.planned.address(), s.change.action))
            .collect();

        assert_eq!(
            actions,
            vec![
                ("known_label.shared/same".to_string(), ChangeAction::NoOp),
                ("known_label.shared/changed".to_string(), ChangeAction::Replace),
                ("known_label.shared/new".to_string(), ChangeAction::Create),
                ("known_label.shared/orphan".to_string(), ChangeAction::Delete),
            ]
        );
        assert!(steps[3].config.is_none());
        assert!(steps[1].prior.is_some());
    }

    #[test]
    fn plan_ignores_other_providers() {
        let mut state = StateFile::new();
        state.upsert(ResourceState::new("known_label", "shared/x", "other"));

        let steps = plan_all(&server(), &state, &[]).unwrap();
        assert!(steps.is_empty());
    }

    #[test]
    fn plan_rejects_invalid_configuration() {
        let desired = desired(
            r#"{"resources": [{"type": "known_label", "name": "kl", "namespace": "shared"}]}"#,
        );
        let err = plan_all(&server(), &StateFile::new(), &desired)
            .err()
            .unwrap();
        assert!(err.contains("key"));
    }

    #[tokio::test]
    async fn force_unlock_removes_lock() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "xcform",
            "--state",
            dir.path().join("test.state.json").to_str().unwrap(),
            "refresh",
        ]);
        let backend = LocalBackend::with_path(cli.state.clone());
        let lock = backend.acquire_lock("apply").await.unwrap();

        run_force_unlock(&cli, &lock.id).await.unwrap();
        assert!(!backend.lock_path().exists());
    }
}
