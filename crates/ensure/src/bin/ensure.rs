//! Ensure CLI - drive SoftLayer resources to a desired state.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ensure::config::{load_spec, DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_SECS};
use ensure::providers::{HostProvider, SshKeyProvider, SubnetProvider};
use ensure::spec::{
    HostParams, SshKeyParams, SubnetParams, SubnetType, DEFAULT_HOST_DISKS,
    DEFAULT_WAIT_TIMEOUT_SECS,
};
use ensure::{
    ClientConfig, DesiredState, Failure, ReconcileResult, Reconciler, ResourceHandle,
    ResourceKind, ResourceParams, ResourceProvider, ResourceSpec, SoftLayerClient,
};

/// Ensure CLI - idempotent SoftLayer provisioning.
#[derive(Parser)]
#[command(name = "ensure")]
#[command(about = "Make SoftLayer hosts, ssh keys and subnets present or absent")]
#[command(version)]
struct Cli {
    /// SoftLayer API username (or set `SL_USERNAME` env var).
    #[arg(long, env = "SL_USERNAME", default_value = "")]
    username: String,

    /// SoftLayer API key (or set `SL_API_KEY` env var).
    #[arg(long, env = "SL_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// REST endpoint (or set `SL_API_ENDPOINT` env var).
    #[arg(long, env = "SL_API_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Per-request timeout in seconds (or set `SL_REQUEST_TIMEOUT` env var).
    #[arg(long, env = "SL_REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum State {
    Present,
    Absent,
}

impl From<State> for DesiredState {
    fn from(state: State) -> Self {
        match state {
            State::Present => Self::Present,
            State::Absent => Self::Absent,
        }
    }
}

/// Lifecycle flags shared by every resource command.
#[derive(Args)]
struct Lifecycle {
    /// Desired state.
    #[arg(long, value_enum, default_value_t = State::Present)]
    state: State,

    /// Explicit resource id (absent only).
    #[arg(long, alias = "instance-id")]
    id: Option<String>,

    /// Wait for readiness after creation (default).
    #[arg(long, overrides_with = "no_wait")]
    wait: bool,

    /// Return as soon as the create call is accepted.
    #[arg(long)]
    no_wait: bool,

    /// Wait timeout in seconds.
    #[arg(long, alias = "wait-time", default_value_t = DEFAULT_WAIT_TIMEOUT_SECS)]
    wait_timeout: u64,
}

impl Lifecycle {
    fn spec(self, params: ResourceParams) -> ResourceSpec {
        let mut spec = ResourceSpec::new(self.state.into(), params)
            .with_wait(self.wait || !self.no_wait, self.wait_timeout);
        if let Some(id) = self.id {
            spec = spec.with_id(id);
        }
        spec
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a spec file (YAML or JSON).
    Apply {
        /// Path to the spec file.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Bare metal host.
    Host {
        #[command(flatten)]
        lifecycle: Lifecycle,

        /// Hostname.
        #[arg(long)]
        hostname: Option<String>,

        /// Domain.
        #[arg(long)]
        domain: Option<String>,

        /// Datacenter short name (e.g., dal10).
        #[arg(long)]
        datacenter: Option<String>,

        /// Tags (comma-separated).
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Processor cores.
        #[arg(long)]
        cpus: Option<u32>,

        /// Memory in GB.
        #[arg(long)]
        memory: Option<u32>,

        /// Disk capacities in GB (comma-separated).
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_HOST_DISKS)]
        disks: Vec<u32>,

        /// Use local disks (default).
        #[arg(long, overrides_with = "no_local_disk")]
        local_disk: bool,

        /// Use SAN disks.
        #[arg(long)]
        no_local_disk: bool,

        /// Bill hourly (default).
        #[arg(long, overrides_with = "no_hourly")]
        hourly: bool,

        /// Bill monthly.
        #[arg(long)]
        no_hourly: bool,

        /// Private network only.
        #[arg(long)]
        private: bool,

        /// Dedicated host.
        #[arg(long)]
        dedicated: bool,

        /// Operating system reference code.
        #[arg(long)]
        os_code: Option<String>,

        /// Image template global identifier.
        #[arg(long)]
        image_id: Option<String>,

        /// NIC speed in Mbps (10, 100 or 1000).
        #[arg(long)]
        nic_speed: Option<u32>,

        /// Public VLAN id.
        #[arg(long)]
        public_vlan: Option<u64>,

        /// Private VLAN id.
        #[arg(long)]
        private_vlan: Option<u64>,

        /// SSH key ids (comma-separated).
        #[arg(long, value_delimiter = ',')]
        ssh_keys: Vec<u64>,

        /// Post install script URI.
        #[arg(long)]
        post_uri: Option<String>,
    },

    /// Account ssh key.
    SshKey {
        #[command(flatten)]
        lifecycle: Lifecycle,

        /// Key label.
        #[arg(long, alias = "name")]
        label: Option<String>,

        /// Public key material.
        #[arg(long, conflicts_with = "key_file")]
        key: Option<String>,

        /// Read public key material from a file.
        #[arg(long)]
        key_file: Option<PathBuf>,
    },

    /// Secondary or global subnet.
    Subnet {
        #[command(flatten)]
        lifecycle: Lifecycle,

        /// VLAN id.
        #[arg(long)]
        vlan_id: Option<u64>,

        /// Subnet type (private, public or global).
        #[arg(long)]
        subnet_type: Option<SubnetType>,

        /// IP version (4 or 6).
        #[arg(long, default_value_t = 4)]
        version: u8,

        /// Number of addresses.
        #[arg(long)]
        quantity: Option<u32>,
    },
}

/// Record printed on stdout.
#[derive(Serialize)]
struct Output {
    changed: bool,
    failed: bool,
    resource: Option<ResourceHandle>,
    error: Option<Failure>,
    warnings: Vec<String>,
}

impl From<ReconcileResult> for Output {
    fn from(result: ReconcileResult) -> Self {
        Self {
            changed: result.changed,
            failed: result.is_failed(),
            resource: result.resource,
            error: result.error,
            warnings: result.warnings,
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_spec(command: Commands) -> Result<ResourceSpec> {
    let spec = match command {
        Commands::Apply { file } => load_spec(&file)
            .with_context(|| format!("Failed to load spec from {}", file.display()))?,

        Commands::Host {
            lifecycle,
            hostname,
            domain,
            datacenter,
            tags,
            cpus,
            memory,
            disks,
            local_disk,
            no_local_disk,
            hourly,
            no_hourly,
            private,
            dedicated,
            os_code,
            image_id,
            nic_speed,
            public_vlan,
            private_vlan,
            ssh_keys,
            post_uri,
        } => lifecycle.spec(ResourceParams::Host(HostParams {
            hostname,
            domain,
            datacenter,
            tags,
            cpus,
            memory,
            disks,
            local_disk: local_disk || !no_local_disk,
            hourly: hourly || !no_hourly,
            private,
            dedicated,
            os_code,
            image_id,
            nic_speed,
            public_vlan,
            private_vlan,
            ssh_keys,
            post_uri,
        })),

        Commands::SshKey {
            lifecycle,
            label,
            key,
            key_file,
        } => {
            let key = match key_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read key file {}", path.display()))?
                        .trim()
                        .to_string(),
                ),
                None => key,
            };
            lifecycle.spec(ResourceParams::SshKey(SshKeyParams { label, key }))
        }

        Commands::Subnet {
            lifecycle,
            vlan_id,
            subnet_type,
            version,
            quantity,
        } => lifecycle.spec(ResourceParams::Subnet(SubnetParams {
            vlan_id,
            subnet_type,
            version,
            quantity,
        })),
    };
    Ok(spec)
}

fn provider_for(kind: ResourceKind, client: &Arc<SoftLayerClient>) -> Arc<dyn ResourceProvider> {
    match kind {
        ResourceKind::Host => Arc::new(HostProvider::new(client.clone())),
        ResourceKind::SshKey => Arc::new(SshKeyProvider::new(client.clone())),
        ResourceKind::Subnet => Arc::new(SubnetProvider::new(client.clone())),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let spec = build_spec(cli.command)?;

    let config = ClientConfig::new(cli.username, cli.api_key)
        .with_endpoint(cli.endpoint)
        .with_request_timeout(Duration::from_secs(cli.request_timeout));
    let client = Arc::new(SoftLayerClient::new(config).context("Failed to create SoftLayer client")?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let reconciler =
        Reconciler::new(provider_for(spec.kind(), &client)).with_cancellation(cancel);

    let output = match reconciler.reconcile(&spec).await {
        Ok(result) => Output::from(result),
        Err(e) => {
            warn!(error = %e, "Reconciliation failed");
            Output {
                changed: false,
                failed: true,
                resource: None,
                error: Some(Failure::from(&e)),
                warnings: Vec::new(),
            }
        }
    };

    info!(changed = output.changed, failed = output.failed, "Finished");
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if output.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
