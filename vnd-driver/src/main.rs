use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vnd_driver::options::{INTERNAL, MTU, PARENT};
use vnd_driver::{
    DriverConfig, EndpointInterface, Flavor, GenericOptions, IpamData, MacAddress, NetworkConfig,
    NetworkDriver, VlanDriver,
};
use vnd_store::ObjectStore;

#[derive(Parser)]
#[command(name = "vnd")]
#[command(version, about = "Persistent macvlan/ipvlan network driver state", long_about = None)]
struct Cli {
    /// Directory holding the driver database
    #[arg(short, long, default_value = "/var/lib/vnd")]
    data_dir: PathBuf,

    /// Driver type: macvlan or ipvlan
    #[arg(long, default_value = "macvlan", value_parser = parse_flavor)]
    driver: &'static Flavor,

    /// Keep all state in memory only
    #[arg(long)]
    no_store: bool,

    /// Retries after a version conflict on update (0 = fail immediately)
    #[arg(long, default_value_t = vnd_driver::config::DEFAULT_CONFLICT_RETRIES)]
    conflict_retries: u32,

    /// Log filter, overrides RUST_LOG (e.g. debug, vnd_driver=trace)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore persisted state and print a summary
    Restore,

    /// List networks
    Networks,

    /// List the endpoints of a network
    Endpoints {
        /// Network ID
        network: String,
    },

    /// Create a network
    CreateNetwork {
        /// Network ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Parent interface, e.g. eth0 or eth0.10
        #[arg(short, long)]
        parent: Option<String>,

        /// Driver mode (macvlan: bridge, private, vepa, passthru; ipvlan: l2, l3, l3s)
        #[arg(short, long)]
        mode: Option<String>,

        /// ipvlan flag: bridge, private or vepa
        #[arg(long)]
        flag: Option<String>,

        /// Link MTU
        #[arg(long)]
        mtu: Option<u32>,

        /// Network without external connectivity
        #[arg(long)]
        internal: bool,

        /// Address pool, optionally with gateway (format: pool[@gateway], can be repeated)
        #[arg(long, value_parser = parse_pool)]
        subnet: Vec<IpamData>,
    },

    /// Delete a network and its endpoints
    DeleteNetwork {
        /// Network ID
        id: String,
    },

    /// Create an endpoint
    CreateEndpoint {
        /// Network ID
        network: String,

        /// Endpoint ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// IPv4 address with prefix length
        #[arg(long)]
        addr: Option<Ipv4Net>,

        /// IPv6 address with prefix length
        #[arg(long)]
        addrv6: Option<Ipv6Net>,

        /// MAC address (macvlan only)
        #[arg(long)]
        mac: Option<MacAddress>,

        /// Host-side interface name
        #[arg(long)]
        src_name: Option<String>,
    },

    /// Delete an endpoint
    DeleteEndpoint {
        /// Network ID
        network: String,

        /// Endpoint ID
        id: String,
    },
}

fn parse_flavor(s: &str) -> Result<&'static Flavor, String> {
    Flavor::from_name(s).ok_or_else(|| format!("unknown driver {s:?}, expected macvlan or ipvlan"))
}

/// Parse `10.0.0.0/24` or `10.0.0.0/24@10.0.0.1`.
fn parse_pool(s: &str) -> Result<IpamData, String> {
    let (pool, gateway) = match s.split_once('@') {
        Some((pool, gateway)) => (pool, Some(gateway)),
        None => (s, None),
    };
    let pool: IpNet = pool
        .parse()
        .map_err(|e| format!("invalid pool {pool:?}: {e}"))?;
    let gateway = gateway
        .map(|gw| {
            let addr: IpAddr = gw
                .parse()
                .map_err(|e| format!("invalid gateway {gw:?}: {e}"))?;
            IpNet::new(addr, pool.prefix_len()).map_err(|e| e.to_string())
        })
        .transpose()?;
    Ok(IpamData::new(pool, gateway))
}

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "PARENT")]
    parent: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "MTU")]
    mtu: u32,
    #[tabled(rename = "INTERNAL")]
    internal: bool,
    #[tabled(rename = "SUBNETS")]
    subnets: String,
    #[tabled(rename = "ENDPOINTS")]
    endpoints: usize,
}

impl NetworkRow {
    fn new(network: &NetworkConfig, endpoints: usize) -> Self {
        let mode = match &network.flag {
            Some(flag) => format!("{} ({flag})", network.mode),
            None => network.mode.clone(),
        };
        let subnets = network
            .subnets()
            .map(|s| s.subnet.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: network.id.clone(),
            parent: network.parent.clone(),
            mode,
            mtu: network.mtu,
            internal: network.internal,
            subnets: if subnets.is_empty() { "-".to_string() } else { subnets },
            endpoints,
        }
    }
}

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "SRC NAME")]
    src_name: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "IPV4")]
    addr: String,
    #[tabled(rename = "IPV6")]
    addrv6: String,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = if cli.no_store {
        info!("Running without a store, state is not persisted");
        None
    } else {
        let store = ObjectStore::open(&cli.data_dir).with_context(|| {
            format!("failed to open store in {}", cli.data_dir.display())
        })?;
        Some(Arc::new(store))
    };

    let config = DriverConfig::default().with_conflict_retries(cli.conflict_retries);
    let driver = VlanDriver::init(cli.driver, store, config)
        .context("failed to restore driver state")?;

    match cli.command {
        Commands::Restore => {
            let report = driver.restore_report();
            println!("Driver:             {}", driver.network_type());
            println!("Networks restored:  {}", report.networks_restored);
            println!("Networks skipped:   {}", report.networks_skipped);
            println!("Endpoints restored: {}", report.endpoints_restored);
            println!("Endpoints purged:   {}", report.endpoints_purged);
            println!("Purge failures:     {}", report.purge_failures);
            println!("Undecodable:        {}", report.undecodable);
        }

        Commands::Networks => {
            let networks = driver.networks()?;
            if networks.is_empty() {
                println!("No networks found");
            } else {
                let mut rows = Vec::with_capacity(networks.len());
                for network in &networks {
                    let endpoints = driver.endpoints(&network.id)?.len();
                    rows.push(NetworkRow::new(network, endpoints));
                }
                println!("{}", Table::new(rows));
            }
        }

        Commands::Endpoints { network } => {
            let endpoints = driver.endpoints(&network)?;
            if endpoints.is_empty() {
                println!("No endpoints found");
            } else {
                let rows: Vec<EndpointRow> = endpoints
                    .into_iter()
                    .map(|ep| EndpointRow {
                        id: ep.id,
                        src_name: ep.src_name,
                        mac: or_dash(ep.mac),
                        addr: or_dash(ep.addr),
                        addrv6: or_dash(ep.addrv6),
                    })
                    .collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::CreateNetwork {
            id,
            parent,
            mode,
            flag,
            mtu,
            internal,
            subnet,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());

            let mut options = GenericOptions::new();
            if let Some(parent) = parent {
                options.insert(PARENT.to_string(), parent);
            }
            if let Some(mode) = mode {
                options.insert(cli.driver.mode_option.to_string(), mode);
            }
            if let Some(flag) = flag {
                let Some(spec) = &cli.driver.flag else {
                    bail!("{} networks do not take a flag", cli.driver.name);
                };
                options.insert(spec.option.to_string(), flag);
            }
            if let Some(mtu) = mtu {
                options.insert(MTU.to_string(), mtu.to_string());
            }
            if internal {
                options.insert(INTERNAL.to_string(), "true".to_string());
            }

            let (ipv6, ipv4): (Vec<IpamData>, Vec<IpamData>) = subnet
                .into_iter()
                .partition(|data| matches!(data.pool, IpNet::V6(_)));

            driver.create_network(&id, &options, &ipv4, &ipv6)?;
            println!("Created network: {id}");
        }

        Commands::DeleteNetwork { id } => {
            driver.delete_network(&id)?;
            println!("Deleted network: {id}");
        }

        Commands::CreateEndpoint {
            network,
            id,
            addr,
            addrv6,
            mac,
            src_name,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
            let iface = EndpointInterface {
                mac,
                addr,
                addrv6,
                src_name,
            };
            driver.create_endpoint(&network, &id, &iface)?;

            let endpoint = driver.endpoint(&network, &id)?;
            println!("Created endpoint: {id}");
            println!("  Src name: {}", endpoint.src_name);
            println!("  MAC:      {}", or_dash(endpoint.mac));
        }

        Commands::DeleteEndpoint { network, id } => {
            driver.delete_endpoint(&network, &id)?;
            println!("Deleted endpoint: {id}");
        }
    }

    Ok(())
}
