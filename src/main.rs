use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dhcpdrill::driver::{LoadDriver, random_mac};
use dhcpdrill::modifier::{with_hw_addr, with_message_type, with_transaction_id};
use dhcpdrill::options::{DhcpOption, MessageType};
use dhcpdrill::optspec::{parse_single_mac, parse_specs};
use dhcpdrill::packet::DhcpPacket;
use dhcpdrill::{Config, DhcpClient, Result};

#[derive(Parser)]
#[command(name = "dhcpdrill")]
#[command(author, version, about = "An interactive DHCPv4 client and load generator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "dhcpdrill.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Local IPv4 address to listen on; overrides the config file.
    #[arg(short, long)]
    bind: Option<Ipv4Addr>,

    /// Add an option to every request, as CODE=VALUE or CODE[FORMAT]=VALUE.
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,

    /// Client hardware address, NN:NN:NN:NN:NN:NN. Random when omitted.
    #[arg(long)]
    mac: Option<String>,

    /// Send a single DISCOVER, print what comes back, and exit.
    #[arg(long)]
    query: bool,

    /// With --query, answer the OFFER with a REQUEST to complete the
    /// exchange.
    #[arg(long)]
    request: bool,

    /// Phase timeout in seconds; overrides the config file.
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = Config::load_or_create(&cli.config).await?;
    if let Some(bind) = cli.bind {
        config.bind_ip = bind;
    }
    if let Some(timeout) = cli.timeout {
        config.phase_timeout_seconds = timeout;
    }
    config.option_specs.extend(cli.options.iter().cloned());
    config.validate()?;

    // Option grammar errors surface here, before any socket work.
    let mut options = parse_specs(&config.option_specs)?;
    if !config.params_request.is_empty() {
        options.push(DhcpOption::new(55, config.params_request.clone()));
    }

    let mac = match &cli.mac {
        Some(mac) => parse_single_mac(mac)?.to_vec(),
        None => random_mac(),
    };

    let client = Arc::new(DhcpClient::new(config));
    client.open()?;

    if cli.query {
        run_query(&client, &options, mac, cli.request).await?;
        client.close();
        return Ok(());
    }

    println!("dhcpdrill - interactive DHCPv4 client and load generator");
    println!("Type \"d\" to broadcast a DHCP discover packet, or \"help\" for details");

    run_prompt(client, options).await
}

async fn run_query(
    client: &Arc<DhcpClient>,
    options: &[DhcpOption],
    mac: Vec<u8>,
    request: bool,
) -> Result<()> {
    let config = client.config().clone();
    client.start(config.buffer_size, request, true)?;

    let response = client
        .send(
            DhcpPacket::request(options),
            vec![
                with_transaction_id(rand::random()),
                with_hw_addr(mac),
                with_message_type(MessageType::Discover),
            ],
        )
        .await?;

    let phases: u32 = if request { 2 } else { 1 };
    tokio::time::sleep(config.phase_timeout() * phases).await;

    let offers = response.packets(MessageType::Offer);
    if offers.is_empty() {
        info!("no offer received within the timeout");
    }
    if let Some(lease) = response.lease() {
        info!("{}", lease);
    }

    client.stop().await;
    Ok(())
}

async fn run_prompt(client: Arc<DhcpClient>, options: Vec<DhcpOption>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut driver: Option<LoadDriver> = None;

    while let Some(line) = lines.next_line().await? {
        let params: Vec<&str> = line.split_whitespace().collect();
        let Some(command) = params.first() else {
            continue;
        };

        match *command {
            "q" | "quit" => break,
            "h" | "help" => print_help(),
            "d" | "discover" => {
                if let Err(err) = run_exchange(&client, &options, &params, false, &mut driver).await
                {
                    error!("{}", err);
                }
            }
            "r" | "request" => {
                if let Err(err) = run_exchange(&client, &options, &params, true, &mut driver).await
                {
                    error!("{}", err);
                }
            }
            "s" | "stop" => {
                if let Some(driver) = driver.take() {
                    driver.stop().await;
                }
                client.stop().await;
            }
            _ => println!("Enter a supported command, type \"help\" for details"),
        }
    }

    if let Some(driver) = driver.take() {
        driver.stop().await;
    }
    client.stop().await;
    client.close();
    Ok(())
}

/// `d [devices] [rate]` / `r [devices] [rate]`: with a rate, run the load
/// driver quietly and report counters; without one, send a one-shot
/// discover per device with per-packet logging.
async fn run_exchange(
    client: &Arc<DhcpClient>,
    options: &[DhcpOption],
    params: &[&str],
    auto_request: bool,
    driver: &mut Option<LoadDriver>,
) -> Result<()> {
    let devices: usize = match params.get(1) {
        Some(value) => value
            .parse()
            .map_err(|_| dhcpdrill::Error::InvalidConfig(format!("bad device count: {}", value)))?,
        None => 1,
    };
    let rate: Option<usize> = match params.get(2) {
        Some(value) => Some(
            value
                .parse()
                .map_err(|_| dhcpdrill::Error::InvalidConfig(format!("bad rate: {}", value)))?,
        ),
        None => None,
    };

    match rate {
        Some(rate) => {
            client.start(rate * 3, auto_request, false)?;
            *driver = Some(LoadDriver::spawn(
                Arc::clone(client),
                options.to_vec(),
                devices,
                rate,
            ));
        }
        None => {
            client.start(devices.max(1), auto_request, true)?;
            for _ in 0..devices {
                client
                    .send(
                        DhcpPacket::request(options),
                        vec![
                            with_transaction_id(rand::random()),
                            with_hw_addr(random_mac()),
                            with_message_type(MessageType::Discover),
                        ],
                    )
                    .await?;
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("\t d / discover [devices] [rate]");
    println!("\t\t Broadcast DHCP discover packets.");
    println!("\t\t With a rate, pretend [devices] terminals and sustain");
    println!("\t\t [rate] requests per second, reporting throughput every");
    println!("\t\t 5 seconds. Without a rate, send one discover per device");
    println!("\t\t and print the packets exchanged. Default is 1 device.");
    println!("\t r / request [devices] [rate]");
    println!("\t\t Like discover, but answer each offer with a request.");
    println!("\t s / stop");
    println!("\t\t Stop the running client and load driver.");
    println!("\t h / help");
    println!("\t\t Print this message.");
    println!("\t q / quit");
    println!("\t\t Quit the program.");
}
