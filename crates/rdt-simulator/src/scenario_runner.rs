use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, anyhow};
use rdt_abstract::{LossConfig, Scenario, ScenarioAssertion, TransferConfig};
use rdt_core::session::output_path;
use rdt_core::{ChunkSequence, DropPolicy, Receiver, UnreliableChannel, send_file};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::info;

use crate::network::MemoryNetwork;
use crate::trace::SimulationReport;

pub const SENDER_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
    4000,
);
pub const RECEIVER_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2)),
    5000,
);

/// Channel seed used when a scenario does not pin one.
pub const DEFAULT_SEED: u64 = 42;

pub fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: Scenario = toml::from_str(&content).context("Failed to parse scenario file")?;
    Ok(scenario)
}

/// Load, run and check a scenario file.
pub async fn run_scenario_file(path: &Path, output_dir: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    let report = run_scenario(&scenario, output_dir).await?;
    check_assertions(&scenario, &report)?;
    info!("Scenario {} passed", scenario.name);
    Ok(report)
}

/// Transfer the scenario payload from a sender to a receiver on a fresh
/// [`MemoryNetwork`]. The receiver writes under `output_dir`.
pub async fn run_scenario(scenario: &Scenario, output_dir: &Path) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut config = TransferConfig::default();
    scenario.config.apply_to(&mut config);
    let seed = *config.seed.get_or_insert(DEFAULT_SEED);
    config.validate().context("Invalid scenario config")?;

    let network = MemoryNetwork::new();
    let receiver_policy = DropPolicy::from_config(
        scenario.receiver_loss.unwrap_or(LossConfig::None),
        Some(seed.wrapping_add(1)),
    );
    let mut receiver = Receiver::new(
        UnreliableChannel::new(network.socket(RECEIVER_ADDR), receiver_policy),
        scenario.protocol,
        output_dir,
    );
    let mut channel = UnreliableChannel::new(
        network.socket(SENDER_ADDR),
        DropPolicy::from_config(config.loss, Some(seed)),
    );

    let payload = scenario.payload.bytes();
    let chunks = ChunkSequence::from_bytes(
        scenario.extension.clone(),
        payload.clone(),
        config.mss,
        scenario.protocol,
    );

    // DONE is fire-and-forget, so the receiver only gets a grace period once
    // the sender is finished.
    let grace = config.timeout() * 2;
    let sender_done = Notify::new();
    let started = Instant::now();

    let sending = async {
        let result = send_file(&mut channel, RECEIVER_ADDR, &chunks, &config).await;
        sender_done.notify_one();
        result
    };
    let receiving = async {
        tokio::select! {
            result = receiver.run(Some(1)) => result,
            _ = async {
                sender_done.notified().await;
                tokio::time::sleep(grace).await;
            } => Ok(()),
        }
    };
    let (sent, received) = tokio::join!(sending, receiving);
    let duration_ms = started.elapsed().as_millis() as u64;

    let stats = sent.context("Sender failed")?;
    received.context("Receiver failed")?;

    let session_closed = receiver.completed() == 1;
    receiver.shutdown().await.context("Failed to close receiver sessions")?;

    let path = output_path(output_dir, SENDER_ADDR, &scenario.extension);
    let delivered = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read output {}", path.display()));
        }
    };

    info!(
        "Finished in {} ms: {} packets sent, {} retransmissions",
        duration_ms, stats.packets_transmitted, stats.retransmissions
    );

    Ok(SimulationReport {
        scenario: scenario.name.clone(),
        protocol: scenario.protocol,
        config,
        duration_ms,
        sender: stats,
        receiver_channel: receiver.channel().stats(),
        session_closed,
        delivered_len: delivered.len(),
        delivered_intact: delivered == payload,
        delivered,
        link_events: network.events(),
    })
}

pub fn check_assertions(scenario: &Scenario, report: &SimulationReport) -> anyhow::Result<()> {
    for assertion in &scenario.assertions {
        match assertion {
            ScenarioAssertion::DeliveredIntact => {
                if !report.delivered_intact {
                    return Err(anyhow!(
                        "Assertion Failed: receiver wrote {} bytes that do not match the {}-byte payload",
                        report.delivered_len,
                        scenario.payload.bytes().len()
                    ));
                }
            }
            ScenarioAssertion::SenderPacketCount { min, max } => {
                let sent = report.sender.packets_transmitted;
                if sent < *min {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected min {}",
                        sent,
                        min
                    ));
                }
                if let Some(max) = max {
                    if sent > *max {
                        return Err(anyhow!(
                            "Assertion Failed: Sender sent {} packets, expected max {}",
                            sent,
                            max
                        ));
                    }
                }
            }
            ScenarioAssertion::SessionClosed => {
                if !report.session_closed {
                    return Err(anyhow!(
                        "Assertion Failed: receiver session was not closed by DONE"
                    ));
                }
            }
            ScenarioAssertion::MaxDuration { ms } => {
                if report.duration_ms > *ms {
                    return Err(anyhow!(
                        "Assertion Failed: transfer took {} ms, expected at most {}",
                        report.duration_ms,
                        ms
                    ));
                }
            }
        }
    }
    Ok(())
}
