mod config;
mod node;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use ackwire::{LayerConfig, OverflowPolicy, PacketLossSimulation, PeriodicScheduler, Scheduler};
use config::NodeConfig;
use node::PeerNode;

#[derive(Parser, Debug)]
#[command(name = "ackwire-node")]
#[command(about = "Sends a message to a peer every tick and acknowledges what it receives")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: Ipv4Addr,

    #[arg(short, long, default_value_t = ackwire::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    target: Ipv4Addr,

    #[arg(long)]
    target_port: u16,

    #[arg(short, long, default_value = config::DEFAULT_MESSAGE)]
    message: String,

    #[arg(long, default_value_t = 1000, help = "Tick interval in ms")]
    tick_ms: u64,

    #[arg(long, default_value_t = 2000, help = "Packet acknowledgment timeout in ms")]
    timeout_ms: u64,

    #[arg(long, default_value_t = ackwire::config::DEFAULT_MAX_PEERS)]
    max_peers: usize,

    #[arg(long, default_value_t = ackwire::config::DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    #[arg(long, help = "Expire the oldest unacknowledged packet instead of refusing to send")]
    expire_oldest: bool,

    #[arg(long, default_value_t = 0.0, help = "Outgoing packet loss percentage (0-100)")]
    loss_percent: f32,
}

impl Args {
    fn node_config(&self) -> NodeConfig {
        let overflow_policy = if self.expire_oldest {
            OverflowPolicy::ExpireOldest
        } else {
            OverflowPolicy::Reject
        };

        let packet_loss =
            (self.loss_percent > 0.0).then(|| PacketLossSimulation::with_loss(self.loss_percent));

        NodeConfig {
            tick_interval: Duration::from_millis(self.tick_ms),
            target: SocketAddrV4::new(self.target, self.target_port),
            message: self.message.clone(),
            layer: LayerConfig {
                max_peers: self.max_peers,
                history_capacity: self.history,
                packet_timeout: Duration::from_millis(self.timeout_ms),
                overflow_policy,
            },
            packet_loss,
        }
    }
}

/// Drives the scheduler until `shutdown` is set.
fn run(node: &mut PeerNode, scheduler: &mut PeriodicScheduler<PeerNode>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        scheduler.run_due(node, Instant::now());

        if let Some(deadline) = scheduler.next_deadline() {
            std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.node_config();
    let tick_interval = config.tick_interval;

    let mut node = PeerNode::bind(SocketAddrV4::new(args.bind, args.port), config)?;
    log::info!(
        "Listening on {}, sending to {}:{} every {:?}",
        node.local_addr()?,
        args.target,
        args.target_port,
        tick_interval
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    let mut scheduler = PeriodicScheduler::<PeerNode>::new();
    scheduler.register_periodic(tick_interval, |node, now| node.tick_once(now));

    run(&mut node, &mut scheduler, &shutdown);

    log::info!(
        "Node shutting down after sending {} datagrams",
        node.stats().datagrams_sent
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_to_config() {
        let args = Args::try_parse_from([
            "ackwire-node",
            "--port",
            "5000",
            "--target-port",
            "5001",
            "--history",
            "8",
            "--expire-oldest",
            "--loss-percent",
            "25",
        ])
        .unwrap();

        let config = args.node_config();
        assert_eq!(config.target, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5001));
        assert_eq!(config.layer.history_capacity, 8);
        assert_eq!(config.layer.overflow_policy, OverflowPolicy::ExpireOldest);
        assert_eq!(config.packet_loss, Some(PacketLossSimulation::with_loss(25.0)));
        assert_eq!(config.message, config::DEFAULT_MESSAGE);
    }

    #[test]
    fn test_target_port_is_required() {
        assert!(Args::try_parse_from(["ackwire-node"]).is_err());
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = match receiver.local_addr().unwrap() {
            std::net::SocketAddr::V4(addr) => addr,
            std::net::SocketAddr::V6(_) => unreachable!(),
        };
        let config = NodeConfig {
            target,
            ..Default::default()
        };
        let mut node = PeerNode::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), config).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let mut ticks = 0;
        let mut scheduler = PeriodicScheduler::<PeerNode>::new();
        scheduler.register_periodic(Duration::from_millis(5), move |node, now| {
            node.tick_once(now);
            ticks += 1;
            if ticks == 3 {
                stop.store(true, Ordering::Relaxed);
            }
        });

        run(&mut node, &mut scheduler, &shutdown);

        assert!(shutdown.load(Ordering::Relaxed));
        assert!(node.stats().datagrams_sent >= 3);
    }
}
