//! Multicast test helper: joins or sources traffic for one group.
//!
//! Invoked by the harness with positional `(endpoint_path, group,
//! interface)` and an optional `--send <secs>`. The first action is to
//! connect back to the rendezvous socket; the helper then keeps its
//! membership (or keeps sending) until that connection closes, which is
//! the harness's stop signal.

use anyhow::{bail, Context, Result};
use clap::Parser;
use socket2::{Domain, InterfaceIndexOrAddress, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio::net::{UdpSocket, UnixStream};
use tokio::time::{self, Duration};

/// UDP port traffic is exchanged on. Only the group membership matters
/// to the routers under test, so any fixed port works.
const MCAST_PORT: u16 = 5001;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rendezvous socket of the test harness
    socket: PathBuf,

    /// Multicast group to join or send to
    group: Ipv4Addr,

    /// Network interface to use
    interface: String,

    /// Send a datagram every SECS seconds instead of joining as receiver
    #[arg(long, value_name = "SECS")]
    send: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let control = UnixStream::connect(&args.socket)
        .await
        .with_context(|| format!("connecting to harness at {}", args.socket.display()))?;

    match args.send {
        Some(interval) => run_sender(control, args.group, &args.interface, interval).await,
        None => run_receiver(control, args.group, &args.interface).await,
    }
}

/// Join the group on the interface, then sit on the membership until the
/// harness closes the control connection.
async fn run_receiver(control: UnixStream, group: Ipv4Addr, interface: &str) -> Result<()> {
    let index = nix::net::if_::if_nametoindex(interface)
        .with_context(|| format!("no such interface: {interface}"))?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MCAST_PORT).into())?;
    socket
        .join_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(index))
        .with_context(|| format!("joining {group} on {interface}"))?;

    println!("joined {} on {}", group, interface);
    wait_for_close(control).await;
    // Membership is dropped with the socket.
    Ok(())
}

/// Send a small datagram to the group every `interval` seconds until the
/// harness closes the control connection.
async fn run_sender(
    mut control: UnixStream,
    group: Ipv4Addr,
    interface: &str,
    interval: f64,
) -> Result<()> {
    let source = interface_ipv4(interface)?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_if_v4(&source)?;
    socket.bind(&SocketAddrV4::new(source, 0).into())?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket.into())?;

    let dest = SocketAddrV4::new(group, MCAST_PORT);
    let payload = b"mcast-agent";
    let mut timer = time::interval(Duration::from_secs_f64(interval));
    let mut buf = [0u8; 64];

    println!("sending to {} from {} every {}s", dest, source, interval);
    loop {
        tokio::select! {
            _ = timer.tick() => {
                if let Err(e) = socket.send_to(payload, dest).await {
                    eprintln!("send failed: {}", e);
                }
            }
            read = control.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }
    Ok(())
}

async fn wait_for_close(mut control: UnixStream) {
    let mut buf = [0u8; 64];
    loop {
        match control.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

/// First IPv4 address assigned to `interface`.
fn interface_ipv4(interface: &str) -> Result<Ipv4Addr> {
    for ifaddr in nix::ifaddrs::getifaddrs().context("listing interfaces")? {
        if ifaddr.interface_name != interface {
            continue;
        }
        if let Some(addr) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) {
            return Ok(addr.ip());
        }
    }
    bail!("interface {interface} has no IPv4 address")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_parsing() {
        let args = Args::parse_from(["mcast_agent", "/tmp/apps.sock", "239.100.0.1", "h1-eth0"]);
        assert_eq!(args.socket, PathBuf::from("/tmp/apps.sock"));
        assert_eq!(args.group, "239.100.0.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(args.interface, "h1-eth0");
        assert_eq!(args.send, None);

        let args = Args::parse_from([
            "mcast_agent",
            "/tmp/apps.sock",
            "239.100.0.17",
            "h2-eth0",
            "--send",
            "0.7",
        ]);
        assert_eq!(args.send, Some(0.7));
    }

    #[test]
    fn loopback_always_has_an_ipv4_address() {
        assert_eq!(interface_ipv4("lo").unwrap(), Ipv4Addr::LOCALHOST);
    }
}
