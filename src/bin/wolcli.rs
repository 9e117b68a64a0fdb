use wolservice::service::SEND_WOL_METHOD;
use wolservice::wol;

use clap::Parser;
use log::info;
use serde_json::{json, Value};

/// Wake a machine by broadcasting a magic packet.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Broadcast address of the target network, e.g. 192.168.1.255
    broadcast: String,

    /// MAC address of the machine to wake, in xx:xx:xx:xx:xx:xx form.
    mac_address: String,

    /// UDP port to send to. Ignored with --server.
    #[arg(long, default_value_t = wol::WOL_PORT)]
    port: u16,

    /// Ask a running wolservice to send the packet instead of sending it locally.
    #[arg(long, env = "WOL_SERVER")]
    server: Option<String>,
}

fn send_via_server(
    server: &str,
    broadcast: &str,
    mac_address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/service/{}", server.trim_end_matches('/'), SEND_WOL_METHOD);
    let payload = json!({ "broadcastIP": broadcast, "macAddress": mac_address });
    let reply: Value = match ureq::post(&url).send_json(payload) {
        Ok(resp) => resp.into_json()?,
        Err(ureq::Error::Status(_, resp)) => resp.into_json()?,
        Err(e) => return Err(e.into()),
    };
    println!("{}", reply);
    if reply["success"] != json!(true) {
        let msg = reply["error"].as_str().unwrap_or("request failed");
        return Err(msg.into());
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match &args.server {
        Some(server) => {
            info!("Forwarding to {}", server);
            send_via_server(server, &args.broadcast, &args.mac_address)
        }
        None => Ok(wol::send_wol_to_port(
            &args.broadcast,
            args.port,
            &args.mac_address,
        )?),
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
