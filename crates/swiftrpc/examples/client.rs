//! Simple client that issues RPCs against a swiftrpc server.
//!
//! Run the server first:
//! - cargo run -p swiftrpc --example server -- 127.0.0.1:7400
//!
//! Then run the client:
//! - cargo run -p swiftrpc --example client -- 127.0.0.1:7400
//! - cargo run -p swiftrpc --example client -- 127.0.0.1:7400 10
//!   (issues 10 RPCs)

use std::env;

use swiftrpc::clock::SystemClock;
use swiftrpc::{Config, Service, Transport, UdpDriver};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Args: <server_addr> [count]
    let mut args = env::args().skip(1);
    let server_addr = args.next().unwrap_or_else(|| "127.0.0.1:7400".to_string());
    let count: usize = args.next().unwrap_or_else(|| "5".into()).parse().unwrap_or(5);

    let config = Config::default();
    let driver = UdpDriver::bind("127.0.0.1:0", &config)?;
    let local = driver.local_addr()?;
    let mut transport = Transport::new(Box::new(driver), Box::new(SystemClock::new()), config);
    let mut service = Service::new(&server_addr)?;
    println!("swiftrpc client bound to {} -> {} rpcs to {}", local, count, server_addr);

    for i in 0..count {
        let request = format!("hello {} from {}", i, local);
        let rpc = transport.client_send(&mut service, request.clone().into_bytes());
        match rpc.get_reply(&mut transport) {
            Ok(reply) => {
                println!("[reply] \"{}\"", String::from_utf8_lossy(&reply));
                assert_eq!(reply, request.into_bytes());
            }
            Err(err) => eprintln!("[error] rpc failed: {}", err),
        }
    }

    println!("done");
    Ok(())
}
