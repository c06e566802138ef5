//!
//! This example links two nodes over TCP on loopback.
//!
//! The robot node publishes a procedure that adds two `u32`s and an output
//! that switches a light.  The driver node connects to the robot, calls the
//! adder with random numbers twice a second and toggles the light with
//! every answer, until interrupted with Ctrl-C.
//!

use std::time::Duration;

use crossbeam::channel::{unbounded, RecvTimeoutError};
use log::{info, warn};
use rand::random;

use cluck::prelude::*;

fn add(request: &[u8], reply: ReplySink) {
    let (Ok(a), Ok(b)) = (u32::unpack(request), u32::unpack(request.get(4..).unwrap_or(&[]))) else {
        warn!("Malformed add request from {}", reply.reply_to());
        return;
    };
    let _ = reply.reply(&(u64::from(a) + u64::from(b)).to_packed());
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let robot = Node::new();
    let robot_rpc = RpcManager::new(&robot, RpcConfig::default()).expect("Could not create the robot's RPC manager");
    robot_rpc.publish("add", add).expect("Could not publish add");
    robot
        .publish_output("light", |on: bool| info!("light is {}", if on { "on" } else { "off" }))
        .expect("Could not publish light");
    let server = TcpServer::bind(&robot, "127.0.0.1:0", TcpConfig::default()).expect("Could not listen");

    let driver = Node::new();
    let _client = TcpClient::start(&driver, "robot", &server.local_addr().to_string(), TcpConfig::default())
        .expect("Could not start the client");
    let driver_rpc = RpcManager::new(&driver, RpcConfig::default()).expect("Could not create the driver's RPC manager");
    let adder = driver_rpc.subscribe("robot/add", Duration::from_millis(250));
    let light = driver.subscribe_output::<bool>("robot/light");

    let (tx, rx) = unbounded();
    ctrlc::set_handler(move || tx.send(()).expect("Could not send data"))
        .expect("Error setting Ctrl-C handler");

    let mut on = false;
    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        let (a, b): (u32, u32) = (random(), random());
        let mut request = a.to_packed();
        request.extend(b.to_packed());
        match adder.invoke_blocking(&request).map(|sum| u64::unpack(&sum)) {
            Ok(Ok(sum)) => {
                println!("{} + {} = {}", a, b, sum);
                on = !on;
                light.set(on);
            }
            Ok(Err(err)) => warn!("Malformed sum: {:?}", err),
            Err(err) => warn!("Call failed: {}", err),
        }
    }
}
