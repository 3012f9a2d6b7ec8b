// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use hc::client::Client;
use hc::error::ErrorCode;
use hc::server::Server;
use hc::transport::udp::UdpTransport;
use hc::tree::container::Container;
use hc::tree::param::{Access, CallParam, Parameter, ScalarParam};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn running_server() -> (Arc<Server>, std::net::SocketAddr) {
    let mut root = Container::root();

    let gain = Arc::new(Mutex::new(1i32));
    root.add_parameter(Arc::new(Parameter::new(
        "gain",
        Access::scalar_rw(),
        Box::new(ScalarParam::mutex(gain)),
    )));

    let tripped = Arc::new(AtomicBool::new(false));
    let tripped_for_call = tripped.clone();
    root.add_parameter(Arc::new(Parameter::new(
        "reset",
        Access::callable(),
        Box::new(CallParam::new(move || {
            tripped_for_call.store(false, Ordering::Release);
            ErrorCode::None
        })),
    )));

    let srv_transport = Arc::new(UdpTransport::bind(0, None).unwrap());
    let addr = srv_transport.local_addr().unwrap();
    let server = Arc::new(Server::new(root, srv_transport));
    server.register_tree().unwrap();
    server.start().unwrap();
    (server, addr)
}

fn connected_client(addr: std::net::SocketAddr) -> Arc<Client> {
    let transport = Arc::new(UdpTransport::connect(0, addr).unwrap());
    Client::new(transport, Duration::from_millis(500))
}

#[test]
fn get_and_set_round_trip_through_a_real_server() {
    let (server, addr) = running_server();
    let client = connected_client(addr);

    assert_eq!(client.get::<i32>(0), Ok(1));
    client.set(0, 42i32).unwrap();
    assert_eq!(client.get::<i32>(0), Ok(42));

    server.stop().unwrap();
}

#[test]
fn unknown_pid_surfaces_as_a_pid_error() {
    let (server, addr) = running_server();
    let client = connected_client(addr);

    assert_eq!(client.get::<i32>(99), Err(ErrorCode::Pid));

    server.stop().unwrap();
}

#[test]
fn call_invokes_the_remote_handler() {
    let (server, addr) = running_server();
    let client = connected_client(addr);

    client.call(1).unwrap();

    server.stop().unwrap();
}

#[test]
fn subscription_delivers_publishes_on_set() {
    let (server, addr) = running_server();
    let client = connected_client(addr);

    let (tx, rx) = std::sync::mpsc::channel();
    client
        .cl_sub("/gain", "", move |pid, value| {
            let _ = tx.send((pid, value));
        })
        .unwrap();

    client.set(0, 7i32).unwrap();

    let (pid, value) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(pid, 0);
    assert_eq!(value, hc::value::Value::Int32(7));

    server.stop().unwrap();
}

#[test]
fn subscription_criterion_filters_out_non_matching_publishes() {
    let (server, addr) = running_server();
    let client = connected_client(addr);

    let (tx, rx) = std::sync::mpsc::channel();
    client.cl_sub("/gain", ">100", move |pid, value| {
        let _ = tx.send((pid, value));
    }).unwrap();

    client.set(0, 5i32).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    client.set(0, 200i32).unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());

    server.stop().unwrap();
}
