mod common;

use std::{fs, net::TcpStream, time::Duration};

use common::{settle, wait_for, TestServer};
use httpserver::Phase;

#[test]
fn idle_server_stops_and_refuses_new_connections() {
    let server = TestServer::start(4);
    let addr = server.addr;
    let shutdown = server.shutdown.clone();

    assert!(server.stop().is_empty());
    assert_eq!(shutdown.phase(), Phase::Terminated);
    assert!(shutdown.wait_terminated(Duration::from_millis(10)));
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn request_in_flight_finishes_before_exit() {
    let mut server = TestServer::start(2);

    let mut client = server.client();
    client
        .send(b"PUT /inflight.txt HTTP/1.1\r\nContent-Length: 8\r\nRequest-Id: 1\r\n\r\nhalf")
        .unwrap();
    settle();

    server.shutdown.trigger();
    settle();
    assert!(server.is_running(), "server exited with a request in flight");
    assert_eq!(server.shutdown.phase(), Phase::Draining);

    client.send(b"done").unwrap();
    assert_eq!(client.read_response().unwrap().code, 201);

    assert_eq!(server.join(), vec!["PUT,/inflight.txt,201,1"]);
    assert_eq!(fs::read(server.file("inflight.txt")).unwrap(), b"halfdone");
    assert_eq!(server.shutdown.phase(), Phase::Terminated);
}

#[test]
fn queued_connections_are_dropped_without_response() {
    let mut server = TestServer::start(1);

    let mut busy = server.client();
    busy.send(b"PUT /busy.txt HTTP/1.1\r\nContent-Length: 4\r\n\r\nab").unwrap();
    settle();

    let waiting: Vec<_> = (0..2)
        .map(|id| {
            let mut client = server.client();
            client
                .send(format!("GET /busy.txt HTTP/1.1\r\nRequest-Id: {id}\r\n\r\n").as_bytes())
                .unwrap();
            client
        })
        .collect();
    settle();

    server.shutdown.trigger();
    busy.send(b"cd").unwrap();
    assert_eq!(busy.read_response().unwrap().code, 201);

    assert_eq!(server.join(), vec!["PUT,/busy.txt,201,0"]);
    for client in waiting {
        assert!(client.read_to_close().unwrap_or_default().is_empty());
    }
}

#[test]
fn drain_waits_for_worker_blocked_on_the_gate() {
    let mut server = TestServer::start(2);
    fs::write(server.file("read.txt"), b"contents").unwrap();

    let mut writer = server.client();
    writer
        .send(b"PUT /write.txt HTTP/1.1\r\nContent-Length: 6\r\nRequest-Id: 1\r\n\r\nabc")
        .unwrap();
    settle();

    // Dequeued by the second worker, which then waits for read access.
    let mut reader = server.client();
    reader.send(b"GET /read.txt HTTP/1.1\r\nRequest-Id: 2\r\n\r\n").unwrap();
    settle();

    server.shutdown.trigger();
    settle();
    assert!(server.is_running(), "drain finished while a worker waited on the gate");

    writer.send(b"def").unwrap();
    assert_eq!(writer.read_response().unwrap().code, 201);
    assert_eq!(reader.read_response().unwrap().body, b"contents");

    wait_for("server to exit", || !server.is_running());
    assert_eq!(
        server.join(),
        vec!["PUT,/write.txt,201,1", "GET,/read.txt,200,2"]
    );
}
