// component id discovery against a simulated responder on loopback
extern crate component_querier;

use component_querier::{
    ComponentId, ComponentType, Querier, QuerierConfig, QueryRequest, ResponseRecord,
};
use std::{net::UdpSocket, thread, time::Duration};

const ROLE_A: ComponentType = ComponentType::CELL_APP_MANAGER;

struct Responder {
    socket: UdpSocket,
}

impl Responder {
    fn bind() -> Self {
        Responder::bind_to(0)
    }

    fn bind_to(port: u16) -> Self {
        let socket = UdpSocket::bind(("127.0.0.1", port)).expect("Fail to bind responder.");
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("Fail to set responder timeout.");
        Responder { socket }
    }

    fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Swallows queries until the `answer_on`th one, answers it with
    /// `records`, and hands back every query datagram it saw.
    fn spawn(
        self,
        answer_on: usize,
        records: Vec<ResponseRecord>,
    ) -> thread::JoinHandle<Vec<Vec<u8>>> {
        thread::spawn(move || {
            let mut seen = Vec::new();
            let mut buf = [0u8; 2048];
            while seen.len() < answer_on {
                let (len, _) = self
                    .socket
                    .recv_from(&mut buf)
                    .expect("responder saw no query");
                seen.push(buf[..len].to_vec());
            }

            let request = QueryRequest::decode(&seen[answer_on - 1]).unwrap();
            let mut answer = Vec::new();
            for record in records.iter() {
                record.write(&mut answer).unwrap();
            }
            self.socket
                .send_to(&answer, ("127.0.0.1", request.reply_port))
                .unwrap();
            seen
        })
    }
}

fn setup(discovery_port: u16) -> Querier {
    let _ = env_logger::try_init();
    let config = QuerierConfig {
        listen_address: "127.0.0.1".to_string(),
        broadcast_address: "127.0.0.1".to_string(),
        discovery_port,
        query_timeout_us: 50_000,
        host_fingerprint: Some(0x1234_5678),
        ..QuerierConfig::default()
    };
    let querier = Querier::new(config).expect("Fail to build querier.");
    assert!(querier.is_ready());
    querier
}

#[test]
fn it_should_resolve_on_the_third_broadcast() {
    let responder = Responder::bind();
    let mut querier = setup(responder.port());
    let handle = responder.spawn(
        3,
        vec![ResponseRecord::new(ROLE_A, ComponentId(123_456_789))],
    );

    let resolved = querier.query(ROLE_A, 1000).unwrap();
    let seen = handle.join().unwrap();

    assert_eq!(resolved, Some(ComponentId(123_456_789)));
    assert_eq!(querier.broadcasts_sent(), 3);
    assert_eq!(seen.len(), 3);

    // resends replay the first datagram
    assert!(seen.iter().all(|datagram| datagram == &seen[0]));
    let request = QueryRequest::decode(&seen[0]).unwrap();
    assert_eq!(
        request,
        QueryRequest::new(ROLE_A, 1000, querier.listen_port().unwrap(), 0x1234_5678)
    );
    assert!(!request.requester_component_id.is_set());
}

#[test]
fn it_should_skip_placeholders_in_answers() {
    let responder = Responder::bind();
    let mut querier = setup(responder.port());
    let handle = responder.spawn(
        1,
        vec![
            ResponseRecord::new(ComponentType::UNKNOWN, ComponentId(1)),
            ResponseRecord::new(ROLE_A, ComponentId(42)),
        ],
    );

    assert_eq!(querier.query(ROLE_A, 7).unwrap(), Some(ComponentId(42)));
    handle.join().unwrap();
}

#[test]
fn it_should_report_answers_without_an_id() {
    let responder = Responder::bind();
    let mut querier = setup(responder.port());
    let handle = responder.spawn(
        1,
        vec![ResponseRecord::new(ComponentType::UNKNOWN, ComponentId(1))],
    );

    assert_eq!(querier.query(ROLE_A, 7).unwrap(), None);
    handle.join().unwrap();
}

#[test]
fn it_should_run_consecutive_queries() {
    let responder = Responder::bind();
    let port = responder.port();
    let mut querier = setup(port);

    let handle = responder.spawn(1, vec![ResponseRecord::new(ROLE_A, ComponentId(5))]);
    assert_eq!(querier.query(ROLE_A, 1).unwrap(), Some(ComponentId(5)));
    let seen = handle.join().unwrap();
    assert_eq!(QueryRequest::decode(&seen[0]).unwrap().uid, 1);

    let responder = Responder::bind_to(port);
    let handle = responder.spawn(
        2,
        vec![ResponseRecord::new(ComponentType::BASE_APP, ComponentId(6))],
    );
    assert_eq!(
        querier.query(ComponentType::BASE_APP, 2).unwrap(),
        Some(ComponentId(6))
    );
    let seen = handle.join().unwrap();
    assert_eq!(
        QueryRequest::decode(&seen[1]).unwrap().component_type,
        ComponentType::BASE_APP
    );
    assert_eq!(querier.broadcasts_sent(), 3);
}

#[test]
fn it_should_answer_within_a_deadline() {
    let responder = Responder::bind();
    let mut querier = setup(responder.port());
    let handle = responder.spawn(2, vec![ResponseRecord::new(ROLE_A, ComponentId(99))]);

    let resolved = querier
        .query_with_deadline(ROLE_A, 3, Duration::from_secs(5))
        .unwrap();
    assert_eq!(resolved, Some(ComponentId(99)));
    handle.join().unwrap();
}
