use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mqtt_engine::packet::{
    self, ConnAck, Disconnect, EncodePacket, MqttPacket, PingResp, PubAck, PubComp, PubRec,
    PubRel, UnsubAck,
};
use mqtt_engine::{
    Anomaly, CompletionCallback, ConnectReturnCode, Connection, ConnectionState, DecodeError,
    ErrorEvent, Flow, HandlerSet, MqttOptions, PacketType, Publish, QoS, SubackReturnCode,
    UsageError,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    ConnAck(bool, ConnectReturnCode),
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        dup: bool,
        packet_id: Option<u16>,
    },
    Ack(PacketType, u16),
    SubAck(u16, Vec<SubackReturnCode>),
    PingResp,
    ResponseSent(PacketType, u16),
    Close,
    Error(ErrorEvent),
}

/// A connection with every handler recording into a shared event log.
struct Harness {
    conn: Connection,
    events: Rc<RefCell<Vec<Event>>>,
}

impl Harness {
    fn new() -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut handlers = HandlerSet::new();

        let log = events.clone();
        handlers.set_connack_handler(move |session_present, code| {
            log.borrow_mut().push(Event::ConnAck(session_present, code));
            true
        });
        let log = events.clone();
        handlers.set_publish_handler(move |publish: &Publish<'_>| {
            log.borrow_mut().push(Event::Publish {
                topic: publish.topic.to_string(),
                payload: publish.payload.to_vec(),
                qos: publish.qos,
                dup: publish.dup,
                packet_id: publish.packet_id,
            });
            true
        });
        for packet_type in [
            PacketType::PubAck,
            PacketType::PubRec,
            PacketType::PubRel,
            PacketType::PubComp,
            PacketType::UnsubAck,
        ] {
            let log = events.clone();
            let record = move |id| {
                log.borrow_mut().push(Event::Ack(packet_type, id));
                true
            };
            match packet_type {
                PacketType::PubAck => handlers.set_puback_handler(record),
                PacketType::PubRec => handlers.set_pubrec_handler(record),
                PacketType::PubRel => handlers.set_pubrel_handler(record),
                PacketType::PubComp => handlers.set_pubcomp_handler(record),
                _ => handlers.set_unsuback_handler(record),
            };
        }
        let log = events.clone();
        handlers.set_suback_handler(move |id, codes| {
            log.borrow_mut().push(Event::SubAck(id, codes.to_vec()));
            true
        });
        let log = events.clone();
        handlers.set_pingresp_handler(move || {
            log.borrow_mut().push(Event::PingResp);
            true
        });
        let log = events.clone();
        handlers.set_response_sent_handler(move |packet_type, id| {
            log.borrow_mut().push(Event::ResponseSent(packet_type, id));
        });
        let log = events.clone();
        handlers.set_close_handler(move || log.borrow_mut().push(Event::Close));
        let log = events.clone();
        handlers.set_error_handler(move |event| log.borrow_mut().push(Event::Error(event)));

        Self {
            conn: Connection::with_handlers(handlers),
            events,
        }
    }

    fn connected(options: MqttOptions<'_>) -> Self {
        let mut harness = Self::new();
        harness.connect(options, false);
        harness
    }

    fn connect(&mut self, options: MqttOptions<'_>, session_present: bool) {
        self.conn.connect(&options).unwrap();
        let frames = self.written();
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            packet::decode(&frames[0]).unwrap(),
            MqttPacket::Connect(_)
        ));
        let flow = self.feed(&ConnAck {
            session_present,
            return_code: ConnectReturnCode::Accepted,
        });
        assert_eq!(flow, Flow::Continue);
        assert_eq!(self.conn.state(), ConnectionState::Connected);
        self.take_events();
    }

    fn feed(&mut self, packet: &impl EncodePacket) -> Flow {
        let bytes = packet.to_vec().unwrap();
        self.conn.on_bytes_received(&bytes)
    }

    /// Writes everything queued, one frame per write.
    fn written(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(bytes) = self.conn.poll_transmit() {
            frames.push(bytes.to_vec());
            self.conn.on_write_complete();
        }
        frames
    }

    fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

fn counter() -> (Rc<Cell<u32>>, Option<CompletionCallback>) {
    let count = Rc::new(Cell::new(0));
    let handle = count.clone();
    let callback: CompletionCallback = Box::new(move || handle.set(handle.get() + 1));
    (count, Some(callback))
}

fn publish<'a>(topic: &'a str, payload: &'a [u8], qos: QoS, packet_id: Option<u16>) -> Publish<'a> {
    Publish {
        topic,
        payload,
        qos,
        retain: false,
        dup: false,
        packet_id,
    }
}

#[test]
fn qos0_subscription_and_delivery() {
    let mut h = Harness::connected(MqttOptions::new("client"));

    let id = h.conn.subscribe(&[("t", QoS::AtMostOnce)]).unwrap();
    let frames = h.written();
    match packet::decode(&frames[0]).unwrap() {
        MqttPacket::Subscribe(subscribe) => {
            assert_eq!(subscribe.packet_id, id);
            assert_eq!(&subscribe.topics[..], &[("t", QoS::AtMostOnce)]);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(
        h.conn.on_bytes_received(&[0x90, 3, 0, id as u8, 0x00]),
        Flow::Continue
    );
    assert_eq!(h.feed(&publish("t", b"data", QoS::AtMostOnce, None)), Flow::Continue);

    assert_eq!(
        h.take_events(),
        [
            Event::SubAck(id, vec![SubackReturnCode(0)]),
            Event::Publish {
                topic: "t".into(),
                payload: b"data".to_vec(),
                qos: QoS::AtMostOnce,
                dup: false,
                packet_id: None,
            },
        ]
    );
    assert!(h.written().is_empty());
    assert!(!h.conn.is_packet_id_in_use(id));
}

#[test]
fn suback_codes_are_passed_through_verbatim() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let id = h
        .conn
        .subscribe(&[("a", QoS::ExactlyOnce), ("b", QoS::ExactlyOnce)])
        .unwrap();
    h.written();

    h.conn.on_bytes_received(&[0x90, 4, 0, id as u8, 0x01, 0x80]);
    assert_eq!(
        h.take_events(),
        [Event::SubAck(
            id,
            vec![SubackReturnCode::granted(QoS::AtLeastOnce), SubackReturnCode::FAILURE]
        )]
    );
}

#[test]
fn qos1_publish_completes_on_puback() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let (done, callback) = counter();

    let id = h
        .conn
        .publish("t", b"hello", QoS::AtLeastOnce, false, callback)
        .unwrap()
        .unwrap();
    let frames = h.written();
    assert_eq!(
        packet::decode(&frames[0]).unwrap(),
        MqttPacket::Publish(publish("t", b"hello", QoS::AtLeastOnce, Some(id)))
    );
    assert_eq!(done.get(), 0);
    assert!(h.conn.is_packet_id_in_use(id));

    h.feed(&PubAck::new(id));
    assert_eq!(done.get(), 1);
    assert!(!h.conn.is_packet_id_in_use(id));
    assert_eq!(h.conn.pending_outgoing(), 0);
    assert_eq!(h.take_events(), [Event::Ack(PacketType::PubAck, id)]);

    // A repeated acknowledgement is an anomaly and changes nothing.
    assert_eq!(h.feed(&PubAck::new(id)), Flow::Continue);
    assert_eq!(done.get(), 1);
    assert_eq!(
        h.take_events(),
        [Event::Error(ErrorEvent::Anomaly(Anomaly::UnknownPacketId {
            packet_type: PacketType::PubAck,
            packet_id: id
        }))]
    );
}

#[test]
fn qos2_publish_runs_the_full_handshake() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let (done, callback) = counter();

    let id = h
        .conn
        .publish("t", b"hello", QoS::ExactlyOnce, false, callback)
        .unwrap()
        .unwrap();
    h.written();

    // PUBCOMP before PUBREC does not complete the message.
    h.feed(&PubComp::new(id));
    assert_eq!(done.get(), 0);
    h.take_events();

    h.feed(&PubRec::new(id));
    assert_eq!(h.written(), [PubRel::new(id).to_vec().unwrap()]);
    assert_eq!(done.get(), 0);
    assert_eq!(
        h.take_events(),
        [
            Event::Ack(PacketType::PubRec, id),
            Event::ResponseSent(PacketType::PubRel, id),
        ]
    );

    h.feed(&PubComp::new(id));
    assert_eq!(done.get(), 1);
    assert!(!h.conn.is_packet_id_in_use(id));
    assert_eq!(h.take_events(), [Event::Ack(PacketType::PubComp, id)]);

    h.feed(&PubComp::new(id));
    assert_eq!(done.get(), 1);
    assert!(matches!(
        h.take_events()[..],
        [Event::Error(ErrorEvent::Anomaly(Anomaly::UnknownPacketId { .. }))]
    ));
}

#[test]
fn repeated_pubrec_is_answered_again() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let id = h
        .conn
        .publish("t", b"", QoS::ExactlyOnce, false, None)
        .unwrap()
        .unwrap();
    h.written();

    h.feed(&PubRec::new(id));
    h.feed(&PubRec::new(id));
    let release = PubRel::new(id).to_vec().unwrap();
    assert_eq!(h.written(), [release.clone(), release]);
}

#[test]
fn incoming_qos1_is_acknowledged() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    h.feed(&publish("t", b"x", QoS::AtLeastOnce, Some(42)));
    assert_eq!(h.written(), [PubAck::new(42).to_vec().unwrap()]);
    assert_eq!(
        h.take_events()[1..],
        [Event::ResponseSent(PacketType::PubAck, 42)]
    );
}

#[test]
fn incoming_qos2_is_delivered_once_and_released() {
    let mut h = Harness::connected(MqttOptions::new("client"));

    h.feed(&publish("t", b"x", QoS::ExactlyOnce, Some(7)));
    assert_eq!(h.written(), [PubRec::new(7).to_vec().unwrap()]);
    assert!(h.conn.is_release_pending(7));

    h.feed(&PubRel::new(7));
    assert_eq!(h.written(), [PubComp::new(7).to_vec().unwrap()]);
    assert!(!h.conn.is_release_pending(7));

    let events = h.take_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::Publish { .. }))
            .count(),
        1
    );
    assert!(matches!(events[0], Event::Publish { packet_id: Some(7), .. }));
    assert_eq!(
        events[1..],
        [
            Event::ResponseSent(PacketType::PubRec, 7),
            Event::Ack(PacketType::PubRel, 7),
            Event::ResponseSent(PacketType::PubComp, 7),
        ]
    );
}

#[test]
fn duplicate_qos2_publish_is_dispatched_again() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let mut duplicate = publish("t", b"x", QoS::ExactlyOnce, Some(3));
    h.feed(&duplicate);
    duplicate.dup = true;
    h.feed(&duplicate);

    let rec = PubRec::new(3).to_vec().unwrap();
    assert_eq!(h.written(), [rec.clone(), rec]);
    let deliveries: Vec<bool> = h
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Publish { dup, .. } => Some(dup),
            _ => None,
        })
        .collect();
    assert_eq!(deliveries, [false, true]);
    assert_eq!(h.conn.pending_releases(), 1);
}

#[test]
fn unknown_release_is_still_completed() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    h.feed(&PubRel::new(11));
    assert_eq!(h.written(), [PubComp::new(11).to_vec().unwrap()]);
    assert_eq!(
        h.take_events(),
        [
            Event::Error(ErrorEvent::Anomaly(Anomaly::UnknownRelease(11))),
            Event::Ack(PacketType::PubRel, 11),
            Event::ResponseSent(PacketType::PubComp, 11),
        ]
    );
}

#[test]
fn handler_returning_false_on_suback_stops_reading() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let log = h.events.clone();
    h.conn.handlers_mut().set_suback_handler(move |id, _| {
        log.borrow_mut().push(Event::SubAck(id, Vec::new()));
        false
    });

    let id = h.conn.subscribe(&[("t", QoS::AtMostOnce)]).unwrap();
    h.written();

    let mut stream = vec![0x90, 3, 0, id as u8, 0x00];
    stream.extend(publish("t", b"late", QoS::AtMostOnce, None).to_vec().unwrap());
    assert_eq!(h.conn.on_bytes_received(&stream), Flow::Stop);
    assert_eq!(h.written(), [Disconnect.to_vec().unwrap()]);

    assert_eq!(
        h.conn.on_bytes_received(&PingResp.to_vec().unwrap()),
        Flow::Stop
    );
    h.conn.on_transport_closed();
    h.conn.on_transport_closed();

    assert_eq!(
        h.take_events(),
        [Event::SubAck(id, Vec::new()), Event::Close]
    );
    assert_eq!(
        h.conn.publish("t", b"", QoS::AtMostOnce, false, None),
        Err(UsageError::NotConnected)
    );
}

#[test]
fn qos0_callback_runs_after_the_write() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let (done, callback) = counter();
    assert_eq!(
        h.conn.publish("t", b"x", QoS::AtMostOnce, false, callback),
        Ok(None)
    );
    assert_eq!(done.get(), 0);
    assert!(h.conn.poll_transmit().is_some());
    assert_eq!(done.get(), 0);
    h.conn.on_write_complete();
    assert_eq!(done.get(), 1);
}

#[test]
fn writes_are_flushed_in_submission_order() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let first = h
        .conn
        .publish("a", b"1", QoS::AtLeastOnce, false, None)
        .unwrap();
    h.conn.publish("b", b"2", QoS::AtMostOnce, false, None).unwrap();
    let unsub = h.conn.unsubscribe(&["c"]).unwrap();

    let kinds: Vec<PacketType> = h
        .written()
        .iter()
        .map(|frame| packet::decode(frame).unwrap().packet_type())
        .collect();
    assert_eq!(
        kinds,
        [PacketType::Publish, PacketType::Publish, PacketType::Unsubscribe]
    );
    assert_eq!(first, Some(1));
    assert_eq!(unsub, 2);

    h.feed(&UnsubAck::new(unsub));
    assert_eq!(h.take_events(), [Event::Ack(PacketType::UnsubAck, unsub)]);
}

#[test]
fn bytes_may_arrive_one_at_a_time() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let bytes = publish("topic", b"payload", QoS::AtLeastOnce, Some(300))
        .to_vec()
        .unwrap();
    for byte in &bytes {
        assert_eq!(
            h.conn.on_bytes_received(std::slice::from_ref(byte)),
            Flow::Continue
        );
    }
    let events = h.take_events();
    assert!(matches!(
        &events[0],
        Event::Publish { topic, packet_id: Some(300), .. } if topic == "topic"
    ));
}

#[test]
fn decode_failure_closes_the_connection() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let (done, callback) = counter();
    h.conn
        .publish("t", b"", QoS::AtLeastOnce, false, callback)
        .unwrap();

    assert_eq!(h.conn.on_bytes_received(&[0x00, 0x00]), Flow::Stop);
    assert_eq!(h.conn.state(), ConnectionState::Disconnected);
    assert_eq!(
        h.take_events(),
        [
            Event::Error(ErrorEvent::Decode(DecodeError::InvalidPacketType(0))),
            Event::Close,
        ]
    );
    assert_eq!(h.conn.pending_outgoing(), 0);
    assert!(h.conn.poll_transmit().is_none());
    assert_eq!(done.get(), 0);

    h.conn.on_transport_closed();
    assert!(h.take_events().is_empty());
}

#[test]
fn oversized_inbound_packet_is_a_decode_error() {
    let mut h = Harness::connected(MqttOptions::new("client").with_max_packet_size(8));
    h.feed(&publish("t", &[0u8; 32], QoS::AtMostOnce, None));
    assert_eq!(
        h.take_events(),
        [
            Event::Error(ErrorEvent::Decode(DecodeError::PacketTooLarge(35))),
            Event::Close,
        ]
    );
}

#[test]
fn transport_error_reports_then_closes() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    h.conn.on_transport_error();
    h.conn.on_transport_error();
    assert_eq!(
        h.take_events(),
        [Event::Error(ErrorEvent::Transport), Event::Close]
    );
}

#[test]
fn refused_connection_is_reported_and_closed() {
    let mut h = Harness::new();
    h.conn.connect(&MqttOptions::new("client")).unwrap();
    h.written();

    let flow = h.feed(&ConnAck {
        session_present: false,
        return_code: ConnectReturnCode::NotAuthorized,
    });
    assert_eq!(flow, Flow::Stop);
    assert_eq!(h.conn.state(), ConnectionState::Connecting);
    assert_eq!(
        h.conn.connect_return_code(),
        Some(ConnectReturnCode::NotAuthorized)
    );
    assert!(h.written().is_empty());

    h.conn.on_transport_closed();
    assert_eq!(
        h.take_events(),
        [
            Event::ConnAck(false, ConnectReturnCode::NotAuthorized),
            Event::Close
        ]
    );
}

#[test]
fn second_connack_is_an_anomaly() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    h.feed(&ConnAck {
        session_present: false,
        return_code: ConnectReturnCode::Accepted,
    });
    assert_eq!(
        h.take_events(),
        [Event::Error(ErrorEvent::Anomaly(Anomaly::UnexpectedConnAck))]
    );
    assert!(h.conn.is_connected());
}

#[test]
fn persistent_session_replays_pending_work_in_order() {
    let options = MqttOptions::new("client").with_clean_session(false);
    let mut h = Harness::connected(options);
    let (done, callback) = counter();

    let q1 = h
        .conn
        .publish("a", b"1", QoS::AtLeastOnce, false, callback)
        .unwrap()
        .unwrap();
    let q2 = h
        .conn
        .publish("b", b"2", QoS::ExactlyOnce, true, None)
        .unwrap()
        .unwrap();
    let sub = h.conn.subscribe(&[("c/#", QoS::AtLeastOnce)]).unwrap();
    h.written();
    h.feed(&PubRec::new(q2));
    h.written();

    h.conn.on_transport_closed();
    assert_eq!(h.conn.state(), ConnectionState::Disconnected);
    assert_eq!(h.conn.pending_outgoing(), 3);
    assert!(h.conn.is_packet_id_in_use(q1));

    h.conn.connect(&options).unwrap();
    h.written();
    h.take_events();
    h.feed(&ConnAck {
        session_present: true,
        return_code: ConnectReturnCode::Accepted,
    });

    let frames = h.written();
    assert_eq!(frames.len(), 3);
    let mut replayed = publish("a", b"1", QoS::AtLeastOnce, Some(q1));
    replayed.dup = true;
    assert_eq!(
        packet::decode(&frames[0]).unwrap(),
        MqttPacket::Publish(replayed)
    );
    match packet::decode(&frames[1]).unwrap() {
        MqttPacket::Publish(p) => {
            assert_eq!(p.packet_id, Some(q2));
            assert!(p.dup && p.retain);
        }
        other => panic!("unexpected {other:?}"),
    }
    match packet::decode(&frames[2]).unwrap() {
        MqttPacket::Subscribe(s) => assert_eq!(s.packet_id, sub),
        other => panic!("unexpected {other:?}"),
    }

    // The QoS 2 handshake restarts from PUBLISH.
    h.feed(&PubComp::new(q2));
    assert!(h.conn.is_packet_id_in_use(q2));

    h.feed(&PubAck::new(q1));
    assert_eq!(done.get(), 1);
    assert_eq!(
        h.conn.publish("d", b"", QoS::AtLeastOnce, false, None),
        Ok(Some(sub + 1))
    );
}

#[test]
fn clean_session_discards_pending_work() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let (done, callback) = counter();
    h.conn
        .publish("t", b"", QoS::AtLeastOnce, false, callback)
        .unwrap();
    h.feed(&publish("t", b"", QoS::ExactlyOnce, Some(9)));
    h.written();

    h.conn.on_transport_closed();
    assert_eq!(done.get(), 0);
    assert_eq!(h.conn.pending_outgoing(), 0);
    assert_eq!(h.conn.pending_releases(), 0);

    h.connect(MqttOptions::new("client"), false);
    assert_eq!(
        h.conn.publish("t", b"", QoS::AtLeastOnce, false, None),
        Ok(Some(1))
    );
}

#[test]
fn publish_duplicate_replaces_the_pending_entry() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    let (first, first_callback) = counter();
    let (second, second_callback) = counter();

    let id = h
        .conn
        .publish("t", b"x", QoS::AtLeastOnce, false, first_callback)
        .unwrap()
        .unwrap();
    h.conn
        .publish_duplicate(id, "t", b"x", QoS::AtLeastOnce, false, second_callback)
        .unwrap();
    let frames = h.written();
    assert_eq!(frames[1][0], 0x3A);

    h.feed(&PubAck::new(id));
    assert_eq!((first.get(), second.get()), (0, 1));

    assert_eq!(
        h.conn.publish_duplicate(0, "t", b"", QoS::AtLeastOnce, false, None),
        Err(UsageError::InvalidPacketId)
    );
    assert_eq!(
        h.conn.publish_duplicate(5, "t", b"", QoS::AtMostOnce, false, None),
        Err(UsageError::InvalidQoS)
    );
}

#[test]
fn keep_alive_pings_and_times_out() {
    let mut h = Harness::connected(MqttOptions::new("client").with_keep_alive(10));

    assert_eq!(h.conn.keep_alive_elapsed(), Flow::Continue);
    assert_eq!(h.written(), [vec![0xC0, 0]]);
    h.feed(&PingResp);
    assert_eq!(h.take_events(), [Event::PingResp]);

    assert_eq!(h.conn.keep_alive_elapsed(), Flow::Continue);
    h.written();
    assert_eq!(h.conn.keep_alive_elapsed(), Flow::Stop);
    assert_eq!(
        h.take_events(),
        [Event::Error(ErrorEvent::KeepAliveTimeout), Event::Close]
    );
    assert_eq!(h.conn.state(), ConnectionState::Disconnected);
}

#[test]
fn manual_responses_when_auto_response_is_off() {
    let mut h = Harness::connected(MqttOptions::new("client").with_auto_response(false));

    h.feed(&publish("t", b"", QoS::AtLeastOnce, Some(1)));
    h.feed(&publish("t", b"", QoS::ExactlyOnce, Some(2)));
    assert!(h.written().is_empty());
    assert!(!h.conn.is_release_pending(2));

    h.conn.puback(1).unwrap();
    h.conn.pubrec(2).unwrap();
    assert!(h.conn.is_release_pending(2));
    assert_eq!(
        h.written(),
        [PubAck::new(1).to_vec().unwrap(), PubRec::new(2).to_vec().unwrap()]
    );

    h.feed(&PubRel::new(2));
    assert!(h.written().is_empty());
    assert!(!h.conn.is_release_pending(2));
    h.conn.pubcomp(2).unwrap();
    assert_eq!(h.written(), [PubComp::new(2).to_vec().unwrap()]);

    let sent: Vec<Event> = h
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, Event::ResponseSent(..)))
        .collect();
    assert_eq!(
        sent,
        [
            Event::ResponseSent(PacketType::PubAck, 1),
            Event::ResponseSent(PacketType::PubRec, 2),
            Event::ResponseSent(PacketType::PubComp, 2),
        ]
    );
    assert_eq!(h.conn.puback(0), Err(UsageError::InvalidPacketId));
}

#[test]
fn disconnect_queues_disconnect_and_rejects_new_work() {
    let mut h = Harness::connected(MqttOptions::new("client"));
    h.conn.disconnect().unwrap();
    assert!(h.conn.is_closing());
    assert_eq!(h.conn.subscribe(&[("t", QoS::AtMostOnce)]), Err(UsageError::NotConnected));
    assert_eq!(h.written(), [vec![0xE0, 0]]);

    h.conn.on_transport_closed();
    assert_eq!(h.take_events(), [Event::Close]);

    // A closed connection can be reused.
    h.connect(MqttOptions::new("client"), false);
    assert!(h.conn.is_connected());
}

#[test]
fn connect_carries_will_and_credentials() {
    let mut conn = Connection::new();
    let will = mqtt_engine::Will {
        topic: "status",
        payload: b"offline",
        qos: QoS::AtLeastOnce,
        retain: true,
    };
    conn.connect(
        &MqttOptions::new("dev")
            .with_keep_alive(30)
            .with_credentials("user", b"secret")
            .with_will(will),
    )
    .unwrap();
    let frame = conn.poll_transmit().unwrap().to_vec();
    match packet::decode(&frame).unwrap() {
        MqttPacket::Connect(connect) => {
            assert_eq!(connect.client_id, "dev");
            assert_eq!(connect.keep_alive, 30);
            assert!(connect.clean_session);
            assert_eq!(connect.will, Some(will));
            assert_eq!(connect.username, Some("user"));
            assert_eq!(connect.password, Some(&b"secret"[..]));
        }
        other => panic!("unexpected {other:?}"),
    }
}
