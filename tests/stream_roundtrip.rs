//! Transport <-> client integration over localhost
//!
//! Exercises the wire contract end to end: raw fixed-size frames,
//! back-to-back, no framing metadata on either side.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use dual_audio_engine::audio::frame::{create_shared_ring, Frame};
use dual_audio_engine::cancel::CancelToken;
use dual_audio_engine::config::{ChannelRole, EngineConfig, SourceKind};
use dual_audio_engine::constants::{FRAME_BYTES, FRAME_SAMPLES};
use dual_audio_engine::engine::Engine;
use dual_audio_engine::network::client::StreamClient;
use dual_audio_engine::network::transport::{StreamTransport, TransportState};

fn tagged_frame(tag: i16) -> Frame {
    let samples: Vec<i16> = (0..FRAME_SAMPLES as i16).map(|i| tag.wrapping_add(i)).collect();
    Frame::from_samples(samples).unwrap()
}

/// Bind a transport on an ephemeral port for one test.
fn test_transport(
    cancel: &CancelToken,
) -> (StreamTransport, dual_audio_engine::audio::frame::SharedFrameRing) {
    let ring = create_shared_ring(256);
    let transport = StreamTransport::bind(
        ChannelRole::Microphone,
        "127.0.0.1:0".parse().unwrap(),
        ring.clone(),
        cancel.clone(),
    )
    .unwrap();
    (transport, ring)
}

#[test]
fn bytes_round_trip_exactly() {
    let cancel = CancelToken::new();
    let (mut transport, ring) = test_transport(&cancel);

    let frames: Vec<Frame> = (0..10).map(|i| tagged_frame(i * 1000)).collect();
    let expected: Vec<u8> = frames.iter().flat_map(|f| f.to_le_bytes()).collect();
    for frame in &frames {
        ring.push(frame.clone());
    }

    let mut socket = TcpStream::connect(transport.local_addr()).unwrap();
    let mut received = vec![0u8; expected.len()];
    socket.read_exact(&mut received).unwrap();

    // No drops, no duplication, no reordering
    assert_eq!(received, expected);

    cancel.cancel();
    transport.join();
}

#[test]
fn client_reassembles_frames_and_reports_status() {
    let cancel = CancelToken::new();
    let (mut transport, ring) = test_transport(&cancel);

    let (sink_tx, sink_rx) = bounded::<Frame>(64);
    let mut client = StreamClient::connect(
        ChannelRole::Microphone,
        transport.local_addr(),
        cancel.clone(),
        Some(sink_tx),
    )
    .unwrap();
    let status = client.status_handle();

    for i in 0..5 {
        ring.push(tagged_frame(i * 100));
    }

    let frame = sink_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("client should deliver a frame");
    assert_eq!(frame, tagged_frame(0));

    // streaming implies at least one full frame of bytes
    assert!(status.streaming());
    assert!(status.bytes_received() >= FRAME_BYTES as u64);
    assert!(status.frames_received() >= 1);

    cancel.cancel();
    client.join();
    transport.join();
}

#[test]
fn streaming_flag_never_set_without_bytes() {
    let cancel = CancelToken::new();
    let (mut transport, _ring) = test_transport(&cancel);

    // Connect but send nothing: connected yes, streaming no.
    let mut client = StreamClient::connect(
        ChannelRole::Microphone,
        transport.local_addr(),
        cancel.clone(),
        None,
    )
    .unwrap();
    let status = client.status_handle();

    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        if status.streaming() {
            assert!(status.bytes_received() > 0, "streaming=true with zero bytes");
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(status.connected());
    assert!(!status.streaming());
    assert_eq!(status.bytes_received(), 0);

    cancel.cancel();
    client.join();
    transport.join();
}

#[test]
fn mid_frame_close_counts_as_drop() {
    // A raw socket stands in for the engine so a partial frame can be
    // forced onto the wire, which the real transport never does.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let cancel = CancelToken::new();
    let mut client =
        StreamClient::connect(ChannelRole::Microphone, addr, cancel.clone(), None).unwrap();
    let status = client.status_handle();

    let (mut conn, _) = listener.accept().unwrap();
    let bytes = tagged_frame(5).to_le_bytes();
    conn.write_all(&bytes).unwrap();
    conn.write_all(&bytes[..100]).unwrap();
    drop(conn);

    // One complete frame counted, the abandoned tail counted as a drop.
    let deadline = Instant::now() + Duration::from_secs(2);
    while status.drops() == 0 {
        assert!(
            Instant::now() < deadline,
            "mid-frame close never counted as a drop"
        );
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(status.frames_received(), 1);
    assert_eq!(status.drops(), 1);
    assert!(status.last_frame_age().is_some());

    cancel.cancel();
    client.join();
}

#[test]
fn peer_stalled_mid_frame_is_dropped() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let cancel = CancelToken::new();
    let mut client =
        StreamClient::connect(ChannelRole::Microphone, addr, cancel.clone(), None).unwrap();
    let status = client.status_handle();

    // Send a partial frame and then go quiet with the socket held open.
    let (mut conn, _) = listener.accept().unwrap();
    let bytes = tagged_frame(1).to_le_bytes();
    conn.write_all(&bytes[..100]).unwrap();

    let deadline = Instant::now() + Duration::from_secs(4);
    while status.drops() == 0 {
        assert!(Instant::now() < deadline, "stalled peer never dropped");
        thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(status.frames_received(), 0);

    drop(conn);
    cancel.cancel();
    client.join();
}

#[test]
fn transport_survives_client_disconnect_and_serves_next() {
    let cancel = CancelToken::new();
    let (mut transport, ring) = test_transport(&cancel);

    ring.push(tagged_frame(1));
    {
        let mut first = TcpStream::connect(transport.local_addr()).unwrap();
        let mut buf = vec![0u8; FRAME_BYTES];
        first.read_exact(&mut buf).unwrap();
        // first client drops here
    }

    // Transport returns to listening and accepts the next client.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        ring.push(tagged_frame(2));
        if transport.state() == TransportState::Listening {
            break;
        }
        assert!(Instant::now() < deadline, "transport stuck serving dead client");
        thread::sleep(Duration::from_millis(20));
    }

    // Nothing drains the ring while listening, so this frame is waiting
    // for the next client.
    ring.push(tagged_frame(3));
    let mut second = TcpStream::connect(transport.local_addr()).unwrap();
    let mut buf = vec![0u8; FRAME_BYTES];
    second.read_exact(&mut buf).unwrap();
    assert_eq!(transport.clients_served(), 2);

    cancel.cancel();
    transport.join();
}

#[test]
fn pacing_holds_one_frame_per_period() {
    let cancel = CancelToken::new();
    let (mut transport, ring) = test_transport(&cancel);

    // Deep backlog so the sender is never starved.
    for i in 0..200 {
        ring.push(tagged_frame(i));
    }

    let mut socket = TcpStream::connect(transport.local_addr()).unwrap();
    // Drain in the background so socket buffers never throttle the sender.
    let drain = thread::spawn(move || {
        let mut sink = vec![0u8; 16 * 1024];
        while let Ok(n) = socket.read(&mut sink) {
            if n == 0 {
                break;
            }
        }
    });

    let run = Duration::from_millis(600);
    thread::sleep(run);
    let sent = transport.frames_sent();

    // 600 ms / 20 ms = 30 expected; allow scheduler slop but catch both
    // "burst everything" and "drifting slow" failures.
    assert!(sent >= 25, "too few frames sent: {}", sent);
    assert!(sent <= 35, "pacing lost: {} frames in {:?}", sent, run);

    cancel.cancel();
    transport.join();
    let _ = drain.join();
}

#[test]
fn two_channel_engine_streams_to_two_clients() {
    let config = EngineConfig {
        mic_port: 39411,
        loopback_port: 39412,
        source: SourceKind::SyntheticTone,
        ..Default::default()
    };
    let engine = Engine::start(config.clone()).unwrap();

    let cancel = CancelToken::new();
    let mut clients = Vec::new();
    for role in ChannelRole::ALL {
        let addr = config.channel_addr(role).unwrap();
        clients.push(StreamClient::connect(role, addr, cancel.clone(), None).unwrap());
    }

    thread::sleep(Duration::from_secs(2));

    for client in &clients {
        let status = client.status_handle();
        assert!(status.streaming(), "{} not streaming", client.role());
        // 2 s at 50 frames/s = 100 frames; generous lower bound for slow CI.
        assert!(
            status.bytes_received() >= 50 * FRAME_BYTES as u64,
            "{} received only {} bytes",
            client.role(),
            status.bytes_received()
        );
        assert!(status.last_error().is_empty());
    }

    cancel.cancel();
    for client in &mut clients {
        client.join();
    }
    engine.shutdown();
}

#[test]
fn client_reconnects_after_engine_side_drop() {
    // Separate tokens: tearing down the engine side must not stop the
    // client, whose whole job is to survive that.
    let server_cancel = CancelToken::new();
    let client_cancel = CancelToken::new();
    let (mut transport, ring) = test_transport(&server_cancel);

    let mut client = StreamClient::connect(
        ChannelRole::Microphone,
        transport.local_addr(),
        client_cancel.clone(),
        None,
    )
    .unwrap();
    let status = client.status_handle();

    // Feed until the client is streaming.
    let deadline = Instant::now() + Duration::from_secs(2);
    while !status.streaming() {
        ring.push(tagged_frame(7));
        assert!(Instant::now() < deadline, "client never started streaming");
        thread::sleep(Duration::from_millis(20));
    }
    let bytes_before = status.bytes_received();

    // Tear down the serving transport; the client should fall back to
    // reconnecting rather than erroring out to its owner.
    server_cancel.cancel();
    transport.join();

    let reconnect_cancel = CancelToken::new();
    let ring2 = create_shared_ring(64);
    let transport2 = StreamTransport::bind(
        ChannelRole::Microphone,
        transport.local_addr(),
        ring2.clone(),
        reconnect_cancel.clone(),
    );
    // Rebinding the same ephemeral port can race the OS; only continue if
    // the port came back.
    if let Ok(mut transport2) = transport2 {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            ring2.push(tagged_frame(9));
            if status.bytes_received() > bytes_before {
                break;
            }
            assert!(Instant::now() < deadline, "client never reconnected");
            thread::sleep(Duration::from_millis(20));
        }
        reconnect_cancel.cancel();
        transport2.join();
    }

    client_cancel.cancel();
    client.join();
}
