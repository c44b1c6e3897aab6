//! End-to-end network source behavior against live in-test HTTP servers.

use std::io::{Cursor, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camhub::{CameraSource, NetworkStreamConfig, NetworkStreamSource};

fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 200])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    bytes
}

fn config_for(addr: SocketAddr) -> NetworkStreamConfig {
    NetworkStreamConfig {
        url: format!("http://{}/stream", addr),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
    }
}

/// Serves one connection with a multipart MJPEG body, repeating `jpeg`
/// until the client goes away.
fn spawn_mjpeg_server(jpeg: Vec<u8>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let header = "HTTP/1.1 200 OK\r\n\
                      Connection: close\r\n\
                      Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n";
        if stream.write_all(header.as_bytes()).is_err() {
            return;
        }
        for _ in 0..200 {
            let part = "--frame\r\nContent-Type: image/jpeg\r\n\r\n";
            if stream.write_all(part.as_bytes()).is_err()
                || stream.write_all(&jpeg).is_err()
                || stream.write_all(b"\r\n").is_err()
                || stream.flush().is_err()
            {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
    });
    (addr, handle)
}

/// Answers every connection with a 503 and counts the attempts.
fn spawn_rejecting_server() -> (SocketAddr, Arc<AtomicUsize>, Arc<AtomicBool>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.set_nonblocking(true).expect("nonblocking");
    let addr = listener.local_addr().expect("local addr");
    let attempts = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let attempts_server = attempts.clone();
    let stop_server = stop.clone();
    let handle = thread::spawn(move || loop {
        if stop_server.load(Ordering::SeqCst) {
            return;
        }
        match listener.accept() {
            Ok((mut stream, _)) => {
                attempts_server.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\n\
                      Content-Length: 0\r\nConnection: close\r\n\r\n",
                );
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return,
        }
    });
    (addr, attempts, stop, handle)
}

#[test]
fn delivers_decoded_frames_from_a_live_stream() {
    let (addr, server) = spawn_mjpeg_server(encode_test_jpeg(32, 24));
    let mut source = NetworkStreamSource::with_name("cam", config_for(addr));

    assert!(source.connect());
    assert!(source.is_connected());

    let frame = (0..5)
        .find_map(|_| source.read())
        .expect("frame within the bounded waits");
    assert!(source.is_valid_frame(&frame));
    assert_eq!(frame.width(), 32);
    assert_eq!(frame.height(), 24);

    source.release();
    assert!(!source.is_connected());
    // Releasing again produces no error and stays disconnected.
    source.release();
    assert!(!source.is_connected());

    server.join().expect("server thread");
}

#[test]
fn non_success_status_never_connects_and_keeps_retrying() {
    let (addr, attempts, stop, server) = spawn_rejecting_server();
    let mut source = NetworkStreamSource::with_name("cam", config_for(addr));

    assert!(!source.connect());

    // Initial attempt plus at least one retry after the fixed delay.
    let deadline = Instant::now() + Duration::from_secs(6);
    while attempts.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(
        attempts.load(Ordering::SeqCst) >= 2,
        "expected repeated connection attempts, saw {}",
        attempts.load(Ordering::SeqCst)
    );
    assert!(!source.is_connected());
    assert!(source.read().is_none());

    source.release();
    stop.store(true, Ordering::SeqCst);
    server.join().expect("server thread");
}

#[test]
fn read_against_a_dead_endpoint_yields_nothing() {
    // Bind and drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let mut source = NetworkStreamSource::with_name("cam", config_for(addr));
    assert!(source.read().is_none());
    assert!(!source.is_connected());
    source.release();
}
