use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use vastr_embed::{ExtractionError, ImageFetcher};

/// Serves one connection on a local port, answering with `response` after
/// `delay`. Returns the url to request.
fn serve_once(response: &'static str, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else { return };
        let mut buf = [0u8; 4096];
        let mut seen = Vec::new();
        while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => seen.extend_from_slice(&buf[..n]),
            }
        }
        thread::sleep(delay);
        let _ = stream.write_all(response.as_bytes());
    });
    format!("http://{addr}/image.png")
}

fn fetcher() -> ImageFetcher { ImageFetcher::new(Duration::from_secs(5)) }

#[test]
fn not_found_is_an_http_status_error() {
    let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", Duration::ZERO);
    match fetcher().fetch(&url) {
        Err(ExtractionError::HttpStatus { status, url: failed }) => {
            assert_eq!(status, 404);
            assert_eq!(failed, url);
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[test]
fn html_body_is_not_an_image() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 13\r\nConnection: close\r\n\r\n<html></html>",
        Duration::ZERO,
    );
    match fetcher().fetch(&url) {
        Err(ExtractionError::NotAnImage { content_type, .. }) => assert_eq!(content_type, "text/html"),
        other => panic!("expected NotAnImage, got {other:?}"),
    }
}

#[test]
fn image_body_is_returned() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4\r\nConnection: close\r\n\r\nPNG!",
        Duration::ZERO,
    );
    assert_eq!(fetcher().fetch(&url).expect("fetched"), b"PNG!".to_vec());
}

#[test]
fn stalled_server_times_out() {
    let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n", Duration::from_secs(3));
    let started = std::time::Instant::now();
    let result = ImageFetcher::new(Duration::from_millis(300)).fetch(&url);
    assert!(matches!(result, Err(ExtractionError::Fetch { .. })), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn refused_connection_is_a_fetch_error() {
    let port = TcpListener::bind("127.0.0.1:0").expect("bind").local_addr().expect("addr").port();
    let result = fetcher().fetch(&format!("http://127.0.0.1:{port}/gone.png"));
    assert!(matches!(result, Err(ExtractionError::Fetch { .. })), "got {result:?}");
}
