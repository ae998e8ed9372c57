//! DICOMweb access and notifier against a canned local HTTP responder.

use assert_matches::assert_matches;
use radiarch_pacs::access::{AccessError, DataAccess};
use radiarch_pacs::dicomweb::{DicomWebAccess, DicomWebConfig};
use radiarch_pacs::notifier::{DicomWebNotifier, Notifier};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A request as seen by the responder: request line, headers, body.
#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: String,
    body: Vec<u8>,
}

/// Serve the given `(status, body)` responses in order, one per connection.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let captured = read_request(&mut socket).await;
            let _ = tx.send(captured);

            let reason = if status < 300 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/dicom+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    (format!("http://{addr}/dicom-web"), rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        assert!(n > 0, "connection closed before headers were complete");
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before body was complete");
        buf.extend_from_slice(&chunk[..n]);
    }

    let (request_line, headers) = head.split_once("\r\n").unwrap();
    Captured {
        request_line: request_line.to_string(),
        headers: headers.to_lowercase(),
        body: buf[header_end..header_end + content_length].to_vec(),
    }
}

// ---------------------------------------------------------------------------
// DataAccess
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_study_parses_qido_match() {
    let (url, mut requests) = serve(vec![(
        200,
        r#"[{"0020000D":{"vr":"UI","Value":["1.2.3"]},"00100010":{"vr":"PN","Value":[{"Alphabetic":"DOE^JANE"}]}}]"#,
    )])
    .await;
    let access = DicomWebAccess::new(DicomWebConfig::new(&url)).unwrap();

    let study = access.get_study("1.2.3").await.unwrap().unwrap();
    assert_eq!(study.study_instance_uid, "1.2.3");
    assert_eq!(study.patient_name.as_deref(), Some("DOE^JANE"));

    let request = requests.recv().await.unwrap();
    assert_eq!(
        request.request_line,
        "GET /dicom-web/studies?StudyInstanceUID=1.2.3 HTTP/1.1"
    );
    assert!(request.headers.contains("accept: application/dicom+json"));
}

#[tokio::test]
async fn get_study_empty_result_is_none() {
    let (url, _requests) = serve(vec![(200, "[]")]).await;
    let access = DicomWebAccess::new(DicomWebConfig::new(&url)).unwrap();
    assert!(access.get_study("1.2.3").await.unwrap().is_none());
}

#[tokio::test]
async fn server_error_is_transient() {
    let (url, _requests) = serve(vec![(503, "")]).await;
    let access = DicomWebAccess::new(DicomWebConfig::new(&url)).unwrap();
    let err = access.get_study("1.2.3").await.unwrap_err();
    assert_matches!(err, AccessError::HttpStatus(503));
    assert!(err.is_transient());
}

#[tokio::test]
async fn get_segmentation_reads_metadata() {
    let (url, mut requests) = serve(vec![
        (
            200,
            r#"[{"0020000D":{"vr":"UI","Value":["1.2.3"]},"0020000E":{"vr":"UI","Value":["1.2.3.4"]}}]"#,
        ),
        (
            200,
            r#"[{"30060020":{"vr":"SQ","Value":[{"30060022":{"vr":"IS","Value":[1]},"30060026":{"vr":"LO","Value":["PTV"]}}]}}]"#,
        ),
    ])
    .await;
    let access = DicomWebAccess::new(DicomWebConfig::new(&url)).unwrap();

    let seg = access.get_segmentation("1.2.3.4.5").await.unwrap().unwrap();
    assert_eq!(seg.label_names(), vec!["PTV"]);

    let search = requests.recv().await.unwrap();
    assert!(search.request_line.contains("/instances?SOPInstanceUID=1.2.3.4.5"));
    let metadata = requests.recv().await.unwrap();
    assert!(metadata
        .request_line
        .contains("/studies/1.2.3/series/1.2.3.4/instances/1.2.3.4.5/metadata"));
}

#[tokio::test]
async fn unreachable_archive_is_transient() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let access = DicomWebAccess::new(DicomWebConfig::new(&format!("http://{addr}"))).unwrap();
    let err = access.get_study("1.2.3").await.unwrap_err();
    assert_matches!(err, AccessError::Request(_));
    assert!(err.is_transient());
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notifier_posts_multipart_related() {
    let (url, mut requests) = serve(vec![(200, "")]).await;
    let notifier = DicomWebNotifier::new(
        DicomWebConfig::new(&url).with_credentials(Some("orthanc".into()), Some("secret".into())),
    )
    .unwrap();

    assert!(notifier.enabled());
    assert!(notifier.store_instances(b"DICM-bytes".to_vec()).await);

    let request = requests.recv().await.unwrap();
    assert_eq!(request.request_line, "POST /dicom-web/studies HTTP/1.1");
    assert!(request
        .headers
        .contains("content-type: multipart/related; type=\"application/dicom\"; boundary="));
    assert!(request.headers.contains("authorization: basic "));
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("DICM-bytes"));
}

#[tokio::test]
async fn notifier_failure_returns_false() {
    let (url, _requests) = serve(vec![(500, "")]).await;
    let notifier = DicomWebNotifier::new(DicomWebConfig::new(&url)).unwrap();
    assert!(!notifier.store_instances(vec![1, 2, 3]).await);
}
