use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashboard_core::{AnalysisOutcome, MediaBlob, Payload, ResponseShape, TrafficQuery};
use dashboard_engine::{
    ChatRequest, ChunkSink, ClientSettings, FailureKind, ReqwestClient, SubmissionClient,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ReqwestClient {
    let base = Url::parse(&server.uri()).unwrap();
    ReqwestClient::new(ClientSettings::new(base.clone(), base)).unwrap()
}

fn settings_for(base: &Url) -> ClientSettings {
    ClientSettings::new(base.clone(), base.clone())
}

fn chat_request() -> ChatRequest {
    ChatRequest {
        message: "hi".into(),
        station_id: "1".into(),
    }
}

/// Reads one request, headers and `content-length` body, off the socket.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let body_len = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

/// Answers a single connection with hand-written bytes. With `hold_open` the
/// socket stays silent afterwards, otherwise it is dropped mid-response.
async fn scripted_server(head: &'static str, parts: Vec<&'static str>, hold_open: bool) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        for part in parts {
            socket.write_all(part.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        }
        if hold_open {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

#[derive(Default)]
struct CollectingSink {
    chunks: Mutex<Vec<String>>,
}

impl CollectingSink {
    fn joined(&self) -> String {
        self.chunks.lock().unwrap().concat()
    }
}

impl ChunkSink for CollectingSink {
    fn chunk(&self, text: String) {
        self.chunks.lock().unwrap().push(text);
    }
}

fn jpeg() -> Payload {
    Payload::Ready {
        blob: MediaBlob::new(vec![0xff, 0xd8, 0xff], "image/jpeg"),
        file_name: "crash.jpg".into(),
    }
}

#[tokio::test]
async fn submit_sends_one_multipart_request_and_decodes_prediction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/accident/predict/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prediction": "Accident",
            "probabilities": {"Accident": 0.87, "NonAccident": 0.13}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .submit("/api/accident/predict/image", ResponseShape::Prediction, jpeg())
        .await
        .expect("submit ok");

    let prediction = outcome.prediction().unwrap();
    assert_eq!(prediction.label, "Accident");
    assert_eq!(prediction.class_probabilities["NonAccident"], 0.13);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"crash.jpg\""));
    assert!(body.contains("image/jpeg"));
}

#[tokio::test]
async fn deferred_sample_is_fetched_then_uploaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drowsiness/drowsiness1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/jpeg"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/drowsiness/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prediction": "Alert",
            "probabilities": {"Alert": 0.95, "Drowsy": 0.05},
            "confidenceScore": 0.95
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .submit(
            "/api/drowsiness/predict",
            ResponseShape::Prediction,
            Payload::Sample {
                locator: "/drowsiness/drowsiness1.jpg".into(),
            },
        )
        .await
        .expect("submit ok");

    let details = outcome.prediction().unwrap().details.clone().unwrap();
    assert_eq!(details.confidence_score, Some(0.95));
    let requests = server.received_requests().await.unwrap();
    let upload = String::from_utf8_lossy(&requests[1].body);
    assert!(upload.contains("filename=\"drowsiness1.jpg\""));
}

#[tokio::test]
async fn failed_sample_never_reaches_prediction_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accident_prediction/missing.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit(
            "/api/accident/predict/image",
            ResponseShape::Prediction,
            Payload::Sample {
                locator: "/accident_prediction/missing.jpg".into(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::SampleFetch);
}

#[tokio::test]
async fn http_error_carries_status_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/drowsiness/predict"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Error in prediction"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit("/api/drowsiness/predict", ResponseShape::Prediction, jpeg())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Transport { status: Some(400) });
    assert_eq!(err.message, "Error in prediction");
}

#[tokio::test]
async fn malformed_body_is_a_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit("/api/accident/predict/image", ResponseShape::Prediction, jpeg())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn slow_prediction_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"prediction": "Accident", "probabilities": {}})),
        )
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let settings = ClientSettings {
        request_timeout: Some(Duration::from_millis(50)),
        ..ClientSettings::new(base.clone(), base)
    };
    let err = ReqwestClient::new(settings)
        .unwrap()
        .submit("/api/accident/predict/image", ResponseShape::Prediction, jpeg())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn derived_result_and_artifact_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/accident/predict/video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Accident detected in the video.",
            "accident_frame": {
                "filename": "frame 12.jpg",
                "prediction": "Accident",
                "probabilities": {"Accident": 0.91, "NonAccident": 0.09}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0xffu8, 0xd8], "image/jpeg"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let payload = Payload::Ready {
        blob: MediaBlob::new(vec![0, 0, 0, 0x18], "video/mp4"),
        file_name: "dashcam.mp4".into(),
    };
    let outcome = client
        .submit("/api/accident/predict/video", ResponseShape::DerivedArtifact, payload)
        .await
        .expect("submit ok");
    let identifier = match &outcome {
        AnalysisOutcome::Derived(derived) => derived.artifact.as_ref().unwrap().identifier.clone(),
        other => panic!("unexpected {other:?}"),
    };

    let blob = client
        .fetch_artifact("/api/accident/frames", &identifier)
        .await
        .expect("artifact ok");
    assert_eq!(blob.content_type(), "image/jpeg");
    assert_eq!(blob.bytes(), &[0xff, 0xd8]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[1].url.path(), "/api/accident/frames/frame%2012.jpg");
}

#[tokio::test]
async fn missing_artifact_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Frame not found"})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_artifact("/api/accident/frames", "frame1.jpg")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Transport { status: Some(404) });
    assert_eq!(err.message, "Frame not found");
}

#[tokio::test]
async fn traffic_prediction_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/traffic/predict/"))
        .and(body_json(json!({"station_id": 4, "datetime": "2024-03-01 17:45:00"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "station_id": 4,
            "datetime": "2024-03-01 17:45:00",
            "prediction": 57
        })))
        .expect(1)
        .mount(&server)
        .await;

    let forecast = client_for(&server)
        .predict_traffic(&TrafficQuery {
            station_id: 4,
            datetime: "2024-03-01 17:45:00".into(),
        })
        .await
        .expect("traffic ok");
    assert_eq!(forecast.predicted_volume, 57);
}

#[tokio::test]
async fn chat_stream_delivers_text_to_sink() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({"message": "Next bus?", "stationId": "7"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("Bus 12 arrives in 4 minutes ✓", "text/plain"),
        )
        .mount(&server)
        .await;

    let sink = CollectingSink::default();
    let request = ChatRequest {
        message: "Next bus?".into(),
        station_id: "7".into(),
    };
    client_for(&server)
        .stream_chat(&request, &sink, &CancellationToken::new())
        .await
        .expect("stream ok");

    assert_eq!(sink.joined(), "Bus 12 arrives in 4 minutes ✓");
}

#[tokio::test]
async fn chat_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = CollectingSink::default();
    let request = ChatRequest {
        message: "hi".into(),
        station_id: "1".into(),
    };
    let err = client_for(&server)
        .stream_chat(&request, &sink, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Transport { status: Some(500) });
    assert!(sink.joined().is_empty());
}

#[tokio::test]
async fn cancelled_chat_stops_waiting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_string("too late"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let sink = CollectingSink::default();
    let request = ChatRequest {
        message: "hi".into(),
        station_id: "1".into(),
    };
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = client.stream_chat(&request, &sink, &token).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Cancelled);
    assert!(sink.joined().is_empty());
}

#[tokio::test]
async fn oversized_artifact_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "image/jpeg"))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let settings = ClientSettings {
        max_response_bytes: 16,
        ..settings_for(&base)
    };
    let err = ReqwestClient::new(settings)
        .unwrap()
        .fetch_artifact("/api/accident/frames", "frame1.jpg")
        .await
        .unwrap_err();

    assert_eq!(
        err.kind,
        FailureKind::TooLarge {
            max_bytes: 16,
            actual: Some(64),
        }
    );
}

#[tokio::test]
async fn oversized_sample_fails_submission_as_sample_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accident_prediction/accident2.webp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "image/webp"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let settings = ClientSettings {
        max_response_bytes: 16,
        ..settings_for(&base)
    };
    let err = ReqwestClient::new(settings)
        .unwrap()
        .submit(
            "/api/accident/predict/image",
            ResponseShape::Prediction,
            Payload::Sample {
                locator: "/accident_prediction/accident2.webp".into(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::SampleFetch);
    assert!(err.message.contains("too large"), "{}", err.message);
}

#[tokio::test]
async fn oversized_chat_reply_is_cut_off() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(64), "text/plain"))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let settings = ClientSettings {
        max_response_bytes: 16,
        ..settings_for(&base)
    };
    let sink = CollectingSink::default();
    let err = ReqwestClient::new(settings)
        .unwrap()
        .stream_chat(&chat_request(), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err.kind, FailureKind::TooLarge { max_bytes: 16, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn chat_without_response_headers_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_string("too late"),
        )
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let settings = ClientSettings {
        request_timeout: Some(Duration::from_millis(200)),
        stream_idle_timeout: Some(Duration::from_millis(200)),
        ..settings_for(&base)
    };
    let sink = CollectingSink::default();
    let started = Instant::now();
    let err = ReqwestClient::new(settings)
        .unwrap()
        .stream_chat(&chat_request(), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(sink.joined().is_empty());
}

#[tokio::test]
async fn chat_stream_that_stalls_after_first_chunk_times_out() {
    let base = scripted_server(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n",
        vec!["5\r\nHello\r\n"],
        true,
    )
    .await;
    let settings = ClientSettings {
        stream_idle_timeout: Some(Duration::from_millis(200)),
        ..settings_for(&base)
    };
    let sink = CollectingSink::default();
    let started = Instant::now();
    let err = ReqwestClient::new(settings)
        .unwrap()
        .stream_chat(&chat_request(), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Timeout);
    assert_eq!(sink.joined(), "Hello");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn chat_body_that_breaks_off_is_a_stream_failure() {
    let base = scripted_server(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 100\r\n\r\n",
        vec!["Partial"],
        false,
    )
    .await;
    let sink = CollectingSink::default();
    let err = ReqwestClient::new(settings_for(&base))
        .unwrap()
        .stream_chat(&chat_request(), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::Stream);
}
