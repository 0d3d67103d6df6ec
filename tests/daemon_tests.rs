//! End-to-end: configuration file to daemon to client and back out through
//! the final flush.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use splitd::config::{self, Config};
use splitd::splitd_core::{
    ClientTag, EventRecord, FLAG_RETURN_IMPRESSION_DATA, ImpressionsBatch, LocalRuleSet, Recorder,
    RegisterFlags,
};
use splitd::splitd_link::{ClientOptions, LinkClient, LinkError, SocketFlavor};
use splitd::{Daemon, ShutdownReason};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const RULES: &str = r#"
- name: checkout
  traffic_type: user
  treatments: ["on", "off"]
  default_treatment: "off"
  change_number: 12
  keys:
    vip: "on"
  configs:
    "on": '{"color":"green"}'
"#;

#[derive(Default)]
struct CapturingRecorder {
    impressions: Mutex<Vec<(ClientTag, ImpressionsBatch)>>,
    events: Mutex<Vec<(ClientTag, Vec<EventRecord>)>>,
}

#[async_trait]
impl Recorder for CapturingRecorder {
    async fn record_impressions(
        &self,
        tag: &ClientTag,
        batch: ImpressionsBatch,
    ) -> splitd::splitd_core::Result<()> {
        self.impressions.lock().push((tag.clone(), batch));
        Ok(())
    }

    async fn record_events(
        &self,
        tag: &ClientTag,
        batch: Vec<EventRecord>,
    ) -> splitd::splitd_core::Result<()> {
        self.events.lock().push((tag.clone(), batch));
        Ok(())
    }
}

fn write_config(dir: &TempDir, flavor: &str, extra_link: &str) -> Config {
    let rules_path = dir.path().join("flags.yaml");
    std::fs::write(&rules_path, RULES).unwrap();

    let mut file = std::fs::File::create(dir.path().join("splitd.yaml")).unwrap();
    writeln!(
        file,
        "link:\n  socket_path: {}\n  flavor: {flavor}\n  shutdown_grace_secs: 1\n{extra_link}sdk:\n  rules_file: {}\n  impressions_refresh_secs: 3600\n  events_refresh_secs: 3600\n",
        dir.path().join("splitd.sock").display(),
        rules_path.display(),
    )
    .unwrap();
    config::load_file(&dir.path().join("splitd.yaml")).unwrap()
}

async fn connect_when_ready(options: &ClientOptions, flags: RegisterFlags) -> LinkClient {
    for _ in 0..100 {
        match LinkClient::connect(options, "svc-a", "go-6.1.0", flags).await {
            Ok(client) => return client,
            Err(LinkError::Io { .. }) => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(other) => panic!("unexpected connect error {other}"),
        }
    }
    panic!("daemon never started listening");
}

async fn serve_and_flush(flavor: &str) {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, flavor, "");
    let options = config.link.client().unwrap();
    let rules = LocalRuleSet::from_file(config.sdk.rules_file.as_deref().unwrap()).unwrap();
    let recorder = Arc::new(CapturingRecorder::default());

    let daemon = Daemon::with_backends(config, Arc::new(rules), recorder.clone() as Arc<dyn Recorder>);
    let shutdown = daemon.shutdown_handle();
    let running = tokio::spawn(daemon.run());

    let mut client = connect_when_ready(
        &options,
        RegisterFlags::from_bits(FLAG_RETURN_IMPRESSION_DATA),
    )
    .await;

    let vip = client
        .treatment_with_config("vip", None, "checkout", None)
        .await
        .unwrap();
    assert_eq!(vip.treatment, "on");
    assert_eq!(vip.config.as_deref(), Some(r#"{"color":"green"}"#));
    let listener = vip.listener.unwrap();
    assert_eq!(listener.label, "whitelisted");
    assert_eq!(listener.change_number, 12);

    let many = client
        .treatments("joe", None, &["checkout".to_string(), "missing".to_string()], None)
        .await
        .unwrap();
    let treatments: Vec<_> = many.iter().map(|t| t.treatment.as_str()).collect();
    assert_eq!(treatments, vec!["off", "control"]);

    assert!(client.track("joe", "user", "purchase", Some(3.5), None, 1000).await.unwrap());
    assert_eq!(client.split_names().await.unwrap(), vec!["checkout".to_string()]);
    client.close().await.unwrap();

    shutdown.initiate(ShutdownReason::Programmatic);
    let report = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.impressions.queued, 3);
    assert_eq!(report.impressions.dropped, 0);
    assert_eq!(report.events.queued, 1);
    assert_eq!(report.connections_accepted, 1);
    assert!(!dir.path().join("splitd.sock").exists());

    let impressions = recorder.impressions.lock();
    assert_eq!(impressions.len(), 1);
    assert_eq!(impressions[0].0, ClientTag::new("svc-a", "go-6.1.0"));
    let features: Vec<_> = impressions[0].1.iter().map(|g| g.feature.as_str()).collect();
    assert_eq!(features, vec!["checkout", "missing"]);

    let events = recorder.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1[0].event_type_id, "purchase");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_and_final_flush_over_stream() {
    serve_and_flush("unix-stream").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serve_and_final_flush_over_seqpacket() {
    serve_and_flush("unix-seqpacket").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_track_during_grace_reaches_final_flush() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "unix-stream", "");
    let options = config.link.client().unwrap();
    let recorder = Arc::new(CapturingRecorder::default());

    let daemon = Daemon::with_backends(
        config,
        Arc::new(LocalRuleSet::from_yaml(RULES).unwrap()),
        recorder.clone() as Arc<dyn Recorder>,
    );
    let shutdown = daemon.shutdown_handle();
    let running = tokio::spawn(daemon.run());

    let mut client = connect_when_ready(&options, RegisterFlags::default()).await;
    shutdown.initiate(ShutdownReason::Programmatic);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The listener is gone but the open connection is still served.
    assert!(client.track("joe", "user", "late", None, None, 2000).await.unwrap());
    client.close().await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.events.queued, 1);

    let events = recorder.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1[0].event_type_id, "late");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_frame_closes_connection() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "unix-stream", "  buffer_size: 1024\n");
    assert_eq!(config.link.buffer_size, 1024);
    let options = config.link.client().unwrap();
    let socket = config.link.socket_path.clone();

    let daemon = Daemon::with_backends(
        config,
        Arc::new(LocalRuleSet::from_yaml(RULES).unwrap()),
        Arc::new(CapturingRecorder::default()) as Arc<dyn Recorder>,
    );
    let shutdown = daemon.shutdown_handle();
    let running = tokio::spawn(daemon.run());
    connect_when_ready(&options, RegisterFlags::default())
        .await
        .close()
        .await
        .unwrap();

    let mut raw = tokio::net::UnixStream::connect(&socket).await.unwrap();
    raw.write_all(&2048u32.to_le_bytes()).await.unwrap();
    let mut reply = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), raw.read(&mut reply))
        .await
        .expect("daemon closes the connection")
        .unwrap();
    assert_eq!(read, 0);

    shutdown.initiate(ShutdownReason::Programmatic);
    let report = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.connections_accepted, 2);
}

#[tokio::test]
async fn test_occupied_socket_fails_startup() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "unix-stream", "");
    let socket = config.link.socket_path.clone();
    let _holder = tokio::net::UnixListener::bind(&socket).unwrap();

    let daemon = Daemon::from_config(config).unwrap();
    let err = daemon.run().await.unwrap_err();
    assert!(err.to_string().contains(&socket.display().to_string()));
    assert!(Path::new(&socket).exists(), "a live socket must not be removed");
}

#[test]
fn test_default_config_targets_seqpacket() {
    let config = Config::default();
    assert_eq!(config.link.flavor, SocketFlavor::UnixSeqpacket);
}
