//! Integration tests: full output lifecycles over real TCP connections
//! on localhost.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use teleport_core::media::audio::AUDIO_HEADER_LENGTH;
use teleport_core::{
    AudioFormat, FanoutOutput, FrameEncoder, FrameSink, OutputConfig, Options, PixelFormat,
    RawAudioFrame, RawVideoFrame, SampleFormat, SessionOutput, TAG_JPEG, TAG_WAVE, TeleportCodec,
    TeleportError, TcpPeer, VideoImage, VideoOutcome, VideoPlane, WireMessage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;

// ── Helpers ──────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

fn local_config() -> OutputConfig {
    let mut config = OutputConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..OutputConfig::default()
    };
    config.discovery.enabled = false;
    config
}

/// A 4x4 gray frame whose first pixel carries `marker`.
fn frame(pixels: &mut [u8; 16], marker: u8, timestamp: i64) -> RawVideoFrame<'_> {
    pixels[0] = marker;
    RawVideoFrame {
        width: 4,
        height: 4,
        format: PixelFormat::Y800,
        planes: vec![VideoPlane {
            data: &pixels[..],
            stride: 4,
        }],
        timestamp,
    }
}

async fn until<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

async fn connect_with_quality(output: &SessionOutput, quality: i32) -> TcpStream {
    let mut client = TcpStream::connect(output.local_addr()).await.unwrap();
    client
        .write_all(&Options::new(quality).to_bytes().unwrap())
        .await
        .unwrap();
    client
}

async fn next_message(frames: &mut FramedRead<TcpStream, TeleportCodec>) -> WireMessage {
    tokio::time::timeout(WAIT, frames.next())
        .await
        .expect("no message in time")
        .expect("stream ended")
        .expect("undecodable message")
}

async fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    loop {
        match tokio::time::timeout(WAIT, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => return,
            Ok(Ok(_)) => continue,
            Err(_) => panic!("connection was not closed"),
        }
    }
}

/// Records the quality each encode ran with and echoes the marker pixel.
#[derive(Default)]
struct QualityRecorder {
    seen: Mutex<Vec<u8>>,
}

impl FrameEncoder for QualityRecorder {
    fn encode(&self, image: &VideoImage, quality: u8) -> Result<Vec<u8>, TeleportError> {
        self.seen.lock().unwrap().push(quality);
        Ok(vec![image.data[0]])
    }
}

/// Earlier markers take longer, so encodes complete in reverse order.
struct ReversedLatency {
    frames: u8,
    finished: AtomicUsize,
}

impl ReversedLatency {
    fn new(frames: u8) -> Self {
        Self {
            frames,
            finished: AtomicUsize::new(0),
        }
    }
}

impl FrameEncoder for ReversedLatency {
    fn encode(&self, image: &VideoImage, _quality: u8) -> Result<Vec<u8>, TeleportError> {
        let marker = image.data[0];
        let delay = u64::from(self.frames.saturating_sub(marker)) * 20;
        std::thread::sleep(Duration::from_millis(delay));
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(vec![marker])
    }
}

// ── Handshake ────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_quality_applies_to_next_encode() {
    let recorder = Arc::new(QualityRecorder::default());
    let output = SessionOutput::start_with_encoder(local_config(), recorder.clone())
        .await
        .unwrap();
    assert_eq!(output.quality().get(), 90);

    let client = connect_with_quality(&output, 50).await;
    until(|| output.quality().get() == 50).await;
    until(|| output.transport().has_receivers()).await;

    let mut pixels = [0u8; 16];
    let outcome = output.raw_video(&frame(&mut pixels, 7, 1234)).unwrap();
    assert_eq!(outcome, VideoOutcome::Queued);

    let mut frames = FramedRead::new(client, TeleportCodec::default());
    let msg = next_message(&mut frames).await;
    assert_eq!(msg.tag(), TAG_JPEG);
    assert_eq!(msg.timestamp(), 1234);
    assert_eq!(msg.payload().as_ref(), &[7]);
    assert_eq!(*recorder.seen.lock().unwrap(), vec![50]);

    output.stop().await;
}

#[tokio::test]
async fn bad_magic_closes_without_changing_quality() {
    let output = SessionOutput::start(local_config()).await.unwrap();

    let mut client = TcpStream::connect(output.local_addr()).await.unwrap();
    client
        .write_all(b"NOPE\x0e\x00\x00\x00{\"Quality\":10}")
        .await
        .unwrap();

    assert_closed(&mut client).await;
    assert_eq!(output.quality().get(), 90);

    let mut pixels = [0u8; 16];
    let outcome = output.raw_video(&frame(&mut pixels, 0, 0)).unwrap();
    assert_eq!(outcome, VideoOutcome::Idle);
    output.stop().await;
}

// ── Ordering ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn frames_arrive_in_submission_order() {
    const FRAMES: u8 = 8;
    let encoder = Arc::new(ReversedLatency::new(FRAMES));
    let output = SessionOutput::start_with_encoder(local_config(), encoder)
        .await
        .unwrap();

    let client = connect_with_quality(&output, 80).await;
    until(|| output.transport().has_receivers()).await;

    let mut pixels = [0u8; 16];
    for marker in 0..FRAMES {
        let ts = 1_000 + i64::from(marker) * 33;
        let outcome = output.raw_video(&frame(&mut pixels, marker, ts)).unwrap();
        assert_eq!(outcome, VideoOutcome::Queued);
    }

    let mut frames = FramedRead::new(client, TeleportCodec::default());
    for marker in 0..FRAMES {
        let msg = next_message(&mut frames).await;
        assert_eq!(msg.payload().as_ref(), &[marker]);
        assert_eq!(msg.timestamp(), 1_000 + i64::from(marker) * 33);
    }
    assert_eq!(output.dropped_frames(), 0);

    output.stop().await;
}

// ── Audio ────────────────────────────────────────────────────────

/// Send `audio`, then one video frame, and check the receiver decodes a
/// `WAVE` message carrying `samples` followed by the `JPEG` frame.
async fn audio_then_video(audio: RawAudioFrame<'_>, samples: &[u8]) {
    let recorder = Arc::new(QualityRecorder::default());
    let output = SessionOutput::start_with_encoder(local_config(), recorder)
        .await
        .unwrap();
    let client = connect_with_quality(&output, 50).await;
    until(|| output.transport().has_receivers()).await;

    output.raw_audio(&audio).await.unwrap();
    let mut pixels = [0u8; 16];
    let outcome = output.raw_video(&frame(&mut pixels, 9, 6)).unwrap();
    assert_eq!(outcome, VideoOutcome::Queued);

    let mut frames = FramedRead::new(client, TeleportCodec::default());
    let wave = next_message(&mut frames).await;
    assert_eq!(wave.tag(), TAG_WAVE);
    assert_eq!(wave.timestamp(), 5);

    let payload = wave.payload();
    let format = audio.format;
    assert_eq!(payload.len(), AUDIO_HEADER_LENGTH + samples.len());
    assert_eq!(
        &payload[0..4],
        &(format.sample_format.packed() as i32).to_le_bytes()
    );
    assert_eq!(&payload[4..8], &(format.sample_rate as i32).to_le_bytes());
    assert_eq!(&payload[8..12], &(format.channels as i32).to_le_bytes());
    assert_eq!(&payload[12..16], &(audio.frames as i32).to_le_bytes());
    assert_eq!(&payload[AUDIO_HEADER_LENGTH..], samples);

    let jpeg = next_message(&mut frames).await;
    assert_eq!(jpeg.tag(), TAG_JPEG);
    assert_eq!(jpeg.timestamp(), 6);
    assert_eq!(jpeg.payload().as_ref(), &[9]);

    output.stop().await;
}

#[tokio::test]
async fn audio_precedes_video_on_the_session_stream() {
    let samples: Vec<u8> = (0..16).collect();
    let audio = RawAudioFrame {
        format: AudioFormat {
            channels: 2,
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
        },
        frames: 4,
        timestamp: 5,
        planes: vec![&samples[..]],
    };
    audio_then_video(audio, &samples).await;
}

#[tokio::test]
async fn planar_audio_arrives_interleaved() {
    let left = [1u8, 1, 2, 2];
    let right = [9u8, 9, 8, 8];
    let audio = RawAudioFrame {
        format: AudioFormat {
            channels: 2,
            sample_format: SampleFormat::S16Planar,
            sample_rate: 44_100,
        },
        frames: 2,
        timestamp: 5,
        planes: vec![&left[..], &right[..]],
    };
    audio_then_video(audio, &[1, 1, 9, 9, 2, 2, 8, 8]).await;
}

// ── Single active connection ─────────────────────────────────────

#[tokio::test]
async fn new_connection_replaces_the_active_one() {
    let recorder = Arc::new(QualityRecorder::default());
    let output = SessionOutput::start_with_encoder(local_config(), recorder)
        .await
        .unwrap();

    let mut first = connect_with_quality(&output, 40).await;
    until(|| output.quality().get() == 40).await;

    let second = connect_with_quality(&output, 60).await;
    until(|| output.quality().get() == 60).await;
    until(|| output.transport().has_receivers()).await;
    assert_closed(&mut first).await;

    let mut pixels = [0u8; 16];
    output.raw_video(&frame(&mut pixels, 3, 99)).unwrap();

    let mut frames = FramedRead::new(second, TeleportCodec::default());
    let msg = next_message(&mut frames).await;
    assert_eq!(msg.timestamp(), 99);

    output.stop().await;
}

// ── Fanout ───────────────────────────────────────────────────────

async fn admitted_pair(output: &FanoutOutput, listener: &TcpListener) -> TcpStream {
    let addr = listener.local_addr().unwrap();
    let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
    let (server, _) = listener.accept().await.unwrap();
    output.admit(TcpPeer::new(server).unwrap()).await.unwrap();
    client.await.unwrap()
}

fn marker_message(timestamp: i64) -> bytes::Bytes {
    WireMessage::jpeg(timestamp, bytes::Bytes::from_static(b"x"))
        .unwrap()
        .to_bytes()
}

#[tokio::test]
async fn fanout_failure_is_isolated() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let output = FanoutOutput::start(local_config(), port).await.unwrap();

    let one = admitted_pair(&output, &listener).await;
    let two = admitted_pair(&output, &listener).await;
    let three = admitted_pair(&output, &listener).await;
    assert_eq!(output.receiver_count(), 3);

    let readers: Vec<_> = [one, three]
        .into_iter()
        .map(|stream| {
            tokio::spawn(async move {
                let mut frames = FramedRead::new(stream, TeleportCodec::default());
                let mut seen = Vec::new();
                while let Some(Ok(msg)) = frames.next().await {
                    if msg.timestamp() < 0 {
                        break;
                    }
                    seen.push(msg.timestamp());
                }
                seen
            })
        })
        .collect();

    drop(two);
    let transport = output.transport().clone();
    let mut ts = 0;
    tokio::time::timeout(WAIT, async {
        while transport.count() == 3 {
            transport.broadcast(marker_message(ts));
            ts += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("failed receiver was never removed");
    assert_eq!(output.receiver_count(), 2);

    let summary = transport.broadcast(marker_message(ts));
    assert_eq!(summary.enqueued, 2);
    transport.broadcast(marker_message(-1));

    for reader in readers {
        let seen = tokio::time::timeout(WAIT, reader).await.unwrap().unwrap();
        let expected: Vec<i64> = (0..=ts).collect();
        assert_eq!(seen, expected);
    }

    output.stop().await;
}

// ── Shutdown ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_waits_for_every_encode() {
    const FRAMES: u8 = 5;
    let encoder = Arc::new(ReversedLatency::new(FRAMES));
    let output = SessionOutput::start_with_encoder(local_config(), encoder.clone())
        .await
        .unwrap();

    let mut client = connect_with_quality(&output, 80).await;
    until(|| output.transport().has_receivers()).await;

    let mut pixels = [0u8; 16];
    for marker in 0..FRAMES {
        output
            .raw_video(&frame(&mut pixels, marker, i64::from(marker)))
            .unwrap();
    }

    output.stop().await;
    assert_eq!(encoder.finished.load(Ordering::SeqCst), usize::from(FRAMES));

    // Whatever was written before the stop is followed by a clean close.
    let mut rest = Vec::new();
    tokio::time::timeout(WAIT, client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();

    let mut pixels = [0u8; 16];
    assert_eq!(
        output.raw_video(&frame(&mut pixels, 0, 0)).unwrap(),
        VideoOutcome::Idle
    );
}

#[tokio::test]
async fn fanout_stop_flushes_queued_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let output = FanoutOutput::start(local_config(), port).await.unwrap();

    let client = admitted_pair(&output, &listener).await;
    for ts in 0..10 {
        output.transport().broadcast(marker_message(ts));
    }
    output.stop().await;
    assert_eq!(output.receiver_count(), 0);

    let seen: Vec<i64> = FramedRead::new(client, TeleportCodec::default())
        .map(|m| m.unwrap().timestamp())
        .collect()
        .await;
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}
