//! Sender service core logic.
//!
//! Starts one output in the configured delivery model and feeds it
//! generated frames at a fixed rate until stopped, the way a capture host
//! would drive its capture callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use teleport_core::{FanoutOutput, FrameSink, Output, PixelFormat, SessionOutput, TcpPeer};

use crate::config::{Mode, SenderConfig};
use crate::source::{TestPattern, Tone};

/// How often the dropped-frame counter is reported.
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

// ── SenderService ────────────────────────────────────────────────

/// The top-level sender service.
pub struct SenderService {
    config: SenderConfig,
    running: Arc<AtomicBool>,
}

impl SenderService {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the service until stopped.
    ///
    /// 1. Starts a session or fanout output.
    /// 2. In fanout mode, admits every TCP connection on `fanout_port`.
    /// 3. Feeds video and audio at the configured rate.
    /// 4. Stops the output and waits for its tasks when `running` clears.
    ///
    /// The service is armed from `new`, so a stop requested before `run`
    /// returns without starting an output.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let result = self.serve().await;
        self.running.store(false, Ordering::SeqCst);
        info!("sender stopped");
        result
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service has not been told to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn serve(&self) -> Result<(), Box<dyn std::error::Error>> {
        let output_config = self.config.to_output_config()?;
        let format: PixelFormat = self.config.source.pixel_format.parse()?;
        if !self.is_running() {
            info!("stop requested before start");
            return Ok(());
        }

        match self.config.output.mode {
            Mode::Session => {
                let output = SessionOutput::start(output_config).await?;
                info!("receivers connect to {}", output.local_addr());
                self.drive(&output, format).await;
                output.stop().await;
            }
            Mode::Fanout => {
                let listener =
                    TcpListener::bind(("0.0.0.0", self.config.output.fanout_port)).await?;
                let port = listener.local_addr()?.port();
                let output = Arc::new(FanoutOutput::start(output_config, port).await?);
                info!("receivers connect to port {port}");

                let acceptor = tokio::spawn(admit_loop(
                    listener,
                    Arc::clone(&output),
                    Arc::clone(&self.running),
                ));
                self.drive(output.as_ref(), format).await;
                let _ = acceptor.await;
                output.stop().await;
            }
        }
        Ok(())
    }

    /// Capture loop: one video frame and one audio block per tick.
    async fn drive<T: FrameSink>(&self, output: &Output<T>, format: PixelFormat) {
        let source = &self.config.source;
        let fps = self.config.fps();
        let (width, height) = self.config.dimensions();

        let mut pattern = TestPattern::new(width, height, format);
        let mut tone = source
            .audio
            .then(|| Tone::new(source.tone_hz, source.sample_rate, source.channels));
        let audio_block = tone.as_ref().map_or(0, |t| t.sample_rate() / fps);

        let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut reported_drops = 0;

        info!("generating {width}x{height} {format:?} at {fps} fps");

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_stop(&self.running) => break,
            }

            let timestamp = started.elapsed().as_nanos() as i64;
            if let Err(e) = output.raw_video(&pattern.frame(timestamp)) {
                warn!("video frame rejected: {e}");
            }
            pattern.advance();

            if let Some(tone) = tone.as_mut() {
                tone.generate(audio_block);
                if let Err(e) = output.raw_audio(&tone.frame(timestamp)).await {
                    warn!("audio block rejected: {e}");
                }
            }

            if last_report.elapsed() >= REPORT_INTERVAL {
                let dropped = output.dropped_frames();
                if dropped > reported_drops {
                    warn!(
                        dropped,
                        new = dropped - reported_drops,
                        "frames dropped, receiver is falling behind"
                    );
                    reported_drops = dropped;
                }
                debug!(quality = output.quality().get(), "encoder quality");
                last_report = Instant::now();
            }
        }
    }
}

/// Admit every TCP connection on `listener` into the fanout output.
async fn admit_loop(listener: TcpListener, output: Arc<FanoutOutput>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        let accept = tokio::select! {
            result = listener.accept() => result,
            _ = wait_for_stop(&running) => break,
        };

        let stream = match accept {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };

        let admitted = match TcpPeer::new(stream) {
            Ok(peer) => output.admit(peer).await,
            Err(e) => Err(e),
        };
        match admitted {
            Ok(id) => info!(%id, receivers = output.receiver_count(), "receiver joined"),
            Err(e) => warn!("admission failed: {e}"),
        }
    }
}

/// Async helper: resolves when `running` becomes false.
async fn wait_for_stop(running: &AtomicBool) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> SenderConfig {
        let mut cfg = SenderConfig::default();
        cfg.output.bind_addr = "127.0.0.1:0".into();
        cfg.output.discovery_enabled = false;
        cfg.source.width = 64;
        cfg.source.height = 36;
        cfg
    }

    #[test]
    fn service_is_armed_on_creation() {
        let svc = SenderService::new(SenderConfig::default());
        assert!(svc.is_running());
    }

    #[test]
    fn stop_handle_works() {
        let svc = SenderService::new(SenderConfig::default());
        let handle = svc.stop_handle();
        handle.store(false, Ordering::SeqCst);
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn stop_before_run_is_honoured() {
        let svc = SenderService::new(quiet_config());
        svc.stop_handle().store(false, Ordering::SeqCst);

        let result = tokio::time::timeout(Duration::from_secs(1), svc.run())
            .await
            .expect("run ignored an earlier stop");
        assert!(result.is_ok());
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn runs_until_stopped() {
        for mode in [Mode::Session, Mode::Fanout] {
            let mut cfg = quiet_config();
            cfg.output.mode = mode;
            let svc = Arc::new(SenderService::new(cfg));

            let task = tokio::spawn({
                let svc = Arc::clone(&svc);
                async move { svc.run().await.map_err(|e| e.to_string()) }
            });
            tokio::time::sleep(Duration::from_millis(150)).await;
            svc.stop();

            let result = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
            assert!(result.is_ok(), "{mode:?}: {result:?}");
        }
    }

    #[tokio::test]
    async fn unknown_pixel_format_fails_run() {
        let mut cfg = quiet_config();
        cfg.source.pixel_format = "yuy2".into();
        let svc = SenderService::new(cfg);
        assert!(svc.run().await.is_err());
        assert!(!svc.is_running());
    }
}
