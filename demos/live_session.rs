use anyhow::Result;
use live_voice::audio::encode_pcm16;
use live_voice::transport::from_transport_text;
use live_voice::{
    Config, FeedCapture, InjectedDevices, LiveSession, LoopbackConnector, RemoteEnd,
    ServerMessage, SessionEvent, SpeechClip, TimelineOutput,
};
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{info, warn};

/// Samples of a sine tone at `freq` Hz
fn tone(freq: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
    let frames = (seconds * sample_rate as f32) as usize;
    (0..frames)
        .map(|i| (i as f32 * freq * std::f32::consts::TAU / sample_rate as f32).sin() * 0.3)
        .collect()
}

/// Stand-in for the remote model: transcribe every few chunks and answer in
/// 100ms pieces, then barge in once to show the flush
async fn fake_model(mut remote: RemoteEnd, output_rate: u32) {
    info!("🤖 Remote end connected (model {})", remote.setup.model);

    let reply = tone(440.0, 0.1, output_rate);
    let mut received = 0usize;

    while let Some(message) = remote.outbound.recv().await {
        received += 1;
        let bytes = from_transport_text(&message.media.data).map(|b| b.len()).unwrap_or(0);
        match message.media.sample_rate() {
            Some(rate) => info!("📥 Chunk {} from session ({} bytes at {}Hz)", received, bytes, rate),
            None => warn!("📥 Chunk {} has no PCM rate ({})", received, message.media.mime_type),
        }

        if received % 4 == 0 {
            remote
                .send(ServerMessage::input_transcript(format!("user said chunk {}", received)))
                .await;
            for _ in 0..5 {
                remote.send(ServerMessage::audio(&encode_pcm16(&reply))).await;
            }
            remote.send(ServerMessage::output_transcript("here is a tone")).await;
            remote.send(ServerMessage::turn_complete()).await;
        }

        if received == 10 {
            remote.send(ServerMessage::interrupted()).await;
        }
    }

    info!("🤖 Session ended the channel after {} chunks", received);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::load("config/live-voice")?;
    let session_config = cfg.session_config();
    let output_rate = session_config.output_sample_rate;

    info!(
        "🎙️  {} starting loopback live session {}",
        cfg.service.name, session_config.session_id
    );

    let (capture, feed) = FeedCapture::new(cfg.capture_config());
    let (output, renderer) = TimelineOutput::new(output_rate);
    let devices = InjectedDevices::new(Box::new(capture), Box::new(output));
    let (connector, mut accepted) = LoopbackConnector::new();

    let (session, mut events) = LiveSession::open(session_config, &devices, &connector).await?;

    if let Some(remote) = accepted.recv().await {
        tokio::spawn(fake_model(remote, output_rate));
    }

    // Host output callback: pull 20ms of audio every 20ms
    let render = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(20));
        let mut block = vec![0.0f32; (output_rate / 50) as usize];
        let mut audible = 0usize;
        while !renderer.is_released() {
            ticker.tick().await;
            renderer.render(&mut block);
            if block.iter().any(|&s| s != 0.0) {
                audible += 1;
            }
        }
        info!("🔈 Rendered {} audible blocks", audible);
    });

    // Host input callback: a 220Hz hum in 1024-sample pieces
    let input_rate = cfg.audio.input_sample_rate;
    let microphone = tokio::spawn(async move {
        let hum = tone(220.0, 4.0, input_rate);
        let mut ticker = interval(Duration::from_millis(1024 * 1000 / u64::from(input_rate)));
        for piece in hum.chunks(1024) {
            ticker.tick().await;
            feed.push(piece);
        }
        feed.dropped_blocks()
    });

    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::InputTranscript(segment) => info!("🗣️  You: {}", segment.text),
                SessionEvent::OutputTranscript(segment) => info!("🤖 Model: {}", segment.text),
                SessionEvent::Interrupted => info!("✋ Playback interrupted"),
                SessionEvent::Closed(reason) => {
                    info!("⏹️  Session closed: {:?}", reason);
                    break;
                }
                other => info!("{:?}", other),
            }
        }
    });

    let dropped = microphone.await?;
    if dropped > 0 {
        warn!("{} capture blocks dropped", dropped);
    }
    sleep(Duration::from_secs(1)).await;

    session.close().await?;
    let stats = session.join().await?;
    render.await?;
    listener.await?;

    info!(
        "📊 Sent {} chunks, played {}, dropped {}, {} interruptions, {} transcript segments",
        stats.chunks_sent,
        stats.chunks_played,
        stats.chunks_dropped,
        stats.interruptions,
        stats.transcript_segments_count
    );

    let clip = SpeechClip::new(encode_pcm16(&tone(440.0, 1.0, output_rate)), output_rate)?;
    let path = clip.save(&cfg.audio.clips_path)?;
    info!("💾 Saved sample clip to {}", path.display());

    info!("🏁 Live session demo complete!");
    Ok(())
}
