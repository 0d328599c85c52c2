// Integration tests for the live session lifecycle
//
// These tests run a full session against in-memory devices and a loopback
// transport, playing the remote service's side by hand.

use anyhow::{bail, Result};
use live_voice::audio::{decode_pcm16, encode_pcm16};
use live_voice::transport::from_transport_text;
use live_voice::{
    CaptureConfig, CaptureFeed, CloseReason, Error, FeedCapture, InjectedDevices, LiveSession,
    LoopbackConnector, RemoteEnd, ServerMessage, SessionConfig, SessionEvent, SessionState,
    TimelineOutput, TimelineRenderer,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const OUTPUT_RATE: u32 = 24000;

struct Harness {
    session: LiveSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    remote: RemoteEnd,
    feed: CaptureFeed,
    renderer: TimelineRenderer,
}

async fn open_session() -> Result<Harness> {
    let (capture, feed) = FeedCapture::new(CaptureConfig::default());
    let (output, renderer) = TimelineOutput::new(OUTPUT_RATE);
    let devices = InjectedDevices::new(Box::new(capture), Box::new(output));
    let (connector, mut accepted) = LoopbackConnector::new();

    let (session, mut events) =
        LiveSession::open(SessionConfig::for_model("test-model"), &devices, &connector).await?;

    let remote = accepted.recv().await.expect("connection should be accepted");
    match next_event(&mut events).await? {
        SessionEvent::Opened => {}
        other => bail!("expected Opened, got {:?}", other),
    }

    Ok(Harness {
        session,
        events,
        remote,
        feed,
        renderer,
    })
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Result<SessionEvent> {
    match timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => bail!("event stream ended"),
        Err(_) => bail!("timed out waiting for session event"),
    }
}

/// Wait until the driver has processed everything sent before `marker`
async fn sync_on(harness: &mut Harness, marker: &str) -> Result<()> {
    harness
        .remote
        .send(ServerMessage::output_transcript(marker))
        .await;
    loop {
        if let SessionEvent::OutputTranscript(segment) = next_event(&mut harness.events).await? {
            if segment.text == marker {
                return Ok(());
            }
        }
    }
}

/// `frames` samples of model audio at the output rate
fn model_audio(frames: usize) -> ServerMessage {
    ServerMessage::audio(&encode_pcm16(&vec![0.25; frames]))
}

#[tokio::test]
async fn test_open_sends_setup_and_reaches_open() -> Result<()> {
    let harness = open_session().await?;

    assert_eq!(harness.session.state(), SessionState::Open);
    assert_eq!(harness.remote.setup.model, "test-model");
    assert!(harness.remote.setup.input_audio_transcription);
    assert!(harness.remote.setup.output_audio_transcription);
    assert!(harness.feed.is_capturing());

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_captured_silence_round_trips() -> Result<()> {
    let mut harness = open_session().await?;

    // Three 4096-sample callbacks of near-silence at 16 kHz
    for _ in 0..3 {
        assert_eq!(harness.feed.push(&[0.00001; 4096]), 1);
    }

    for _ in 0..3 {
        let message = timeout(Duration::from_secs(2), harness.remote.outbound.recv())
            .await?
            .expect("capture chunk");
        assert_eq!(message.media.mime_type, "audio/pcm;rate=16000");
        let rate = message.media.sample_rate().expect("declared rate");

        let buffer = decode_pcm16(&from_transport_text(&message.media.data)?, rate, 1)?;
        assert_eq!(buffer.sample_rate, 16000);
        assert_eq!(buffer.frames(), 4096);
        assert!(buffer.channel(0).unwrap().iter().all(|s| s.abs() < 1e-3));
    }

    assert_eq!(harness.session.stats().chunks_sent, 3);
    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_inbound_chunks_play_gapless_in_order() -> Result<()> {
    let mut harness = open_session().await?;

    // 100ms chunks with the device advancing less than a chunk in between
    for advance in [0, 700, 1200] {
        harness.renderer.advance(advance);
        harness.remote.send(model_audio(2400)).await;
        sync_on(&mut harness, "scheduled").await?;
    }

    assert_eq!(harness.renderer.scheduled_starts(), vec![0, 2400, 4800]);
    assert_eq!(harness.session.stats().chunks_played, 3);

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_arbitrary_arrival_never_overlaps() -> Result<()> {
    let mut harness = open_session().await?;
    let mut starts = Vec::new();

    for advance in [0, 5000, 100, 0, 9000, 2400] {
        harness.renderer.advance(advance);
        harness.remote.send(model_audio(2400)).await;
        sync_on(&mut harness, "tick").await?;
        starts.extend(harness.renderer.scheduled_starts().last().copied());
    }

    for pair in starts.windows(2) {
        assert!(pair[1] >= pair[0] + 2400, "overlap in {:?}", starts);
    }

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_interruption_flushes_queued_audio() -> Result<()> {
    let mut harness = open_session().await?;

    for _ in 0..5 {
        harness.remote.send(model_audio(2400)).await;
    }
    sync_on(&mut harness, "queued").await?;
    harness.renderer.advance(3000);

    harness.remote.send(ServerMessage::interrupted()).await;
    loop {
        if let SessionEvent::Interrupted = next_event(&mut harness.events).await? {
            break;
        }
    }

    assert_eq!(harness.renderer.active_voices(), 0);
    assert!(harness.renderer.advance(4800).iter().all(|&s| s == 0.0));

    // The next reply starts at the device clock, not the stale 0.5s mark
    let now = harness.renderer.position();
    harness.remote.send(model_audio(2400)).await;
    sync_on(&mut harness, "resumed").await?;

    assert_eq!(harness.renderer.scheduled_starts(), vec![now]);
    assert_eq!(harness.session.stats().interruptions, 1);

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_transcripts_are_forwarded() -> Result<()> {
    let mut harness = open_session().await?;

    harness
        .remote
        .send(ServerMessage::input_transcript("quiero comprar"))
        .await;
    harness
        .remote
        .send(ServerMessage::output_transcript("claro"))
        .await;
    harness.remote.send(ServerMessage::turn_complete()).await;

    match next_event(&mut harness.events).await? {
        SessionEvent::InputTranscript(segment) => assert_eq!(segment.text, "quiero comprar"),
        other => bail!("unexpected event {:?}", other),
    }
    match next_event(&mut harness.events).await? {
        SessionEvent::OutputTranscript(segment) => assert_eq!(segment.text, "claro"),
        other => bail!("unexpected event {:?}", other),
    }
    assert!(matches!(
        next_event(&mut harness.events).await?,
        SessionEvent::TurnComplete
    ));
    assert_eq!(harness.session.stats().transcript_segments_count, 2);

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_bad_inbound_chunk_is_skipped() -> Result<()> {
    let mut harness = open_session().await?;

    harness
        .remote
        .send(ServerMessage {
            audio_data: Some("AAA".to_string()),
            ..ServerMessage::default()
        })
        .await;
    harness
        .remote
        .send(ServerMessage::audio(&[0u8; 3]))
        .await;
    harness.remote.send(model_audio(2400)).await;
    sync_on(&mut harness, "after").await?;

    let stats = harness.session.stats();
    assert_eq!(stats.chunks_rejected, 2);
    assert_eq!(stats.chunks_played, 1);
    assert_eq!(harness.session.state(), SessionState::Open);
    assert_eq!(harness.renderer.scheduled_starts(), vec![0]);

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent_and_silences_playback() -> Result<()> {
    let mut harness = open_session().await?;

    for _ in 0..3 {
        harness.remote.send(model_audio(2400)).await;
    }
    sync_on(&mut harness, "queued").await?;

    harness.session.close().await?;

    // Nothing plays after close returns
    assert!(harness.renderer.is_released());
    assert!(harness.renderer.advance(7200).iter().all(|&s| s == 0.0));
    assert!(!harness.feed.is_capturing());
    assert_eq!(harness.session.state(), SessionState::Closed);

    harness.session.close().await?;
    assert_eq!(harness.session.state(), SessionState::Closed);

    assert!(matches!(
        next_event(&mut harness.events).await?,
        SessionEvent::Closed(CloseReason::User)
    ));

    // The transport sees the outbound side end
    assert!(timeout(Duration::from_secs(2), harness.remote.outbound.recv())
        .await?
        .is_none());

    let stats = harness.session.join().await?;
    assert_eq!(stats.state, SessionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_duration_stops_growing_after_close() -> Result<()> {
    let harness = open_session().await?;
    assert!(harness.session.stats().ended_at.is_none());

    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.session.close().await?;

    let at_close = harness.session.stats();
    assert!(at_close.ended_at.is_some());
    assert!(at_close.duration_secs >= 0.02);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = harness.session.stats();
    assert_eq!(later.ended_at, at_close.ended_at);
    assert_eq!(later.duration_secs, at_close.duration_secs);
    Ok(())
}

#[tokio::test]
async fn test_remote_close_ends_session() -> Result<()> {
    let mut harness = open_session().await?;

    harness.remote.close(Some("bye")).await;

    match next_event(&mut harness.events).await? {
        SessionEvent::Closed(CloseReason::Remote(reason)) => assert_eq!(reason.as_deref(), Some("bye")),
        other => bail!("unexpected event {:?}", other),
    }
    harness.session.join().await?;
    assert_eq!(harness.session.state(), SessionState::Closed);
    assert!(!harness.feed.is_capturing());

    // Closing after the remote did is still fine
    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_transport_error_is_terminal() -> Result<()> {
    let mut harness = open_session().await?;

    harness.remote.send(model_audio(2400)).await;
    harness.remote.fail("socket reset").await;

    let outcome = harness.session.join().await;
    assert!(matches!(outcome, Err(Error::Session(ref msg)) if msg == "socket reset"));

    assert_eq!(harness.session.state(), SessionState::Closed);
    assert!(harness.renderer.is_released());
    assert!(!harness.feed.is_capturing());

    match next_event(&mut harness.events).await? {
        SessionEvent::Error(message) => assert_eq!(message, "socket reset"),
        other => bail!("expected Error, got {:?}", other),
    }
    match next_event(&mut harness.events).await? {
        SessionEvent::Closed(reason) => {
            assert_eq!(reason, CloseReason::Error("socket reset".to_string()))
        }
        other => bail!("expected Closed, got {:?}", other),
    }

    harness.session.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_capture_after_close_is_not_sent() -> Result<()> {
    let mut harness = open_session().await?;
    harness.session.close().await?;

    assert_eq!(harness.feed.push(&[0.0; 4096]), 0);
    assert!(timeout(Duration::from_secs(2), harness.remote.outbound.recv())
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn test_missing_microphone_fails_before_connecting() -> Result<()> {
    let (output, renderer) = TimelineOutput::new(OUTPUT_RATE);
    let devices = InjectedDevices::without_input(Box::new(output));
    let (connector, mut accepted) = LoopbackConnector::new();

    let result = LiveSession::open(SessionConfig::default(), &devices, &connector).await;

    assert!(matches!(result, Err(Error::DeviceAcquisition(_))));
    assert!(accepted.try_recv().is_err());
    assert!(!renderer.is_released());
    Ok(())
}

#[tokio::test]
async fn test_output_rate_mismatch_is_device_error() -> Result<()> {
    let (capture, feed) = FeedCapture::new(CaptureConfig::default());
    let (output, renderer) = TimelineOutput::new(16000);
    let devices = InjectedDevices::new(Box::new(capture), Box::new(output));
    let (connector, mut accepted) = LoopbackConnector::new();

    let result = LiveSession::open(SessionConfig::default(), &devices, &connector).await;

    assert!(matches!(result, Err(Error::DeviceAcquisition(_))));
    assert!(!feed.is_capturing());
    assert!(renderer.is_released());
    assert!(accepted.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_releases_devices() -> Result<()> {
    let (capture, feed) = FeedCapture::new(CaptureConfig::default());
    let (output, renderer) = TimelineOutput::new(OUTPUT_RATE);
    let devices = InjectedDevices::new(Box::new(capture), Box::new(output));

    let result =
        LiveSession::open(SessionConfig::default(), &devices, &LoopbackConnector::refusing()).await;

    assert!(matches!(result, Err(Error::Session(_))));
    assert!(renderer.is_released());
    assert!(!feed.is_capturing());
    Ok(())
}
