// Integration tests for WAV file replay as capture input

use anyhow::Result;
use live_voice::audio::wrap_as_wav;
use live_voice::audio::pcm::samples_to_pcm16;
use live_voice::{CaptureConfig, CaptureDevice, Error, WavFileCapture};
use std::path::{Path, PathBuf};

fn write_fixture(dir: &Path, samples: &[i16], sample_rate: u32) -> Result<PathBuf> {
    let path = dir.join("input.wav");
    std::fs::write(&path, wrap_as_wav(&samples_to_pcm16(samples), sample_rate)?)?;
    Ok(path)
}

fn small_blocks() -> CaptureConfig {
    CaptureConfig {
        sample_rate: 16000,
        channels: 1,
        block_size: 160,
    }
}

#[tokio::test]
async fn test_file_is_replayed_in_fixed_blocks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let samples: Vec<i16> = (0..400).map(|i| i as i16 * 10).collect();
    let path = write_fixture(dir.path(), &samples, 16000)?;

    let mut capture = WavFileCapture::new(&path, small_blocks()).unpaced();
    let mut frames = capture.start().await?;

    let mut received = Vec::new();
    while let Some(frame) = frames.recv().await {
        assert_eq!(frame.samples.len(), 160);
        assert_eq!(frame.sample_rate, 16000);
        received.push(frame);
    }

    // 400 samples -> two full blocks and one padded block
    assert_eq!(received.len(), 3);
    assert_eq!(received[1].timestamp_ms, 10);
    assert!((received[0].samples[1] - 10.0 / 32768.0).abs() < 1e-9);
    assert!(received[2].samples[80..].iter().all(|&s| s == 0.0));

    capture.stop().await?;
    assert!(!capture.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_rate_mismatch_is_device_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), &[0; 100], 24000)?;

    let mut capture = WavFileCapture::new(&path, small_blocks());
    let result = capture.start().await;

    assert!(matches!(result, Err(Error::DeviceAcquisition(_))));
    assert!(!capture.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_zero_block_size_is_device_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), &[0; 100], 16000)?;

    let config = CaptureConfig {
        block_size: 0,
        ..small_blocks()
    };
    let mut capture = WavFileCapture::new(&path, config).unpaced();

    assert!(matches!(
        capture.start().await,
        Err(Error::DeviceAcquisition(_))
    ));
    assert!(!capture.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_device_error() {
    let mut capture = WavFileCapture::new("/nonexistent/input.wav", CaptureConfig::default());
    assert!(matches!(
        capture.start().await,
        Err(Error::DeviceAcquisition(_))
    ));
}

#[tokio::test]
async fn test_stop_ends_paced_replay() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), &vec![0; 16000 * 5], 16000)?;

    let mut capture = WavFileCapture::new(&path, small_blocks());
    let mut frames = capture.start().await?;
    assert!(frames.recv().await.is_some());
    assert!(capture.is_capturing());

    capture.stop().await?;
    capture.stop().await?;

    // Whatever was already queued drains, then the stream ends
    while frames.recv().await.is_some() {}
    assert!(!capture.is_capturing());
    Ok(())
}
