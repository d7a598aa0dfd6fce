//! Uplink Synthesizer
//!
//! Builds the Clubdeck-bound stream inside the playback callback: browser
//! microphone audio at full gain plus the music capture attenuated to 30%,
//! converted to whatever the output cable natively speaks.
//!
//! The uplink is clocked by the output device. Pulling from ring buffers
//! (rather than queues) gives the callback a deterministic pattern - a
//! short lock, two memcpys, zero-fill for whatever is missing - and the
//! rings absorb the jitter between the network, music and device clocks.

use std::sync::Arc;

use crate::adapter::FormatAdapter;
use crate::device::Endpoint;
use crate::ring::RingBuffer;
use crate::{CHANNELS, MUSIC_UPLINK_GAIN, SAMPLE_RATE};

/// Fills playback buffers from the browser and music rings.
///
/// Owned by the playback callback; `fill` runs on the audio host thread
/// and performs no allocation after warm-up.
pub struct UplinkSynthesizer {
    ring_browser: Arc<RingBuffer>,
    ring_music: Arc<RingBuffer>,
    adapter: FormatAdapter,
    output_rate: u32,
    output_channels: u16,
    mix_mode: bool,
    browser_buf: Vec<i16>,
    music_buf: Vec<i16>,
}

impl UplinkSynthesizer {
    pub fn new(
        ring_browser: Arc<RingBuffer>,
        ring_music: Arc<RingBuffer>,
        output: &Endpoint,
        mix_mode: bool,
    ) -> Self {
        Self {
            ring_browser,
            ring_music,
            adapter: FormatAdapter::new(output.sample_rate, output.channels),
            output_rate: output.sample_rate,
            output_channels: output.channels,
            mix_mode,
            browser_buf: Vec::with_capacity(8192),
            music_buf: Vec::with_capacity(8192),
        }
    }

    /// Fill one device-native output buffer.
    ///
    /// Missing ring data becomes silence; the converted result is
    /// truncated or zero-padded to exactly fit `out`.
    pub fn fill(&mut self, out: &mut [i16]) {
        let out_frames = out.len() / self.output_channels as usize;
        let needed_frames =
            (out_frames as u64 * u64::from(SAMPLE_RATE) / u64::from(self.output_rate)) as usize;
        let needed = needed_frames * CHANNELS as usize;

        self.browser_buf.resize(needed, 0);
        self.ring_browser.read_into(&mut self.browser_buf);

        if self.mix_mode {
            self.music_buf.resize(needed, 0);
            self.ring_music.read_into(&mut self.music_buf);

            for (b, &m) in self.browser_buf.iter_mut().zip(self.music_buf.iter()) {
                let sum = i32::from(*b) + (f32::from(m) * MUSIC_UPLINK_GAIN) as i32;
                *b = sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            }
        }

        let converted = self.adapter.from_canonical(&self.browser_buf);
        let n = converted.len().min(out.len());
        out[..n].copy_from_slice(&converted[..n]);
        out[n..].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Direction;
    use crate::RING_CAPACITY;

    fn endpoint(rate: u32, channels: u16) -> Endpoint {
        Endpoint {
            device_index: 0,
            sample_rate: rate,
            channels,
            direction: Direction::Playback,
            option: "cables.browser_output_device_id".to_string(),
        }
    }

    fn rings() -> (Arc<RingBuffer>, Arc<RingBuffer>) {
        (
            Arc::new(RingBuffer::new(RING_CAPACITY)),
            Arc::new(RingBuffer::new(RING_CAPACITY)),
        )
    }

    #[test]
    fn test_mixes_browser_with_attenuated_music() {
        let (browser, music) = rings();
        browser.write(&[1000; 1024]);
        music.write(&[1000; 1024]);

        let mut uplink =
            UplinkSynthesizer::new(Arc::clone(&browser), Arc::clone(&music), &endpoint(48_000, 2), true);

        let mut out = [0i16; 1024];
        uplink.fill(&mut out);

        // 1000 + 0.3 × 1000
        assert!(out.iter().all(|&s| s == 1300));
    }

    #[test]
    fn test_empty_music_ring_leaves_browser_unchanged() {
        let (browser, music) = rings();
        browser.write(&[2500; 1024]);

        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(48_000, 2), true);

        let mut out = [0i16; 1024];
        uplink.fill(&mut out);
        assert!(out.iter().all(|&s| s == 2500));
    }

    #[test]
    fn test_empty_rings_produce_silence() {
        let (browser, music) = rings();
        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(48_000, 2), true);

        let mut out = [123i16; 1024];
        uplink.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_mix_mode_off_ignores_music() {
        let (browser, music) = rings();
        browser.write(&[500; 1024]);
        music.write(&[30000; 1024]);

        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(48_000, 2), false);

        let mut out = [0i16; 1024];
        uplink.fill(&mut out);
        assert!(out.iter().all(|&s| s == 500));
    }

    #[test]
    fn test_mix_clips() {
        let (browser, music) = rings();
        browser.write(&[30000; 64]);
        music.write(&[30000; 64]);

        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(48_000, 2), true);

        let mut out = [0i16; 64];
        uplink.fill(&mut out);
        assert!(out.iter().all(|&s| s == i16::MAX));
    }

    #[test]
    fn test_partial_ring_data_zero_padded() {
        let (browser, music) = rings();
        browser.write(&[1000; 512]);

        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(48_000, 2), true);

        let mut out = [0i16; 1024];
        uplink.fill(&mut out);
        assert!(out[..512].iter().all(|&s| s == 1000));
        assert!(out[512..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_output_format_conversion_fits_exactly() {
        let (browser, music) = rings();
        browser.write(&[1000; 4096]);

        // Mono 24 kHz output cable: 240 native frames need 480 canonical
        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(24_000, 1), true);

        let mut out = [7i16; 240];
        uplink.fill(&mut out);
        assert!(out.iter().all(|&s| (s - 1000).abs() <= 1));
    }

    #[test]
    fn test_non_integral_rate_ratio_pads_tail() {
        let (browser, music) = rings();
        browser.write(&[1000; 4096]);

        // 44.1 kHz stereo: 512 native frames want 557 canonical frames,
        // which convert back to 511 - the last native frame is padding
        let mut uplink = UplinkSynthesizer::new(browser, music, &endpoint(44_100, 2), true);

        let mut out = [7i16; 1024];
        uplink.fill(&mut out);
        assert!(out[..1020].iter().all(|&s| (s - 1000).abs() <= 1));
        assert_eq!(out[1022], 0);
        assert_eq!(out[1023], 0);
    }
}
