//! Frame : une tranche de PCM décodé, stockée plan par canal.
//!
//! Contrairement aux chunks entrelacés, chaque canal occupe son propre
//! plan d'octets. Le nombre de plans est donné par la disposition des
//! canaux du format ; chaque plan contient `frame_count` échantillons
//! du format d'échantillon déclaré.

use crate::format::AudioFormat;

/// PCM planaire décodé, immuable une fois construit.
#[derive(Clone, Debug)]
pub struct Frame {
    format: AudioFormat,
    frame_count: usize,
    planes: Vec<Vec<u8>>,
}

impl Frame {
    /// Construit une frame depuis ses plans d'octets.
    ///
    /// # Panics
    ///
    /// Si le nombre de plans ne correspond pas au nombre de canaux, ou
    /// si un plan n'a pas la taille `frame_count × bytes_per_sample`.
    pub fn from_planes(format: AudioFormat, frame_count: usize, planes: Vec<Vec<u8>>) -> Self {
        let channels = format.channel_layout.channel_count();
        assert_eq!(planes.len(), channels, "plane count must match channel count");
        let plane_len = frame_count * format.sample_format.bytes_per_sample();
        for plane in &planes {
            assert_eq!(plane.len(), plane_len, "plane length must match frame count");
        }
        Self {
            format,
            frame_count,
            planes,
        }
    }

    /// Frame de silence (plans remplis de zéros, ou de 128 pour U8).
    pub fn silence(format: AudioFormat, frame_count: usize) -> Self {
        let channels = format.channel_layout.channel_count();
        let plane_len = frame_count * format.sample_format.bytes_per_sample();
        let fill = match format.sample_format {
            crate::format::SampleFormat::U8 => 0x80,
            _ => 0,
        };
        let planes = vec![vec![fill; plane_len]; channels];
        Self {
            format,
            frame_count,
            planes,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Plan d'octets du canal `channel`.
    pub fn plane(&self, channel: usize) -> &[u8] {
        &self.planes[channel]
    }

    pub fn planes(&self) -> &[Vec<u8>] {
        &self.planes
    }

    /// Taille totale de la charge PCM en octets, tous plans confondus.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.len()).sum()
    }

    /// Durée couverte par cette frame, en secondes.
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.format.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};

    #[test]
    fn silence_has_expected_shape() {
        let fmt = AudioFormat::new(48_000, ChannelLayout::STEREO, SampleFormat::S16);
        let frame = Frame::silence(fmt, 480);
        assert_eq!(frame.frame_count(), 480);
        assert_eq!(frame.planes().len(), 2);
        assert_eq!(frame.plane(0).len(), 960);
        assert_eq!(frame.byte_len(), 1920);
        assert!((frame.duration() - 0.01).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "plane count")]
    fn plane_count_mismatch_panics() {
        let fmt = AudioFormat::new(48_000, ChannelLayout::STEREO, SampleFormat::U8);
        Frame::from_planes(fmt, 4, vec![vec![0x80; 4]]);
    }
}
