//! Descripteurs de format audio : format d'échantillon, disposition des
//! canaux, format complet et base de temps.
//!
//! Ces types sont partagés entre le contrat de framework média et le
//! moteur de lecture. Un `AudioFormat` identifie entièrement la forme
//! d'un flux PCM ; deux flux dont les `AudioFormat` sont égaux sont
//! interchangeables octet pour octet.

use std::fmt;

/// Format d'un échantillon individuel (stockage planaire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Entier non signé 8 bits, offset 128
    U8,
    /// Entier signé 16 bits, little-endian natif
    S16,
    /// Entier signé 32 bits
    S32,
    /// Flottant simple précision
    F32,
    /// Flottant double précision
    F64,
}

impl SampleFormat {
    /// Taille d'un échantillon en octets.
    #[inline(always)]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 => 4,
            SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
            SampleFormat::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}

/// Disposition des canaux, encodée comme masque de bits.
///
/// Seul le *nombre* de bits levés compte pour la taille des trames ;
/// le masque lui-même distingue par exemple stéréo de deux canaux
/// arbitraires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelLayout(pub u64);

impl ChannelLayout {
    pub const MONO: ChannelLayout = ChannelLayout(0x1);
    pub const STEREO: ChannelLayout = ChannelLayout(0x3);
    pub const QUAD: ChannelLayout = ChannelLayout(0x33);
    pub const SURROUND_5_1: ChannelLayout = ChannelLayout(0x3F);

    /// Nombre de canaux dans cette disposition.
    #[inline(always)]
    pub const fn channel_count(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChannelLayout::MONO => write!(f, "mono"),
            ChannelLayout::STEREO => write!(f, "stereo"),
            ChannelLayout::QUAD => write!(f, "quad"),
            ChannelLayout::SURROUND_5_1 => write!(f, "5.1"),
            ChannelLayout(mask) => write!(f, "layout(0x{:x})", mask),
        }
    }
}

/// Format complet d'un flux PCM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channel_layout: ChannelLayout, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channel_layout,
            sample_format,
        }
    }

    /// Taille d'une trame (un échantillon par canal) en octets.
    #[inline(always)]
    pub fn bytes_per_frame(&self) -> usize {
        self.channel_layout.channel_count() * self.sample_format.bytes_per_sample()
    }

    /// Débit en octets par seconde de temps réel.
    #[inline(always)]
    pub fn bytes_per_sec(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {} {}",
            self.sample_rate, self.channel_layout, self.sample_format
        )
    }
}

/// Base de temps rationnelle : un tick vaut `num / den` secondes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Convertit un timestamp en secondes.
    #[inline(always)]
    pub fn to_seconds(&self, ts: i64) -> f64 {
        ts as f64 * self.num as f64 / self.den as f64
    }

    /// Convertit des secondes en timestamp (arrondi au tick le plus proche).
    #[inline(always)]
    pub fn from_seconds(&self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_arithmetic() {
        let fmt = AudioFormat::new(44_100, ChannelLayout::STEREO, SampleFormat::S16);
        assert_eq!(fmt.bytes_per_frame(), 4);
        assert_eq!(fmt.bytes_per_sec(), 176_400);
    }

    #[test]
    fn layout_counts() {
        assert_eq!(ChannelLayout::MONO.channel_count(), 1);
        assert_eq!(ChannelLayout::STEREO.channel_count(), 2);
        assert_eq!(ChannelLayout::SURROUND_5_1.channel_count(), 6);
    }

    #[test]
    fn time_base_round_trip() {
        let tb = TimeBase::new(1, 44_100);
        let ts = tb.from_seconds(0.5);
        assert_eq!(ts, 22_050);
        assert!((tb.to_seconds(ts) - 0.5).abs() < 1e-9);
    }
}
