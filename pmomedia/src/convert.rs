//! Conversions entre plans PCM typés et échantillons f64.
//!
//! Le backend synthétique travaille en f64 : chaque plan d'octets est
//! décodé vers `[-1.0, 1.0]`, transformé, puis ré-encodé vers le format
//! cible. Les codecs par format entier sont générés par macro.

use crate::format::SampleFormat;
use crate::frame::Frame;

macro_rules! int_plane_codec {
    ($($ty:ty => $scale:expr),+ $(,)?) => {
        paste::paste! {
            $(
                #[inline]
                fn [<decode_ $ty _plane>](bytes: &[u8]) -> Vec<f64> {
                    bytes
                        .chunks_exact(std::mem::size_of::<$ty>())
                        .map(|c| bytemuck::pod_read_unaligned::<$ty>(c) as f64 / $scale)
                        .collect()
                }

                #[inline]
                fn [<encode_ $ty _plane>](samples: &[f64]) -> Vec<u8> {
                    let mut out = Vec::with_capacity(samples.len() * std::mem::size_of::<$ty>());
                    for &s in samples {
                        let v = (s * $scale)
                            .round()
                            .clamp(<$ty>::MIN as f64, <$ty>::MAX as f64) as $ty;
                        out.extend_from_slice(bytemuck::bytes_of(&v));
                    }
                    out
                }
            )+
        }
    };
}

int_plane_codec!(i16 => 32_768.0, i32 => 2_147_483_648.0);

#[inline]
fn decode_u8_plane(bytes: &[u8]) -> Vec<f64> {
    bytes.iter().map(|&b| (b as f64 - 128.0) / 128.0).collect()
}

#[inline]
fn encode_u8_plane(samples: &[f64]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| (s * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8)
        .collect()
}

#[inline]
fn decode_f32_plane(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(4)
        .map(|c| bytemuck::pod_read_unaligned::<f32>(c) as f64)
        .collect()
}

#[inline]
fn encode_f32_plane(samples: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for &s in samples {
        out.extend_from_slice(bytemuck::bytes_of(&(s as f32)));
    }
    out
}

#[inline]
fn decode_f64_plane(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(bytemuck::pod_read_unaligned::<f64>)
        .collect()
}

#[inline]
fn encode_f64_plane(samples: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 8);
    for &s in samples {
        out.extend_from_slice(bytemuck::bytes_of(&s));
    }
    out
}

/// Décode un plan d'octets vers des échantillons f64 normalisés.
pub fn plane_to_f64(bytes: &[u8], format: SampleFormat) -> Vec<f64> {
    match format {
        SampleFormat::U8 => decode_u8_plane(bytes),
        SampleFormat::S16 => decode_i16_plane(bytes),
        SampleFormat::S32 => decode_i32_plane(bytes),
        SampleFormat::F32 => decode_f32_plane(bytes),
        SampleFormat::F64 => decode_f64_plane(bytes),
    }
}

/// Encode des échantillons f64 vers un plan du format demandé,
/// avec écrêtage pour les formats entiers.
pub fn f64_to_plane(samples: &[f64], format: SampleFormat) -> Vec<u8> {
    match format {
        SampleFormat::U8 => encode_u8_plane(samples),
        SampleFormat::S16 => encode_i16_plane(samples),
        SampleFormat::S32 => encode_i32_plane(samples),
        SampleFormat::F32 => encode_f32_plane(samples),
        SampleFormat::F64 => encode_f64_plane(samples),
    }
}

/// Décode tous les plans d'une frame vers des canaux f64.
pub fn frame_to_f64(frame: &Frame) -> Vec<Vec<f64>> {
    frame
        .planes()
        .iter()
        .map(|p| plane_to_f64(p, frame.format().sample_format))
        .collect()
}

/// Adapte un jeu de canaux au nombre de canaux cible.
///
/// Même nombre : inchangé. Vers mono : moyenne de tous les canaux.
/// Vers plus de canaux : le dernier canal source est dupliqué.
pub fn mix_channels(channels: &[Vec<f64>], target: usize) -> Vec<Vec<f64>> {
    let source = channels.len();
    if source == target {
        return channels.to_vec();
    }
    if target == 1 {
        let len = channels.first().map_or(0, |c| c.len());
        let mut mono = vec![0.0; len];
        for chan in channels {
            for (m, &s) in mono.iter_mut().zip(chan.iter()) {
                *m += s;
            }
        }
        for m in &mut mono {
            *m /= source as f64;
        }
        return vec![mono];
    }
    (0..target)
        .map(|c| channels[c.min(source - 1)].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16_round_trip() {
        let samples = vec![0.0, 0.5, -0.5, 0.999];
        let plane = f64_to_plane(&samples, SampleFormat::S16);
        assert_eq!(plane.len(), 8);
        let back = plane_to_f64(&plane, SampleFormat::S16);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn u8_offset_encoding() {
        let plane = f64_to_plane(&[0.0], SampleFormat::U8);
        assert_eq!(plane, vec![128]);
        let back = plane_to_f64(&plane, SampleFormat::U8);
        assert_eq!(back, vec![0.0]);
    }

    #[test]
    fn integer_encoding_clips() {
        let plane = f64_to_plane(&[2.0, -2.0], SampleFormat::S16);
        let back = plane_to_f64(&plane, SampleFormat::S16);
        assert!((back[0] - 1.0).abs() < 1e-3);
        assert!((back[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn downmix_to_mono_averages() {
        let mixed = mix_channels(&[vec![1.0, 0.0], vec![0.0, 1.0]], 1);
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0], vec![0.5, 0.5]);
    }

    #[test]
    fn upmix_duplicates_last_channel() {
        let mixed = mix_channels(&[vec![0.25]], 2);
        assert_eq!(mixed, vec![vec![0.25], vec![0.25]]);
    }
}
