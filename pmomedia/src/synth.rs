//! Implémentation synthétique du contrat média, version mock pour
//! tests et démos.
//!
//! [`SynthFile`] joue une sinusoïde ou du silence entièrement en
//! mémoire : les « paquets » transportent du PCM déjà prêt et le
//! décodeur associé les reconstitue à l'identique. [`SynthBackend`]
//! matérialise les graphes demandés avec une conversion naïve
//! (rééchantillonnage au plus proche voisin, mixage de canaux par
//! moyenne/duplication). La qualité n'a aucune importance ici ; seule
//! la fidélité au contrat compte.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::convert::{f64_to_plane, frame_to_f64, mix_channels};
use crate::error::{MediaError, Result};
use crate::file::{AudioDecoder, MediaFile, Packet, ReadStatus};
use crate::format::{AudioFormat, TimeBase};
use crate::frame::Frame;
use crate::graph::{FilterBackend, FilterGraph, GraphPull, GraphSpec, TailSpec};

/// Signal généré par un [`SynthFile`].
#[derive(Clone, Copy, Debug)]
pub enum Waveform {
    Silence,
    Sine { freq: f64, amplitude: f64 },
}

struct FileState {
    cursor: u64,
    audio_packets: u64,
    next_is_metadata: bool,
}

/// Source audio synthétique en mémoire.
///
/// La base de temps vaut une frame par tick, ce qui rend les seeks
/// exacts à l'échantillon près.
pub struct SynthFile {
    format: AudioFormat,
    total_frames: u64,
    packet_frames: u64,
    waveform: Waveform,
    with_pts: bool,
    metadata_every: Option<u64>,
    corrupt_packet: Option<u64>,
    state: Mutex<FileState>,
    paused: AtomicBool,
    abort: AtomicBool,
}

impl SynthFile {
    /// Sinusoïde de `seconds` secondes à `freq` Hz, amplitude 0.8.
    pub fn sine(seconds: f64, freq: f64, format: AudioFormat) -> Self {
        Self::new(
            seconds,
            Waveform::Sine {
                freq,
                amplitude: 0.8,
            },
            format,
        )
    }

    /// Silence de `seconds` secondes.
    pub fn silence(seconds: f64, format: AudioFormat) -> Self {
        Self::new(seconds, Waveform::Silence, format)
    }

    pub fn new(seconds: f64, waveform: Waveform, format: AudioFormat) -> Self {
        Self {
            format,
            total_frames: (seconds * format.sample_rate as f64).round() as u64,
            packet_frames: 1024,
            waveform,
            with_pts: true,
            metadata_every: None,
            corrupt_packet: None,
            state: Mutex::new(FileState {
                cursor: 0,
                audio_packets: 0,
                next_is_metadata: false,
            }),
            paused: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        }
    }

    /// Taille des paquets en frames (1024 par défaut).
    pub fn with_packet_frames(mut self, frames: u64) -> Self {
        self.packet_frames = frames.max(1);
        self
    }

    /// Supprime les timestamps de présentation, forçant le moteur à
    /// estimer l'horloge depuis les octets produits.
    pub fn without_pts(mut self) -> Self {
        self.with_pts = false;
        self
    }

    /// Intercale un paquet non-audio tous les `every` paquets audio.
    pub fn with_metadata_packets(mut self, every: u64) -> Self {
        self.metadata_every = Some(every.max(1));
        self
    }

    /// Corrompt le paquet audio d'index `index` (payload tronqué), le
    /// décodeur le rejettera.
    pub fn with_corrupt_packet(mut self, index: u64) -> Self {
        self.corrupt_packet = Some(index);
        self
    }

    /// Demande l'abandon : le moteur traitera ce fichier comme terminé.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn render(&self, start: u64, count: u64) -> Vec<u8> {
        let rate = self.format.sample_rate as f64;
        let samples: Vec<f64> = (start..start + count)
            .map(|i| match self.waveform {
                Waveform::Silence => 0.0,
                Waveform::Sine { freq, amplitude } => {
                    amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin()
                }
            })
            .collect();
        let plane = f64_to_plane(&samples, self.format.sample_format);
        let channels = self.format.channel_layout.channel_count();
        let mut data = Vec::with_capacity(plane.len() * channels);
        for _ in 0..channels {
            data.extend_from_slice(&plane);
        }
        data
    }
}

impl MediaFile for SynthFile {
    fn audio_format(&self) -> AudioFormat {
        self.format
    }

    fn time_base(&self) -> TimeBase {
        TimeBase::new(1, self.format.sample_rate)
    }

    fn seek(&self, ts: i64) -> Result<()> {
        if ts < 0 {
            return Err(MediaError::SeekFailed(format!("negative timestamp {}", ts)));
        }
        let mut state = self.state.lock().unwrap();
        state.cursor = (ts as u64).min(self.total_frames);
        Ok(())
    }

    fn read_packet(&self) -> Result<ReadStatus> {
        let mut state = self.state.lock().unwrap();

        if state.next_is_metadata {
            state.next_is_metadata = false;
            return Ok(ReadStatus::Packet(Packet {
                data: Vec::new(),
                pts: None,
                audio: false,
            }));
        }

        if state.cursor >= self.total_frames {
            return Ok(ReadStatus::Eof);
        }

        let start = state.cursor;
        let count = self.packet_frames.min(self.total_frames - start);
        let mut data = self.render(start, count);

        if self.corrupt_packet == Some(state.audio_packets) {
            data.pop();
        }

        state.cursor += count;
        state.audio_packets += 1;
        if let Some(every) = self.metadata_every {
            if state.audio_packets % every == 0 {
                state.next_is_metadata = true;
            }
        }

        Ok(ReadStatus::Packet(Packet {
            data,
            pts: self.with_pts.then_some(start as i64),
            audio: true,
        }))
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn decoder(&self) -> Result<Box<dyn AudioDecoder>> {
        Ok(Box::new(SynthDecoder {
            format: self.format,
        }))
    }
}

/// Décodeur identité : les paquets synthétiques contiennent déjà le PCM.
struct SynthDecoder {
    format: AudioFormat,
}

impl AudioDecoder for SynthDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Option<Frame>> {
        if !packet.audio {
            return Ok(None);
        }
        let channels = self.format.channel_layout.channel_count();
        let bps = self.format.sample_format.bytes_per_sample();
        if channels == 0 || packet.data.len() % (channels * bps) != 0 {
            return Err(MediaError::DecodeFailed(format!(
                "malformed payload of {} bytes",
                packet.data.len()
            )));
        }
        let plane_len = packet.data.len() / channels;
        let frame_count = plane_len / bps;
        let planes = (0..channels)
            .map(|c| packet.data[c * plane_len..(c + 1) * plane_len].to_vec())
            .collect();
        Ok(Some(Frame::from_planes(self.format, frame_count, planes)))
    }

    fn drain(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }

    fn flush(&mut self) {}
}

// ═══════════════════════════════════════════════════════════════════════════
// SynthBackend - graphes de filtres naïfs
// ═══════════════════════════════════════════════════════════════════════════

struct TailState {
    spec: TailSpec,
    out_format: AudioFormat,
    pending: Vec<std::collections::VecDeque<f64>>,
    frames_in: u64,
    frames_out: u64,
}

impl TailState {
    fn available(&self) -> usize {
        self.pending.first().map_or(0, |c| c.len())
    }

    fn emit(&mut self, count: usize) -> Frame {
        let channels: Vec<Vec<f64>> = self
            .pending
            .iter_mut()
            .map(|c| c.drain(..count).collect())
            .collect();
        let planes = channels
            .iter()
            .map(|c| f64_to_plane(c, self.out_format.sample_format))
            .collect();
        Frame::from_planes(self.out_format, count, planes)
    }

    /// Convertit un bloc de canaux f64 au format d'entrée et l'ajoute
    /// au tampon de la queue (mixage + rééchantillonnage naïf).
    fn feed(&mut self, channels: &[Vec<f64>], in_rate: u32) {
        let mixed = mix_channels(channels, self.out_format.channel_layout.channel_count());
        let block = mixed.first().map_or(0, |c| c.len()) as u64;
        let out_rate = self.out_format.sample_rate as u64;
        let in_rate = in_rate as u64;

        let total_in = self.frames_in + block;
        let target_out = total_in * out_rate / in_rate;

        for j in self.frames_out..target_out {
            let src_global = j * in_rate / out_rate;
            let src_local = src_global
                .saturating_sub(self.frames_in)
                .min(block.saturating_sub(1)) as usize;
            for (pending, chan) in self.pending.iter_mut().zip(mixed.iter()) {
                pending.push_back(chan[src_local]);
            }
        }

        self.frames_in = total_in;
        self.frames_out = target_out;
    }
}

struct SynthGraph {
    input: AudioFormat,
    volume: Option<f64>,
    tails: Vec<TailState>,
    finished: bool,
}

impl FilterGraph for SynthGraph {
    fn push(&mut self, frame: Frame) -> Result<()> {
        if frame.format() != self.input {
            return Err(MediaError::GraphFeed(format!(
                "expected {} got {}",
                self.input,
                frame.format()
            )));
        }

        let mut channels = frame_to_f64(&frame);
        if let Some(volume) = self.volume {
            for chan in &mut channels {
                for s in chan.iter_mut() {
                    *s *= volume;
                }
            }
        }

        for tail in &mut self.tails {
            tail.feed(&channels, self.input.sample_rate);
        }
        Ok(())
    }

    fn pull(&mut self, tail: usize) -> Result<GraphPull> {
        let finished = self.finished;
        let tail = &mut self.tails[tail];
        let available = tail.available();
        let fixed = tail.spec.fixed_frame_count;

        let take = if fixed > 0 {
            if available >= fixed {
                fixed
            } else if finished && available > 0 {
                available
            } else if finished {
                return Ok(GraphPull::Eof);
            } else {
                return Ok(GraphPull::NotReady);
            }
        } else if available > 0 {
            available
        } else if finished {
            return Ok(GraphPull::Eof);
        } else {
            return Ok(GraphPull::NotReady);
        };

        Ok(GraphPull::Frame(tail.emit(take)))
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// Backend de graphes naïf, version mock pour tests.
#[derive(Default)]
pub struct SynthBackend;

impl SynthBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FilterBackend for SynthBackend {
    fn build(&self, spec: &GraphSpec) -> Result<Box<dyn FilterGraph>> {
        if spec.tails.is_empty() {
            return Err(MediaError::GraphBuild("no output tails".into()));
        }
        tracing::debug!(
            "SynthBackend: building graph, {} tails, input {}",
            spec.tails.len(),
            spec.input
        );
        let tails = spec
            .tails
            .iter()
            .map(|t| {
                let out_format = t.convert.unwrap_or(spec.input);
                TailState {
                    spec: t.clone(),
                    out_format,
                    pending: vec![
                        std::collections::VecDeque::new();
                        out_format.channel_layout.channel_count()
                    ],
                    frames_in: 0,
                    frames_out: 0,
                }
            })
            .collect();
        Ok(Box::new(SynthGraph {
            input: spec.input,
            volume: spec.volume,
            tails,
            finished: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::plane_to_f64;
    use crate::format::{ChannelLayout, SampleFormat};

    fn fmt(rate: u32, layout: ChannelLayout, sample: SampleFormat) -> AudioFormat {
        AudioFormat::new(rate, layout, sample)
    }

    fn read_all(file: &SynthFile) -> u64 {
        let mut decoder = file.decoder().unwrap();
        let mut frames = 0;
        loop {
            match file.read_packet().unwrap() {
                ReadStatus::Eof => break,
                ReadStatus::Packet(p) => {
                    if let Some(frame) = decoder.decode(&p).unwrap() {
                        frames += frame.frame_count() as u64;
                    }
                }
            }
        }
        frames
    }

    #[test]
    fn sine_produces_expected_frame_count() {
        let file = SynthFile::sine(0.5, 440.0, fmt(44_100, ChannelLayout::STEREO, SampleFormat::S16));
        assert_eq!(read_all(&file), 22_050);
    }

    #[test]
    fn seek_moves_cursor() {
        let file = SynthFile::sine(1.0, 440.0, fmt(48_000, ChannelLayout::MONO, SampleFormat::F32));
        file.seek(24_000).unwrap();
        assert_eq!(read_all(&file), 24_000);
    }

    #[test]
    fn metadata_packets_are_not_audio() {
        let file = SynthFile::silence(0.1, fmt(48_000, ChannelLayout::MONO, SampleFormat::S16))
            .with_packet_frames(480)
            .with_metadata_packets(2);
        let mut audio = 0;
        let mut other = 0;
        loop {
            match file.read_packet().unwrap() {
                ReadStatus::Eof => break,
                ReadStatus::Packet(p) if p.audio => audio += 1,
                ReadStatus::Packet(_) => other += 1,
            }
        }
        assert_eq!(audio, 10);
        assert_eq!(other, 5);
    }

    #[test]
    fn corrupt_packet_fails_decode() {
        let file = SynthFile::silence(0.1, fmt(48_000, ChannelLayout::STEREO, SampleFormat::S16))
            .with_packet_frames(480)
            .with_corrupt_packet(1);
        let mut decoder = file.decoder().unwrap();

        let first = match file.read_packet().unwrap() {
            ReadStatus::Packet(p) => p,
            ReadStatus::Eof => panic!("expected packet"),
        };
        assert!(decoder.decode(&first).unwrap().is_some());

        let second = match file.read_packet().unwrap() {
            ReadStatus::Packet(p) => p,
            ReadStatus::Eof => panic!("expected packet"),
        };
        assert!(decoder.decode(&second).is_err());
    }

    #[test]
    fn graph_converts_format_and_rate() {
        let input = fmt(44_100, ChannelLayout::STEREO, SampleFormat::S16);
        let target = fmt(22_050, ChannelLayout::MONO, SampleFormat::F32);
        let backend = SynthBackend::new();
        let mut graph = backend
            .build(&GraphSpec {
                input,
                time_base: TimeBase::new(1, 44_100),
                volume: None,
                tails: vec![TailSpec {
                    convert: Some(target),
                    fixed_frame_count: 0,
                }],
            })
            .unwrap();

        graph.push(Frame::silence(input, 4410)).unwrap();
        match graph.pull(0).unwrap() {
            GraphPull::Frame(f) => {
                assert_eq!(f.format(), target);
                assert_eq!(f.frame_count(), 2205);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn fixed_tail_chunks_and_flushes_partial() {
        let input = fmt(48_000, ChannelLayout::MONO, SampleFormat::F64);
        let backend = SynthBackend::new();
        let mut graph = backend
            .build(&GraphSpec {
                input,
                time_base: TimeBase::new(1, 48_000),
                volume: None,
                tails: vec![TailSpec {
                    convert: None,
                    fixed_frame_count: 1000,
                }],
            })
            .unwrap();

        graph.push(Frame::silence(input, 2500)).unwrap();
        for _ in 0..2 {
            match graph.pull(0).unwrap() {
                GraphPull::Frame(f) => assert_eq!(f.frame_count(), 1000),
                other => panic!("expected full frame, got {:?}", other),
            }
        }
        assert!(matches!(graph.pull(0).unwrap(), GraphPull::NotReady));

        graph.finish();
        match graph.pull(0).unwrap() {
            GraphPull::Frame(f) => assert_eq!(f.frame_count(), 500),
            other => panic!("expected partial frame, got {:?}", other),
        }
        assert!(matches!(graph.pull(0).unwrap(), GraphPull::Eof));
    }

    #[test]
    fn volume_scales_samples() {
        let input = fmt(8_000, ChannelLayout::MONO, SampleFormat::F64);
        let backend = SynthBackend::new();
        let mut graph = backend
            .build(&GraphSpec {
                input,
                time_base: TimeBase::new(1, 8_000),
                volume: Some(0.5),
                tails: vec![TailSpec {
                    convert: None,
                    fixed_frame_count: 0,
                }],
            })
            .unwrap();

        let plane = crate::convert::f64_to_plane(&[0.8, -0.8], SampleFormat::F64);
        graph
            .push(Frame::from_planes(input, 2, vec![plane]))
            .unwrap();
        match graph.pull(0).unwrap() {
            GraphPull::Frame(f) => {
                let back = plane_to_f64(f.plane(0), SampleFormat::F64);
                assert!((back[0] - 0.4).abs() < 1e-9);
                assert!((back[1] + 0.4).abs() < 1e-9);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }
}
