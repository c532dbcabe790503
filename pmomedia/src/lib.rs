#![doc = r#"
PMOMedia - Contrat du framework média externe

Cette crate définit la frontière entre le moteur de lecture
(`pmoplayback`) et le framework média qui fait le vrai travail de
démultiplexage, décodage et filtrage. Le moteur ne voit que des traits :

- [`MediaFile`] / [`AudioDecoder`] : lecture de paquets et décodage
  au niveau frame ;
- [`FilterBackend`] / [`FilterGraph`] : graphes
  `source → volume → split → N × (conversion → sortie)`, décrits par un
  [`GraphSpec`] et matérialisés par le backend.

Les types valeurs ([`AudioFormat`], [`Frame`], [`Packet`], …) sont
partagés par les deux côtés de la frontière.

# Implémentation synthétique

[`SynthFile`] et [`SynthBackend`] fournissent un collaborateur complet
entièrement en mémoire (sinusoïde ou silence, conversion naïve), utilisé
par les tests d'intégration du moteur et utilisable dans des démos :

```
use pmomedia::{AudioFormat, ChannelLayout, MediaFile, ReadStatus, SampleFormat, SynthFile};

let format = AudioFormat::new(44_100, ChannelLayout::STEREO, SampleFormat::S16);
let file = SynthFile::sine(0.1, 440.0, format);

match file.read_packet().unwrap() {
    ReadStatus::Packet(p) => assert!(p.audio),
    ReadStatus::Eof => unreachable!(),
}
```
"#]

mod error;
mod format;
mod frame;

pub mod convert;
pub mod file;
pub mod graph;
pub mod synth;

pub use error::{MediaError, Result};
pub use file::{AudioDecoder, MediaFile, Packet, ReadStatus};
pub use format::{AudioFormat, ChannelLayout, SampleFormat, TimeBase};
pub use frame::Frame;
pub use graph::{FilterBackend, FilterGraph, GraphPull, GraphSpec, TailSpec};
pub use synth::{SynthBackend, SynthFile, Waveform};
