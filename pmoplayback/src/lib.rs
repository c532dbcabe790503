#![doc = r#"
PMOPlayback - Moteur de décodage de playlist multi-sinks

Cette crate transforme une liste d'items audio en flux continus de
buffers PCM référencés, servis à un nombre quelconque de consommateurs
hétérogènes. Chaque [`Sink`] demande son propre format de sortie ; les
sinks au format équivalent partagent un groupe, chaque format distinct
n'est rendu qu'une seule fois et les buffers sont partagés par `Arc`.

# Architecture

```text
item → décodeur → frame source → graphe (source → volume → split)
     → par groupe : (conversion → queue) → PcmBuffer
     → Arc × sinks du groupe → file par sink → consommateur
```

- un **unique thread producteur** par playlist décode et distribue ;
- la contre-pression est en octets, par sink, selon le [`FillMode`] ;
- les transitions entre items sont sans blanc : le graphe survit à la
  frontière tant que le format d'entrée ne change pas ;
- `remove` garantit qu'au retour plus aucune file ne contient de buffer
  de l'item retiré ;
- la fin de playlist est signalée en bande par
  [`SinkRead::EndOfPlaylist`], distincte d'une sous-alimentation.

Le travail de décodage réel (conteneurs, codecs, conversion) est
délégué au contrat de `pmomedia` ; le moteur n'est pas un codec.

# Exemples

```
use pmomedia::{AudioFormat, ChannelLayout, SampleFormat, SynthBackend, SynthFile};
use pmoplayback::{Playlist, Sink, SinkOptions, SinkRead};
use std::sync::Arc;

let playlist = Playlist::new(Arc::new(SynthBackend::new()));
let format = AudioFormat::new(44_100, ChannelLayout::STEREO, SampleFormat::S16);

playlist
    .insert(Arc::new(SynthFile::sine(0.1, 440.0, format)), 1.0, None)
    .unwrap();

let sink = Sink::new(SinkOptions::new(format));
sink.attach(&playlist).unwrap();

let mut frames = 0;
loop {
    match sink.buffer_get_blocking() {
        SinkRead::Buffer(buffer) => frames += buffer.frame_count(),
        SinkRead::EndOfPlaylist => break,
        SinkRead::Empty => break,
    }
}
assert_eq!(frames, 4410);
sink.detach().unwrap();
```
"#]

mod buffer;
mod error;
mod filter;
mod playlist;
mod queue;
mod sink;
mod sink_map;
mod worker;

pub use buffer::PcmBuffer;
pub use error::{Error, Result};
pub use playlist::{FillMode, ItemId, Playlist};
pub use sink::{Sink, SinkOptions, SinkRead};
