//! Cycle de vie du graphe de filtres.
//!
//! Le graphe réellement construit appartient au backend externe ; ce
//! module décide *quand* le reconstruire et avec quelle topologie. Le
//! graphe courant reste valable tant que le format d'entrée, le volume
//! effectif et la composition des groupes de sinks ne bougent pas,
//! y compris à travers une frontière d'items, ce qui donne les
//! transitions sans blanc.

use std::sync::Arc;

use pmomedia::{
    AudioFormat, FilterBackend, FilterGraph, Frame, GraphPull, GraphSpec, MediaFile, Result,
    TailSpec, TimeBase,
};

use crate::sink_map::SinkMap;

pub(crate) struct FilterChain {
    backend: Arc<dyn FilterBackend>,
    graph: Option<Box<dyn FilterGraph>>,
    cached_input: Option<(AudioFormat, TimeBase)>,
    cached_volume: f64,
}

impl FilterChain {
    pub(crate) fn new(backend: Arc<dyn FilterBackend>) -> Self {
        Self {
            backend,
            graph: None,
            cached_input: None,
            cached_volume: 1.0,
        }
    }

    /// Garantit un graphe valable pour l'état courant ; reconstruit si
    /// nécessaire. Rend `true` quand une reconstruction a eu lieu.
    ///
    /// Le volume est écrêté dans [0.0, 1.0] avant de paramétrer le node
    /// de gain ; un volume unitaire omet le node.
    pub(crate) fn ensure(
        &mut self,
        file: &dyn MediaFile,
        sinks: &SinkMap,
        rebuild_requested: bool,
        volume: f64,
    ) -> Result<bool> {
        let input = (file.audio_format(), file.time_base());
        let volume = volume.clamp(0.0, 1.0);

        let up_to_date = self.graph.is_some()
            && !rebuild_requested
            && self.cached_input == Some(input)
            && self.cached_volume == volume;
        if up_to_date {
            return Ok(false);
        }

        let spec = GraphSpec {
            input: input.0,
            time_base: input.1,
            volume: (volume != 1.0).then_some(volume),
            tails: sinks
                .groups()
                .iter()
                .map(|group| {
                    let rep = group.representative();
                    TailSpec {
                        convert: (!rep.disable_resample).then_some(rep.audio_format),
                        fixed_frame_count: rep.fixed_frame_count,
                    }
                })
                .collect(),
        };

        tracing::debug!(
            "FilterChain: rebuilding graph ({} tails, input {}, volume {:.3})",
            spec.tails.len(),
            spec.input,
            volume
        );
        self.graph = Some(self.backend.build(&spec)?);
        self.cached_input = Some(input);
        self.cached_volume = volume;
        Ok(true)
    }

    /// Jette le graphe courant ; le prochain `ensure` reconstruira.
    /// Les échantillons encore en transit dans les queues sont perdus,
    /// c'est l'effet recherché après un seek.
    pub(crate) fn invalidate(&mut self) {
        self.graph = None;
        self.cached_input = None;
    }

    pub(crate) fn push(&mut self, frame: Frame) -> Result<()> {
        match &mut self.graph {
            Some(graph) => graph.push(frame),
            None => Ok(()),
        }
    }

    pub(crate) fn pull(&mut self, tail: usize) -> Result<GraphPull> {
        match &mut self.graph {
            Some(graph) => graph.pull(tail),
            None => Ok(GraphPull::Eof),
        }
    }

    /// Marque la fin de l'entrée pour vider les dernières frames
    /// partielles des queues à taille fixe.
    pub(crate) fn finish(&mut self) {
        if let Some(graph) = &mut self.graph {
            graph.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Sink, SinkOptions};
    use pmomedia::{ChannelLayout, SampleFormat, SynthBackend, SynthFile};

    fn fmt(rate: u32) -> AudioFormat {
        AudioFormat::new(rate, ChannelLayout::STEREO, SampleFormat::S16)
    }

    fn chain() -> FilterChain {
        FilterChain::new(Arc::new(SynthBackend::new()))
    }

    fn map_with(rates: &[u32]) -> SinkMap {
        let mut map = SinkMap::new();
        for &rate in rates {
            map.add(Sink::new(SinkOptions::new(fmt(rate))).shared().clone());
        }
        map
    }

    #[test]
    fn rebuilds_once_then_caches() {
        let file = SynthFile::sine(0.1, 440.0, fmt(44_100));
        let map = map_with(&[44_100]);
        let mut chain = chain();

        assert!(chain.ensure(&file, &map, false, 1.0).unwrap());
        assert!(!chain.ensure(&file, &map, false, 1.0).unwrap());
    }

    #[test]
    fn volume_change_triggers_rebuild() {
        let file = SynthFile::sine(0.1, 440.0, fmt(44_100));
        let map = map_with(&[44_100]);
        let mut chain = chain();

        chain.ensure(&file, &map, false, 1.0).unwrap();
        assert!(chain.ensure(&file, &map, false, 0.5).unwrap());
        assert!(!chain.ensure(&file, &map, false, 0.5).unwrap());
    }

    #[test]
    fn clamped_volumes_compare_equal() {
        let file = SynthFile::sine(0.1, 440.0, fmt(44_100));
        let map = map_with(&[44_100]);
        let mut chain = chain();

        chain.ensure(&file, &map, false, 1.0).unwrap();
        // 2.0 s'écrête à 1.0 : aucun changement effectif
        assert!(!chain.ensure(&file, &map, false, 2.0).unwrap());
    }

    #[test]
    fn input_format_change_triggers_rebuild() {
        let a = SynthFile::sine(0.1, 440.0, fmt(44_100));
        let b = SynthFile::sine(0.1, 440.0, fmt(48_000));
        let map = map_with(&[44_100]);
        let mut chain = chain();

        chain.ensure(&a, &map, false, 1.0).unwrap();
        assert!(chain.ensure(&b, &map, false, 1.0).unwrap());
    }

    #[test]
    fn rebuild_flag_forces_rebuild() {
        let file = SynthFile::sine(0.1, 440.0, fmt(44_100));
        let map = map_with(&[44_100, 48_000]);
        let mut chain = chain();

        chain.ensure(&file, &map, false, 1.0).unwrap();
        assert!(chain.ensure(&file, &map, true, 1.0).unwrap());
    }
}
