//! Regroupement des sinks par format de sortie équivalent.
//!
//! Chaque groupe est servi par une seule queue du graphe de filtres :
//! le moteur ne rend chaque format distinct qu'une fois et partage le
//! même `Arc<PcmBuffer>` avec tous les sinks du groupe.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sink::SinkShared;

/// Deux sinks partagent un groupe ssi leur taille de frame fixe est
/// identique et que, soit les deux sont en passage direct, soit leurs
/// formats demandés coïncident exactement.
fn equivalent(a: &SinkShared, b: &SinkShared) -> bool {
    if a.fixed_frame_count != b.fixed_frame_count {
        return false;
    }
    if a.disable_resample || b.disable_resample {
        return a.disable_resample && b.disable_resample;
    }
    a.audio_format == b.audio_format
}

/// Pile de sinks équivalents ; le premier est le représentant, dont le
/// format détermine la queue de graphe du groupe.
pub(crate) struct SinkGroup {
    sinks: Vec<Arc<SinkShared>>,
}

impl SinkGroup {
    pub(crate) fn representative(&self) -> &Arc<SinkShared> {
        &self.sinks[0]
    }

    pub(crate) fn sinks(&self) -> &[Arc<SinkShared>] {
        &self.sinks
    }
}

#[derive(Default)]
pub(crate) struct SinkMap {
    groups: Vec<SinkGroup>,
}

impl SinkMap {
    pub(crate) fn new() -> Self {
        Self { groups: Vec::new() }
    }

    pub(crate) fn add(&mut self, sink: Arc<SinkShared>) {
        for group in &mut self.groups {
            if equivalent(group.representative(), &sink) {
                group.sinks.push(sink);
                return;
            }
        }
        self.groups.push(SinkGroup { sinks: vec![sink] });
    }

    pub(crate) fn remove(&mut self, sink: &Arc<SinkShared>) -> Result<()> {
        for (g, group) in self.groups.iter_mut().enumerate() {
            if let Some(i) = group.sinks.iter().position(|s| Arc::ptr_eq(s, sink)) {
                group.sinks.remove(i);
                if group.sinks.is_empty() {
                    self.groups.remove(g);
                }
                return Ok(());
            }
        }
        Err(Error::SinkNotFound)
    }

    pub(crate) fn groups(&self) -> &[SinkGroup] {
        &self.groups
    }

    pub(crate) fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Tous les sinks, tous groupes confondus.
    pub(crate) fn all(&self) -> impl Iterator<Item = &Arc<SinkShared>> {
        self.groups.iter().flat_map(|g| g.sinks.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Sink, SinkOptions};
    use pmomedia::{AudioFormat, ChannelLayout, SampleFormat};

    fn fmt(rate: u32) -> AudioFormat {
        AudioFormat::new(rate, ChannelLayout::STEREO, SampleFormat::S16)
    }

    fn shared(options: SinkOptions) -> Arc<SinkShared> {
        Sink::new(options).shared().clone()
    }

    #[test]
    fn same_format_shares_a_group() {
        let mut map = SinkMap::new();
        map.add(shared(SinkOptions::new(fmt(44_100))));
        map.add(shared(SinkOptions::new(fmt(44_100))));
        assert_eq!(map.group_count(), 1);
        assert_eq!(map.groups()[0].sinks().len(), 2);
    }

    #[test]
    fn different_rate_splits_groups() {
        let mut map = SinkMap::new();
        map.add(shared(SinkOptions::new(fmt(44_100))));
        map.add(shared(SinkOptions::new(fmt(48_000))));
        assert_eq!(map.group_count(), 2);
    }

    #[test]
    fn fixed_frame_count_splits_groups() {
        let mut map = SinkMap::new();
        map.add(shared(SinkOptions::new(fmt(44_100))));
        map.add(shared(SinkOptions::new(fmt(44_100)).with_fixed_frame_count(1024)));
        assert_eq!(map.group_count(), 2);
    }

    #[test]
    fn passthrough_sinks_group_together() {
        let mut map = SinkMap::new();
        map.add(shared(SinkOptions::new(fmt(44_100)).with_disable_resample()));
        map.add(shared(SinkOptions::new(fmt(96_000)).with_disable_resample()));
        map.add(shared(SinkOptions::new(fmt(44_100))));
        assert_eq!(map.group_count(), 2);
    }

    #[test]
    fn remove_drops_empty_group() {
        let mut map = SinkMap::new();
        let a = shared(SinkOptions::new(fmt(44_100)));
        let b = shared(SinkOptions::new(fmt(48_000)));
        map.add(a.clone());
        map.add(b.clone());

        map.remove(&a).unwrap();
        assert_eq!(map.group_count(), 1);
        map.remove(&b).unwrap();
        assert!(map.is_empty());
        assert!(map.remove(&b).is_err());
    }
}
