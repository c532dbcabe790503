//! PcmBuffer : l'unité de PCM décodé livrée aux sinks.
//!
//! Un buffer est immuable après publication et partagé via `Arc` entre
//! le thread de décodage et tous les sinks d'un même groupe : distribuer
//! un buffer ne clone que le pointeur, jamais les échantillons. Le
//! dernier détenteur libère la mémoire en lâchant son `Arc`.

use pmomedia::{AudioFormat, Frame};

use crate::playlist::ItemId;

/// PCM décodé, filtré et converti, prêt à consommer.
#[derive(Debug)]
pub struct PcmBuffer {
    frame: Frame,
    pos: f64,
    item: ItemId,
}

impl PcmBuffer {
    pub(crate) fn new(frame: Frame, pos: f64, item: ItemId) -> Self {
        Self { frame, pos, item }
    }

    /// Les échantillons, plan par canal.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Format de sortie du groupe qui a produit ce buffer.
    pub fn format(&self) -> AudioFormat {
        self.frame.format()
    }

    /// Nombre de frames PCM.
    pub fn frame_count(&self) -> usize {
        self.frame.frame_count()
    }

    /// Taille de la charge PCM en octets.
    pub fn byte_len(&self) -> usize {
        self.frame.byte_len()
    }

    /// Position de présentation dans l'item source, en secondes.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// Item dont ce buffer provient ; sert uniquement de comparaison
    /// d'identité (purge, suivi côté consommateur).
    pub fn item(&self) -> ItemId {
        self.item
    }
}
