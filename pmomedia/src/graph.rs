//! Contrat du graphe de filtres externe.
//!
//! Le moteur décrit la topologie voulue dans un [`GraphSpec`] (entrée,
//! gain éventuel, une queue de graphe par groupe de sorties) et le
//! backend la matérialise. Les décisions de topologie (présence du node
//! de volume, du split, d'une conversion par queue) restent côté
//! moteur ; le backend ne fait que les exécuter.
//!
//! # Cycle de vie
//!
//! ```text
//! build(spec) → push(frame)* → pull(tail)* → finish() → pull(tail)*
//! ```
//!
//! `finish()` marque la fin de l'entrée : les queues à taille fixe
//! rendent alors leur dernière frame partielle, puis `pull` rend `Eof`.

use crate::error::Result;
use crate::format::{AudioFormat, TimeBase};
use crate::frame::Frame;

/// Description d'une queue de graphe (une par groupe de sorties).
#[derive(Clone, Debug)]
pub struct TailSpec {
    /// Format de conversion, `None` pour une queue pass-through
    pub convert: Option<AudioFormat>,
    /// Nombre de frames par pull, 0 pour des frames de taille variable
    pub fixed_frame_count: usize,
}

/// Topologie complète demandée au backend.
#[derive(Clone, Debug)]
pub struct GraphSpec {
    /// Format du flux entrant
    pub input: AudioFormat,
    /// Base de temps du flux entrant
    pub time_base: TimeBase,
    /// Gain linéaire du node de volume, `None` pour l'omettre
    /// (gain unitaire)
    pub volume: Option<f64>,
    /// Queues de sortie, dans l'ordre des groupes
    pub tails: Vec<TailSpec>,
}

/// Résultat d'un `pull` sur une queue.
#[derive(Debug)]
pub enum GraphPull {
    /// Une frame au format de la queue
    Frame(Frame),
    /// Pas assez de données pour l'instant
    NotReady,
    /// Entrée terminée et queue vidée
    Eof,
}

/// Graphe de filtres construit, prêt à transformer des frames.
pub trait FilterGraph: Send {
    /// Pousse une frame source dans le graphe.
    fn push(&mut self, frame: Frame) -> Result<()>;

    /// Tire la prochaine frame de la queue d'index `tail`.
    fn pull(&mut self, tail: usize) -> Result<GraphPull>;

    /// Signale la fin de l'entrée ; les frames partielles restantes
    /// deviennent disponibles au pull.
    fn finish(&mut self);
}

/// Fabrique de graphes de filtres.
pub trait FilterBackend: Send + Sync {
    fn build(&self, spec: &GraphSpec) -> Result<Box<dyn FilterGraph>>;
}
