//! Contrat du démultiplexeur et du décodeur externes.
//!
//! Le moteur de lecture ne connaît ni les conteneurs ni les codecs : il
//! reçoit des handles opaques implémentant [`MediaFile`] et tire des
//! paquets qu'il pousse dans un [`AudioDecoder`]. L'ouverture et la
//! fermeture des fichiers appartiennent à l'appelant.

use crate::error::Result;
use crate::format::{AudioFormat, TimeBase};
use crate::frame::Frame;

/// Paquet démultiplexé, encore compressé.
#[derive(Clone, Debug)]
pub struct Packet {
    /// Charge utile opaque, interprétée par le décodeur associé
    pub data: Vec<u8>,
    /// Timestamp de présentation dans la base de temps du flux,
    /// absent quand le conteneur n'en fournit pas
    pub pts: Option<i64>,
    /// Faux pour les paquets d'un autre flux (vidéo, sous-titres…)
    pub audio: bool,
}

/// Résultat d'une lecture de paquet.
#[derive(Debug)]
pub enum ReadStatus {
    Packet(Packet),
    Eof,
}

/// Handle opaque sur une source audio ouverte.
///
/// Toutes les méthodes prennent `&self` : une implémentation réelle
/// encapsule son propre verrouillage, le moteur partage le handle entre
/// son thread de décodage et les appels de l'API.
pub trait MediaFile: Send + Sync {
    /// Format du flux audio courant.
    fn audio_format(&self) -> AudioFormat;

    /// Base de temps des timestamps de paquets.
    fn time_base(&self) -> TimeBase;

    /// Positionne la lecture sur `ts` (base de temps du flux).
    fn seek(&self, ts: i64) -> Result<()>;

    /// Lit le paquet suivant, tous flux confondus.
    fn read_packet(&self) -> Result<ReadStatus>;

    /// Suspend les lectures (flux réseau, etc.). No-op par défaut.
    fn pause(&self) {}

    /// Reprend les lectures. No-op par défaut.
    fn resume(&self) {}

    /// Vrai quand l'appelant a demandé l'abandon de ce fichier ;
    /// le moteur le traite comme une fin d'item.
    fn abort_requested(&self) -> bool {
        false
    }

    /// Crée un décodeur pour le flux audio de ce fichier.
    fn decoder(&self) -> Result<Box<dyn AudioDecoder>>;
}

/// Décodeur au niveau frame.
pub trait AudioDecoder: Send {
    /// Décode un paquet audio ; `None` quand le codec retient la frame
    /// (decodeurs avec délai interne).
    fn decode(&mut self, packet: &Packet) -> Result<Option<Frame>>;

    /// Draine une frame retardée après la fin du flux.
    fn drain(&mut self) -> Result<Option<Frame>>;

    /// Vide les tampons internes du codec (après un seek).
    fn flush(&mut self);

    /// Vrai si le codec retient des frames et doit être drainé en fin
    /// de flux.
    fn has_delay(&self) -> bool {
        false
    }
}
