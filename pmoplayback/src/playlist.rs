//! Playlist : la liste d'items et son API de navigation.
//!
//! La playlist possède exclusivement ses items ; les handles [`ItemId`]
//! remis à l'appelant ne sont que des identités. Toute mutation passe
//! par le mutex du coordinateur, partagé avec le thread de décodage.
//! Deux variables de condition y sont accrochées :
//!
//! - `decode_head_cond` : réveille le décodeur quand la tête de
//!   décodage (re)devient non nulle : insert, seek, première attache
//!   d'un sink, destruction ;
//! - `drain_cond` : réveille un décodeur en contre-pression (la file
//!   d'un sink repasse sous son seuil, attache, retrait d'item,
//!   destruction).
//!
//! La destruction de la [`Playlist`] interrompt le thread de décodage,
//! le rejoint, et interrompt les files de tous les sinks encore
//! attachés : un consommateur bloqué rend la main avec `Empty`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use pmomedia::{FilterBackend, MediaFile};

use crate::error::{Error, Result};
use crate::sink_map::SinkMap;
use crate::worker;

/// Identité d'un item de playlist.
///
/// Sert aux opérations de navigation et à la comparaison d'identité sur
/// les buffers ([`crate::PcmBuffer::item`]) ; jamais réutilisée, même
/// après retrait de l'item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    #[cfg(test)]
    pub(crate) fn for_tests(value: u64) -> Self {
        Self(value)
    }
}

/// Règle de contre-pression du décodeur.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FillMode {
    /// Le décodeur ne s'arrête que quand *toutes* les files de sinks
    /// ont atteint leur seuil
    #[default]
    AllSinksFull,
    /// Le décodeur s'arrête dès qu'*une* file a atteint son seuil
    AnySinkFull,
}

/// État de lecture d'un item, sous son propre verrou (le « verrou de
/// seek » du fichier) : le décodeur le prend après le mutex du
/// coordinateur, jamais l'inverse.
pub(crate) struct PlayState {
    pub(crate) seek_to: Option<i64>,
    pub(crate) seek_flush: bool,
    pub(crate) eof: bool,
    /// Horloge audio en secondes : PTS du dernier paquet, ou estimation
    /// par les octets produits quand le conteneur n'en fournit pas
    pub(crate) clock: f64,
}

impl PlayState {
    fn new() -> Self {
        Self {
            seek_to: None,
            seek_flush: false,
            eof: false,
            clock: 0.0,
        }
    }
}

/// Un item : un fichier opaque et son gain, possédés par la playlist.
#[derive(Clone)]
pub(crate) struct ItemEntry {
    pub(crate) id: ItemId,
    pub(crate) file: Arc<dyn MediaFile>,
    pub(crate) gain: f64,
    pub(crate) play: Arc<Mutex<PlayState>>,
}

/// État sous le mutex du coordinateur.
pub(crate) struct State {
    pub(crate) items: Vec<ItemEntry>,
    pub(crate) decode_head: Option<ItemId>,
    pub(crate) volume: f64,
    pub(crate) fill_mode: FillMode,
    pub(crate) rebuild: bool,
    /// Vrai quand le marqueur de fin a déjà été livré pour le drain en
    /// cours. Initialisé à vrai : une playlist vide ne doit pas servir
    /// de marqueur à un sink attaché plus tard.
    pub(crate) sent_end: bool,
    pub(crate) sinks: SinkMap,
    pub(crate) abort: bool,
    next_id: u64,
}

impl State {
    fn alloc_id(&mut self) -> ItemId {
        self.next_id += 1;
        ItemId(self.next_id)
    }

    pub(crate) fn entry(&self, id: ItemId) -> Option<&ItemEntry> {
        self.items.iter().find(|e| e.id == id)
    }

    fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|e| e.id == id)
    }
}

/// Primitives de coordination partagées entre l'API et le décodeur.
pub(crate) struct PlaylistShared {
    pub(crate) state: Mutex<State>,
    pub(crate) decode_head_cond: Condvar,
    pub(crate) drain_cond: Condvar,
    pub(crate) paused: AtomicBool,
}

/// Moteur de décodage d'une playlist.
///
/// À la création, un unique thread producteur démarre ; il décode
/// l'item de tête, pousse les frames dans le graphe de filtres et
/// distribue les buffers aux sinks attachés. Voir [`crate::Sink`] pour
/// le côté consommateur.
pub struct Playlist {
    shared: Arc<PlaylistShared>,
    worker: Option<JoinHandle<()>>,
}

impl Playlist {
    /// Crée une playlist vide, en lecture (non en pause), volume 1.0,
    /// et démarre son thread de décodage.
    pub fn new(backend: Arc<dyn FilterBackend>) -> Self {
        let shared = Arc::new(PlaylistShared {
            state: Mutex::new(State {
                items: Vec::new(),
                decode_head: None,
                volume: 1.0,
                fill_mode: FillMode::default(),
                rebuild: false,
                sent_end: true,
                sinks: SinkMap::new(),
                abort: false,
                next_id: 0,
            }),
            decode_head_cond: Condvar::new(),
            drain_cond: Condvar::new(),
            paused: AtomicBool::new(false),
        });
        let worker = worker::spawn(shared.clone(), backend);
        Self {
            shared,
            worker: Some(worker),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<PlaylistShared> {
        &self.shared
    }

    /// Insère `file` avec le gain `gain`, devant `before` ou en fin de
    /// liste. Quand la tête de décodage est nulle (playlist vide ou
    /// déjà drainée), le nouvel item la reprend, positionné au début.
    pub fn insert(
        &self,
        file: Arc<dyn MediaFile>,
        gain: f64,
        before: Option<ItemId>,
    ) -> Result<ItemId> {
        let mut state = self.shared.state.lock().unwrap();
        let index = match before {
            Some(before) => state.index_of(before).ok_or(Error::ItemNotFound)?,
            None => state.items.len(),
        };
        let id = state.alloc_id();
        state.items.insert(
            index,
            ItemEntry {
                id,
                file,
                gain,
                play: Arc::new(Mutex::new(PlayState::new())),
            },
        );

        if state.decode_head.is_none() {
            state.decode_head = Some(id);
            let mut play = state.items[index].play.lock().unwrap();
            play.seek_to = Some(0);
            play.seek_flush = false;
            play.eof = false;
            play.clock = 0.0;
        }
        drop(state);

        self.shared.decode_head_cond.notify_all();
        Ok(id)
    }

    /// Retire `item` de la playlist.
    ///
    /// Au retour, plus aucune file de sink ne contient de buffer
    /// provenant de cet item : la purge s'exécute sous le mutex du
    /// coordinateur, le décodeur ne peut pas republier entre-temps.
    pub fn remove(&self, item: ItemId) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let index = state.index_of(item).ok_or(Error::ItemNotFound)?;

        if state.decode_head == Some(item) {
            state.decode_head = state.items.get(index + 1).map(|e| e.id);
            // Jette aussi les échantillons de l'item encore en transit
            // dans le graphe
            state.rebuild = true;
        }
        let entry = state.items.remove(index);

        for sink in state.sinks.all() {
            sink.queue.purge(|buffer| buffer.item() == item);
            if let Some(on_purge) = &sink.on_purge {
                on_purge(item);
            }
        }
        drop(state);

        self.shared.drain_cond.notify_all();
        drop(entry);
        Ok(())
    }

    /// Retire tous les items, de la tête vers la queue.
    pub fn clear(&self) {
        loop {
            let first = self.shared.state.lock().unwrap().items.first().map(|e| e.id);
            match first {
                Some(id) => {
                    let _ = self.remove(id);
                }
                None => break,
            }
        }
    }

    /// Fait de `item` la tête de décodage, positionnée à `seconds`.
    /// Les files de tous les sinks seront vidées avant les premières
    /// frames post-seek.
    pub fn seek(&self, item: ItemId, seconds: f64) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let entry = state.entry(item).ok_or(Error::ItemNotFound)?.clone();
        {
            let mut play = entry.play.lock().unwrap();
            play.seek_to = Some(entry.file.time_base().from_seconds(seconds));
            play.seek_flush = true;
            play.eof = false;
            play.clock = seconds;
        }
        state.decode_head = Some(item);
        drop(state);

        self.shared.decode_head_cond.notify_all();
        Ok(())
    }

    /// Reprend la lecture. Idempotent.
    pub fn play(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// Suspend la lecture. Idempotent ; le décodeur continue de remplir
    /// les files, ce sont les consommateurs qui marquent la pause.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn playing(&self) -> bool {
        !self.shared.paused.load(Ordering::SeqCst)
    }

    /// Volume linéaire de la playlist, combiné au gain de l'item
    /// courant puis écrêté dans [0.0, 1.0] par le graphe.
    pub fn set_volume(&self, volume: f64) {
        self.shared.state.lock().unwrap().volume = volume;
    }

    pub fn volume(&self) -> f64 {
        self.shared.state.lock().unwrap().volume
    }

    /// Gain linéaire propre à un item.
    pub fn set_item_gain(&self, item: ItemId, gain: f64) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        let index = state.index_of(item).ok_or(Error::ItemNotFound)?;
        state.items[index].gain = gain;
        Ok(())
    }

    pub fn item_gain(&self, item: ItemId) -> Result<f64> {
        let state = self.shared.state.lock().unwrap();
        state.entry(item).map(|e| e.gain).ok_or(Error::ItemNotFound)
    }

    /// Change la règle de contre-pression (voir [`FillMode`]).
    pub fn set_fill_mode(&self, mode: FillMode) {
        self.shared.state.lock().unwrap().fill_mode = mode;
        self.shared.drain_cond.notify_all();
    }

    /// Tête de décodage et position dans son flux, en secondes.
    pub fn position(&self) -> (Option<ItemId>, f64) {
        let state = self.shared.state.lock().unwrap();
        match state.decode_head {
            Some(id) => {
                let clock = state
                    .entry(id)
                    .map(|e| e.play.lock().unwrap().clock)
                    .unwrap_or(0.0);
                (Some(id), clock)
            }
            None => (None, 0.0),
        }
    }

    pub fn count(&self) -> usize {
        self.shared.state.lock().unwrap().items.len()
    }

    /// Les items dans l'ordre de lecture.
    pub fn items(&self) -> Vec<ItemId> {
        self.shared
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|e| e.id)
            .collect()
    }
}

impl Drop for Playlist {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.abort = true;
            for sink in state.sinks.all() {
                sink.queue.abort();
            }
        }
        self.shared.decode_head_cond.notify_all();
        self.shared.drain_cond.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        tracing::debug!("Playlist: destroyed");
    }
}
