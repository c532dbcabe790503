//! Sink : le handle consommateur du moteur.
//!
//! Un sink déclare le format de sortie qu'il veut recevoir, la taille
//! de sa file et, optionnellement, des frames de taille fixe ou le
//! passage direct sans conversion. Une fois attaché à une playlist, il
//! reçoit les buffers de son groupe dans sa propre file bornée et les
//! consomme via [`Sink::buffer_get`] / [`Sink::buffer_get_blocking`].
//!
//! # Exemples
//!
//! ```no_run
//! use pmomedia::{AudioFormat, ChannelLayout, SampleFormat, SynthBackend};
//! use pmoplayback::{Playlist, Sink, SinkOptions, SinkRead};
//! use std::sync::Arc;
//!
//! let playlist = Playlist::new(Arc::new(SynthBackend::new()));
//! let format = AudioFormat::new(44_100, ChannelLayout::STEREO, SampleFormat::S16);
//! let sink = Sink::new(SinkOptions::new(format).with_buffer_frames(4096));
//!
//! sink.attach(&playlist).unwrap();
//! loop {
//!     match sink.buffer_get_blocking() {
//!         SinkRead::Buffer(buffer) => println!("{} frames", buffer.frame_count()),
//!         SinkRead::EndOfPlaylist => break,
//!         SinkRead::Empty => break, // file interrompue
//!     }
//! }
//! sink.detach().unwrap();
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use pmomedia::AudioFormat;

use crate::buffer::PcmBuffer;
use crate::error::{Error, Result};
use crate::playlist::{ItemId, Playlist, PlaylistShared};
use crate::queue::{BufferQueue, QueueHooks, QueuePull};

/// Nombre de frames par défaut de la file d'un sink.
const DEFAULT_BUFFER_FRAMES: usize = 8192;

type FlushCallback = Box<dyn Fn() + Send + Sync>;
type PurgeCallback = Box<dyn Fn(ItemId) + Send + Sync>;

/// Configuration d'un sink, construite en style builder.
pub struct SinkOptions {
    pub(crate) audio_format: AudioFormat,
    pub(crate) buffer_frames: usize,
    pub(crate) fixed_frame_count: usize,
    pub(crate) disable_resample: bool,
    pub(crate) on_flush: Option<FlushCallback>,
    pub(crate) on_purge: Option<PurgeCallback>,
}

impl SinkOptions {
    pub fn new(audio_format: AudioFormat) -> Self {
        Self {
            audio_format,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            fixed_frame_count: 0,
            disable_resample: false,
            on_flush: None,
            on_purge: None,
        }
    }

    /// Capacité de la file en frames (le seuil de contre-pression).
    pub fn with_buffer_frames(mut self, frames: usize) -> Self {
        self.buffer_frames = frames;
        self
    }

    /// Exige des buffers d'exactement `frames` frames (0 : taille
    /// variable, au rythme du décodeur).
    pub fn with_fixed_frame_count(mut self, frames: usize) -> Self {
        self.fixed_frame_count = frames;
        self
    }

    /// Reçoit le flux source tel quel, sans conversion ni
    /// rééchantillonnage.
    pub fn with_disable_resample(mut self) -> Self {
        self.disable_resample = true;
        self
    }

    /// Callback invoqué quand la file du sink est vidée par un seek.
    pub fn with_on_flush(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_flush = Some(Box::new(callback));
        self
    }

    /// Callback invoqué après la purge des buffers d'un item retiré.
    pub fn with_on_purge(mut self, callback: impl Fn(ItemId) + Send + Sync + 'static) -> Self {
        self.on_purge = Some(Box::new(callback));
        self
    }
}

/// Résultat d'une lecture côté sink.
#[derive(Debug)]
pub enum SinkRead {
    /// Un buffer PCM au format du sink
    Buffer(Arc<PcmBuffer>),
    /// Rien de disponible : sous-alimentation passagère, ou file
    /// interrompue par un detach/destroy
    Empty,
    /// La playlist est entièrement drainée
    EndOfPlaylist,
}

impl From<QueuePull> for SinkRead {
    fn from(pull: QueuePull) -> Self {
        match pull {
            QueuePull::Buffer(b) => SinkRead::Buffer(b),
            QueuePull::Empty => SinkRead::Empty,
            QueuePull::EndOfPlaylist => SinkRead::EndOfPlaylist,
        }
    }
}

/// État partagé d'un sink, visible du moteur.
pub(crate) struct SinkShared {
    pub(crate) audio_format: AudioFormat,
    pub(crate) buffer_frames: usize,
    pub(crate) fixed_frame_count: usize,
    pub(crate) disable_resample: bool,
    pub(crate) queue: BufferQueue,
    pub(crate) queued_bytes: AtomicUsize,
    pub(crate) on_flush: Option<FlushCallback>,
    pub(crate) on_purge: Option<PurgeCallback>,
    /// Référence faible : la playlist possède déjà ses sinks via le
    /// registre, une référence forte ici formerait un cycle d'Arc.
    attached: Mutex<Option<Weak<PlaylistShared>>>,
}

impl SinkShared {
    /// Seuil de remplissage de la file, en octets.
    pub(crate) fn min_queue_bytes(&self) -> usize {
        self.buffer_frames * self.audio_format.bytes_per_frame()
    }

    pub(crate) fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::SeqCst)
    }
}

/// Comptabilité en octets de la file + signal de drain vers le
/// coordinateur. Installé à l'attache, retiré au détachement.
struct SinkHooks {
    sink: Weak<SinkShared>,
    playlist: Weak<PlaylistShared>,
}

impl QueueHooks for SinkHooks {
    fn on_put(&self, buffer: &Arc<PcmBuffer>) {
        if let Some(sink) = self.sink.upgrade() {
            sink.queued_bytes
                .fetch_add(buffer.byte_len(), Ordering::SeqCst);
        }
    }

    fn on_get(&self, buffer: &Arc<PcmBuffer>) {
        if let Some(sink) = self.sink.upgrade() {
            sink.queued_bytes
                .fetch_sub(buffer.byte_len(), Ordering::SeqCst);
        }
    }

    fn on_cleanup(&self, buffer: Arc<PcmBuffer>) {
        if let Some(sink) = self.sink.upgrade() {
            sink.queued_bytes
                .fetch_sub(buffer.byte_len(), Ordering::SeqCst);
        }
    }

    fn after_get(&self) {
        let Some(sink) = self.sink.upgrade() else {
            return;
        };
        let Some(playlist) = self.playlist.upgrade() else {
            return;
        };
        if sink.queued_bytes() < sink.min_queue_bytes() {
            // Prendre le mutex du coordinateur avant de notifier : le
            // producteur évalue le prédicat de remplissage sous ce
            // mutex, le réveil ne peut donc pas se perdre.
            let _state = playlist.state.lock().unwrap();
            playlist.drain_cond.notify_all();
        }
    }
}

/// Consommateur de buffers PCM, clonable et partageable entre threads.
#[derive(Clone)]
pub struct Sink {
    shared: Arc<SinkShared>,
}

impl Sink {
    pub fn new(options: SinkOptions) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                audio_format: options.audio_format,
                buffer_frames: options.buffer_frames,
                fixed_frame_count: options.fixed_frame_count,
                disable_resample: options.disable_resample,
                queue: BufferQueue::new(),
                queued_bytes: AtomicUsize::new(0),
                on_flush: options.on_flush,
                on_purge: options.on_purge,
                attached: Mutex::new(None),
            }),
        }
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.shared.audio_format
    }

    pub fn is_attached(&self) -> bool {
        self.shared.attached.lock().unwrap().is_some()
    }

    /// Octets actuellement en attente dans la file du sink.
    pub fn queued_bytes(&self) -> usize {
        self.shared.queued_bytes()
    }

    /// Attache ce sink à `playlist` et réveille le décodeur.
    ///
    /// Échoue si le sink est déjà attaché ; il reste alors attaché à sa
    /// playlist d'origine.
    pub fn attach(&self, playlist: &Playlist) -> Result<()> {
        let mut attached = self.shared.attached.lock().unwrap();
        if attached.is_some() {
            return Err(Error::SinkAlreadyAttached);
        }
        let shared_playlist = playlist.shared().clone();

        // La file doit être prête avant d'entrer dans le registre : le
        // décodeur peut la viser dès que le verrou d'état est relâché.
        self.shared.queue.reset();
        self.shared.queued_bytes.store(0, Ordering::SeqCst);
        self.shared.queue.set_hooks(Arc::new(SinkHooks {
            sink: Arc::downgrade(&self.shared),
            playlist: Arc::downgrade(&shared_playlist),
        }));

        {
            let mut state = shared_playlist.state.lock().unwrap();
            state.sinks.add(self.shared.clone());
            state.rebuild = true;
        }
        *attached = Some(Arc::downgrade(&shared_playlist));
        drop(attached);

        tracing::debug!("Sink: attached ({})", self.shared.audio_format);
        shared_playlist.decode_head_cond.notify_all();
        shared_playlist.drain_cond.notify_all();
        Ok(())
    }

    /// Détache ce sink : interrompt et vide sa file (tout consommateur
    /// bloqué rend la main), puis le retire du registre de la playlist.
    pub fn detach(&self) -> Result<()> {
        let mut attached = self.shared.attached.lock().unwrap();
        let Some(playlist) = attached.take() else {
            return Err(Error::SinkNotAttached);
        };

        self.shared.queue.abort();
        self.shared.queue.flush();

        // La playlist peut déjà avoir été détruite ; il ne reste alors
        // que le nettoyage local du sink.
        let removed = match playlist.upgrade() {
            Some(playlist) => {
                let removed = {
                    let mut state = playlist.state.lock().unwrap();
                    let removed = state.sinks.remove(&self.shared);
                    if removed.is_ok() {
                        state.rebuild = true;
                    }
                    removed
                };
                playlist.drain_cond.notify_all();
                removed
            }
            None => Ok(()),
        };
        self.shared.queue.clear_hooks();
        drop(attached);

        tracing::debug!("Sink: detached");
        removed
    }

    /// Prochain buffer, sans bloquer.
    pub fn buffer_get(&self) -> SinkRead {
        self.shared.queue.get(false).into()
    }

    /// Prochain buffer ; attend qu'un buffer arrive, que la playlist
    /// soit drainée ou que la file soit interrompue.
    pub fn buffer_get_blocking(&self) -> SinkRead {
        self.shared.queue.get(true).into()
    }

    /// Regarde le buffer de tête sans le consommer.
    pub fn buffer_peek(&self) -> SinkRead {
        self.shared.queue.peek(false).into()
    }

    /// Comme [`Sink::buffer_peek`], en attendant qu'un élément arrive.
    pub fn buffer_peek_blocking(&self) -> SinkRead {
        self.shared.queue.peek(true).into()
    }

    pub(crate) fn shared(&self) -> &Arc<SinkShared> {
        &self.shared
    }
}
