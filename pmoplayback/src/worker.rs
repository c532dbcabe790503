//! Le thread de décodage : unique producteur d'une playlist.
//!
//! Le même thread décode, entretient le graphe de filtres et distribue
//! les buffers ; il n'y a pas de thread de distribution séparé. Il ne
//! se suspend qu'à deux endroits : sur `decode_head_cond` quand il n'y
//! a rien à décoder, sur `drain_cond` quand les files des sinks sont au
//! seuil. Chaque pas de décodage se fait sous le mutex du coordinateur,
//! relâché entre deux pas pour laisser passer les appels d'API.
//!
//! Aucune erreur ne sort de ce thread : elles sont journalisées et se
//! traduisent au pire par un saut d'item.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use pmomedia::{AudioDecoder, FilterBackend, Frame, GraphPull, ReadStatus};

use crate::buffer::PcmBuffer;
use crate::filter::FilterChain;
use crate::playlist::{FillMode, ItemEntry, ItemId, PlaylistShared, State};

pub(crate) fn spawn(
    shared: Arc<PlaylistShared>,
    backend: Arc<dyn FilterBackend>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("pmoplayback-decode".into())
        .spawn(move || DecodeWorker::new(shared, backend).run())
        .expect("failed to spawn decode thread")
}

/// Issue d'un pas de lecture/décodage.
enum StepOutcome {
    /// Une frame décodée, avec ou sans PTS de paquet
    Frame(Frame, bool),
    /// Rien à distribuer ce tour-ci (paquet non audio, frame retenue,
    /// erreur recouvrable, passage à l'état EOF)
    Nothing,
    /// L'item est terminé
    EndOfItem,
}

struct DecodeWorker {
    shared: Arc<PlaylistShared>,
    chain: FilterChain,
    decoder: Option<(ItemId, Box<dyn AudioDecoder>)>,
    pause_sent: Option<(ItemId, bool)>,
}

impl DecodeWorker {
    fn new(shared: Arc<PlaylistShared>, backend: Arc<dyn FilterBackend>) -> Self {
        Self {
            shared,
            chain: FilterChain::new(backend),
            decoder: None,
            pause_sent: None,
        }
    }

    fn run(mut self) {
        loop {
            let shared = self.shared.clone();
            let mut state = shared.state.lock().unwrap();
            if state.abort {
                break;
            }

            let Some(head) = state.decode_head else {
                if !state.sent_end {
                    state.sent_end = true;
                    for sink in state.sinks.all() {
                        let _ = sink.queue.put_end();
                    }
                    tracing::debug!("DecodeWorker: playlist drained, end marker delivered");
                }
                drop(shared.decode_head_cond.wait(state).unwrap());
                continue;
            };
            state.sent_end = false;

            if saturated(&state) {
                drop(shared.drain_cond.wait(state).unwrap());
                continue;
            }

            self.step(&mut state, head);
        }
        tracing::debug!("DecodeWorker: stopped");
    }

    /// Un pas de décodage, sous le mutex du coordinateur.
    fn step(&mut self, state: &mut State, head: ItemId) {
        let Some(entry) = state.entry(head).cloned() else {
            return;
        };

        // Seek en attente, sous le verrou de seek du fichier. Un seek
        // utilisateur vide les files des sinks et jette le graphe ;
        // l'enchaînement d'items (seek_flush faux) ne touche à rien,
        // les frames partielles du graphe enjambent la frontière.
        {
            let mut play = entry.play.lock().unwrap();
            if let Some(ts) = play.seek_to.take() {
                match entry.file.seek(ts) {
                    Ok(()) => {
                        play.clock = entry.file.time_base().to_seconds(ts);
                        play.eof = false;
                    }
                    Err(e) => tracing::warn!(
                        "DecodeWorker: seek failed, resuming from current position: {e}"
                    ),
                }
                if play.seek_flush {
                    play.seek_flush = false;
                    for sink in state.sinks.all() {
                        sink.queue.flush();
                        if let Some(on_flush) = &sink.on_flush {
                            on_flush();
                        }
                    }
                    self.chain.invalidate();
                }
                if let Some((_, decoder)) = &mut self.decoder {
                    decoder.flush();
                }
                return;
            }
        }

        let volume = state.volume * entry.gain;
        match self
            .chain
            .ensure(entry.file.as_ref(), &state.sinks, state.rebuild, volume)
        {
            Ok(rebuilt) => {
                if rebuilt {
                    state.rebuild = false;
                }
            }
            Err(e) => {
                tracing::error!("DecodeWorker: filter graph build failed, skipping item: {e}");
                self.chain.invalidate();
                self.end_of_item(state, &entry);
                return;
            }
        }

        if entry.file.abort_requested() {
            self.end_of_item(state, &entry);
            return;
        }

        let paused = self.shared.paused.load(Ordering::SeqCst);
        if self.pause_sent != Some((entry.id, paused)) {
            if paused {
                entry.file.pause();
            } else {
                entry.file.resume();
            }
            self.pause_sent = Some((entry.id, paused));
        }

        if self.decoder.as_ref().map(|(id, _)| *id) != Some(entry.id) {
            match entry.file.decoder() {
                Ok(decoder) => self.decoder = Some((entry.id, decoder)),
                Err(e) => {
                    tracing::error!("DecodeWorker: decoder unavailable, skipping item: {e}");
                    self.end_of_item(state, &entry);
                    return;
                }
            }
        }

        let outcome = self.decode_one(&entry);
        match outcome {
            StepOutcome::Frame(frame, had_pts) => self.distribute(state, &entry, frame, had_pts),
            StepOutcome::Nothing => {}
            StepOutcome::EndOfItem => self.end_of_item(state, &entry),
        }
    }

    /// Lit un paquet et le décode, ou draine le codec après la fin du
    /// flux. Les paquets non audio sont ignorés, une frame corrompue
    /// est sautée, le paquet reste consommé.
    fn decode_one(&mut self, entry: &ItemEntry) -> StepOutcome {
        let Some((_, decoder)) = self.decoder.as_mut() else {
            return StepOutcome::Nothing;
        };

        if entry.play.lock().unwrap().eof {
            let drained = if decoder.has_delay() {
                decoder.drain().unwrap_or_else(|e| {
                    tracing::warn!("DecodeWorker: codec drain failed: {e}");
                    None
                })
            } else {
                None
            };
            return match drained {
                Some(frame) => StepOutcome::Frame(frame, false),
                None => StepOutcome::EndOfItem,
            };
        }

        match entry.file.read_packet() {
            Err(e) => {
                tracing::warn!("DecodeWorker: read error treated as end of stream: {e}");
                entry.play.lock().unwrap().eof = true;
                StepOutcome::Nothing
            }
            Ok(ReadStatus::Eof) => {
                entry.play.lock().unwrap().eof = true;
                StepOutcome::Nothing
            }
            Ok(ReadStatus::Packet(packet)) if !packet.audio => StepOutcome::Nothing,
            Ok(ReadStatus::Packet(packet)) => match decoder.decode(&packet) {
                Err(e) => {
                    tracing::warn!("DecodeWorker: corrupt frame skipped: {e}");
                    StepOutcome::Nothing
                }
                Ok(None) => StepOutcome::Nothing,
                Ok(Some(frame)) => {
                    if let Some(pts) = packet.pts {
                        entry.play.lock().unwrap().clock =
                            entry.file.time_base().to_seconds(pts);
                    }
                    StepOutcome::Frame(frame, packet.pts.is_some())
                }
            },
        }
    }

    /// Pousse la frame dans le graphe puis sert chaque groupe.
    fn distribute(&mut self, state: &State, entry: &ItemEntry, frame: Frame, had_pts: bool) {
        let pos = entry.play.lock().unwrap().clock;

        if let Err(e) = self.chain.push(frame) {
            tracing::warn!("DecodeWorker: filter graph rejected frame: {e}");
            return;
        }

        let (max_bytes, max_group_rate) = self.fan_out(state, entry, pos);

        // Sans PTS, l'horloge avance au rythme du groupe le plus
        // productif
        if !had_pts && max_group_rate > 0 {
            entry.play.lock().unwrap().clock += max_bytes as f64 / max_group_rate as f64;
        }
    }

    /// Tire toutes les frames disponibles de chaque queue du graphe et
    /// les distribue au groupe correspondant, le même `Arc` pour tous
    /// les sinks du groupe. Rend les octets du groupe le plus productif
    /// et son débit.
    fn fan_out(&mut self, state: &State, entry: &ItemEntry, pos: f64) -> (usize, usize) {
        let mut max_bytes = 0usize;
        let mut max_group_rate = 0usize;

        for (tail, group) in state.sinks.groups().iter().enumerate() {
            let rep = group.representative();
            let mut group_bytes = 0usize;
            loop {
                match self.chain.pull(tail) {
                    Ok(GraphPull::Frame(frame)) => {
                        let buffer = Arc::new(PcmBuffer::new(frame, pos, entry.id));
                        group_bytes += buffer.byte_len();
                        for sink in group.sinks() {
                            let _ = sink.queue.put(buffer.clone());
                        }
                    }
                    Ok(GraphPull::NotReady) | Ok(GraphPull::Eof) => break,
                    Err(e) => {
                        tracing::warn!("DecodeWorker: pull failed on tail {tail}: {e}");
                        break;
                    }
                }
            }
            if group_bytes > max_bytes {
                max_bytes = group_bytes;
                max_group_rate = if rep.disable_resample {
                    entry.file.audio_format().bytes_per_sec()
                } else {
                    rep.audio_format.bytes_per_sec()
                };
            }
        }

        (max_bytes, max_group_rate)
    }

    /// Avance la tête de décodage ; le dernier item vide d'abord les
    /// queues du graphe pour que les frames partielles sortent avant le
    /// marqueur de fin.
    fn end_of_item(&mut self, state: &mut State, entry: &ItemEntry) {
        let next = state
            .items
            .iter()
            .position(|e| e.id == entry.id)
            .and_then(|i| state.items.get(i + 1))
            .cloned();

        match next {
            Some(next_entry) => {
                tracing::debug!("DecodeWorker: item finished, continuing with next");
                state.decode_head = Some(next_entry.id);
                let mut play = next_entry.play.lock().unwrap();
                play.seek_to = Some(0);
                play.seek_flush = false;
                play.eof = false;
                play.clock = 0.0;
                self.decoder = None;
            }
            None => {
                tracing::debug!("DecodeWorker: last item finished");
                self.chain.finish();
                let pos = entry.play.lock().unwrap().clock;
                self.fan_out(state, entry, pos);
                self.chain.invalidate();
                self.decoder = None;
                state.decode_head = None;
            }
        }
    }
}

/// Prédicat de remplissage : sans aucun sink, le décodeur se gare
/// jusqu'à la prochaine attache.
fn saturated(state: &State) -> bool {
    let mut sinks = state.sinks.all().peekable();
    if sinks.peek().is_none() {
        return true;
    }
    match state.fill_mode {
        FillMode::AllSinksFull => sinks.all(|s| s.queued_bytes() >= s.min_queue_bytes()),
        FillMode::AnySinkFull => sinks.any(|s| s.queued_bytes() >= s.min_queue_bytes()),
    }
}
