//! File bloquante de buffers PCM, un exemplaire par sink.
//!
//! La file est illimitée en nombre d'éléments : la contre-pression se
//! joue en octets, côté producteur, via le prédicat de remplissage du
//! thread de décodage. Elle sait en revanche :
//!
//! - réveiller un consommateur bloqué sur [`BufferQueue::get`] ;
//! - s'interrompre ([`BufferQueue::abort`]) : les `put` échouent et les
//!   consommateurs bloqués rendent la main, jusqu'au
//!   [`BufferQueue::reset`] suivant ;
//! - se vider ([`BufferQueue::flush`]) ou se purger sélectivement
//!   ([`BufferQueue::purge`]) en notifiant la comptabilité du sink.
//!
//! # Hooks
//!
//! Le sink observe la file au travers de [`QueueHooks`] : `on_put` et
//! `on_get` sont appelés sous le verrou de la file, exactement une fois
//! par buffer ; `on_cleanup` exactement une fois par buffer évacué sans
//! passer par `get` (flush, purge) ; `after_get` hors du verrou de la
//! file, ce qui l'autorise à prendre le mutex du coordinateur pour
//! signaler le drain sans croiser l'ordre des verrous.
//!
//! Le marqueur de fin de playlist est une variante dédiée de
//! [`QueueEntry`] : il traverse la file sans toucher aux hooks.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::buffer::PcmBuffer;

/// Observateur d'une file, fourni par le sink au moment de l'attache.
pub(crate) trait QueueHooks: Send + Sync {
    /// Un buffer vient d'entrer (sous le verrou de la file).
    fn on_put(&self, buffer: &Arc<PcmBuffer>);

    /// Un buffer vient de sortir par `get` (sous le verrou de la file).
    fn on_get(&self, buffer: &Arc<PcmBuffer>);

    /// Un buffer est évacué par flush ou purge (sous le verrou).
    fn on_cleanup(&self, buffer: Arc<PcmBuffer>);

    /// Appelé après chaque `get` réussi, hors du verrou de la file.
    fn after_get(&self) {}
}

/// Élément de file : un buffer, ou la fin de la playlist.
pub(crate) enum QueueEntry {
    Buffer(Arc<PcmBuffer>),
    EndOfPlaylist,
}

/// Résultat d'un `get` ou d'un `peek`.
#[derive(Debug)]
pub(crate) enum QueuePull {
    Buffer(Arc<PcmBuffer>),
    Empty,
    EndOfPlaylist,
}

struct Inner {
    entries: VecDeque<QueueEntry>,
    aborted: bool,
    hooks: Option<Arc<dyn QueueHooks>>,
}

/// File FIFO bloquante multi-producteur / consommateur unique.
pub(crate) struct BufferQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl BufferQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                aborted: false,
                hooks: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn set_hooks(&self, hooks: Arc<dyn QueueHooks>) {
        self.inner.lock().unwrap().hooks = Some(hooks);
    }

    pub(crate) fn clear_hooks(&self) {
        self.inner.lock().unwrap().hooks = None;
    }

    /// Enfile un buffer. Échoue après `abort`, jusqu'au `reset`.
    pub(crate) fn put(&self, buffer: Arc<PcmBuffer>) -> Result<(), ()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.aborted {
            return Err(());
        }
        if let Some(hooks) = &inner.hooks {
            hooks.on_put(&buffer);
        }
        inner.entries.push_back(QueueEntry::Buffer(buffer));
        self.cond.notify_all();
        Ok(())
    }

    /// Enfile le marqueur de fin de playlist (aucun hook n'est appelé).
    pub(crate) fn put_end(&self) -> Result<(), ()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.aborted {
            return Err(());
        }
        inner.entries.push_back(QueueEntry::EndOfPlaylist);
        self.cond.notify_all();
        Ok(())
    }

    /// Défile l'élément de tête.
    ///
    /// Bloquant : attend un élément ou un `abort`. Non bloquant : rend
    /// `Empty` immédiatement si la file est vide.
    pub(crate) fn get(&self, block: bool) -> QueuePull {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(entry) = inner.entries.pop_front() {
                match entry {
                    QueueEntry::Buffer(buffer) => {
                        let hooks = inner.hooks.clone();
                        if let Some(hooks) = &hooks {
                            hooks.on_get(&buffer);
                        }
                        drop(inner);
                        if let Some(hooks) = &hooks {
                            hooks.after_get();
                        }
                        return QueuePull::Buffer(buffer);
                    }
                    QueueEntry::EndOfPlaylist => return QueuePull::EndOfPlaylist,
                }
            }
            if inner.aborted || !block {
                return QueuePull::Empty;
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// Comme `get`, sans défiler : le buffer rendu reste en tête.
    pub(crate) fn peek(&self, block: bool) -> QueuePull {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match inner.entries.front() {
                Some(QueueEntry::Buffer(buffer)) => return QueuePull::Buffer(buffer.clone()),
                Some(QueueEntry::EndOfPlaylist) => return QueuePull::EndOfPlaylist,
                None => {}
            }
            if inner.aborted || !block {
                return QueuePull::Empty;
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// Vide la file, `on_cleanup` pour chaque buffer évacué.
    pub(crate) fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        let hooks = inner.hooks.clone();
        while let Some(entry) = inner.entries.pop_front() {
            if let (QueueEntry::Buffer(buffer), Some(hooks)) = (entry, &hooks) {
                hooks.on_cleanup(buffer);
            }
        }
    }

    /// Retire tous les buffers pour lesquels `pred` est vrai,
    /// `on_cleanup` pour chacun. Le marqueur de fin n'est jamais purgé.
    pub(crate) fn purge(&self, pred: impl Fn(&PcmBuffer) -> bool) {
        let mut inner = self.inner.lock().unwrap();
        let hooks = inner.hooks.clone();
        let mut kept = VecDeque::with_capacity(inner.entries.len());
        while let Some(entry) = inner.entries.pop_front() {
            match entry {
                QueueEntry::Buffer(buffer) if pred(&buffer) => {
                    if let Some(hooks) = &hooks {
                        hooks.on_cleanup(buffer);
                    }
                }
                keep => kept.push_back(keep),
            }
        }
        inner.entries = kept;
    }

    /// Débloque tous les attentes ; les `put` suivants échouent.
    pub(crate) fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = true;
        self.cond.notify_all();
    }

    /// Annule l'état `abort`.
    pub(crate) fn reset(&self) {
        self.inner.lock().unwrap().aborted = false;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::ItemId;
    use pmomedia::{AudioFormat, ChannelLayout, Frame, SampleFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn buffer(item: u64) -> Arc<PcmBuffer> {
        let fmt = AudioFormat::new(48_000, ChannelLayout::MONO, SampleFormat::S16);
        Arc::new(PcmBuffer::new(
            Frame::silence(fmt, 16),
            0.0,
            ItemId::for_tests(item),
        ))
    }

    #[derive(Default)]
    struct CountingHooks {
        puts: AtomicUsize,
        gets: AtomicUsize,
        cleanups: AtomicUsize,
        after_gets: AtomicUsize,
    }

    impl QueueHooks for CountingHooks {
        fn on_put(&self, _: &Arc<PcmBuffer>) {
            self.puts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_get(&self, _: &Arc<PcmBuffer>) {
            self.gets.fetch_add(1, Ordering::SeqCst);
        }
        fn on_cleanup(&self, _: Arc<PcmBuffer>) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
        fn after_get(&self) {
            self.after_gets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fifo_order() {
        let queue = BufferQueue::new();
        queue.put(buffer(1)).unwrap();
        queue.put(buffer(2)).unwrap();

        match queue.get(false) {
            QueuePull::Buffer(b) => assert_eq!(b.item(), ItemId::for_tests(1)),
            other => panic!("expected buffer, got {:?}", other),
        }
        match queue.get(false) {
            QueuePull::Buffer(b) => assert_eq!(b.item(), ItemId::for_tests(2)),
            other => panic!("expected buffer, got {:?}", other),
        }
        assert!(matches!(queue.get(false), QueuePull::Empty));
    }

    #[test]
    fn sentinel_bypasses_hooks() {
        let queue = BufferQueue::new();
        let hooks = Arc::new(CountingHooks::default());
        queue.set_hooks(hooks.clone());

        queue.put_end().unwrap();
        assert!(matches!(queue.get(false), QueuePull::EndOfPlaylist));
        assert_eq!(hooks.puts.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.gets.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.after_gets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cleanup_exactly_once_per_element() {
        let queue = BufferQueue::new();
        let hooks = Arc::new(CountingHooks::default());
        queue.set_hooks(hooks.clone());

        for i in 0..4 {
            queue.put(buffer(i)).unwrap();
        }
        // Un par get, les trois autres par flush
        let _ = queue.get(false);
        queue.flush();

        assert_eq!(hooks.puts.load(Ordering::SeqCst), 4);
        assert_eq!(hooks.gets.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.after_gets.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn purge_is_selective_and_keeps_order() {
        let queue = BufferQueue::new();
        let hooks = Arc::new(CountingHooks::default());
        queue.set_hooks(hooks.clone());

        queue.put(buffer(1)).unwrap();
        queue.put(buffer(2)).unwrap();
        queue.put(buffer(1)).unwrap();
        queue.put_end().unwrap();

        queue.purge(|b| b.item() == ItemId::for_tests(1));
        assert_eq!(hooks.cleanups.load(Ordering::SeqCst), 2);

        match queue.get(false) {
            QueuePull::Buffer(b) => assert_eq!(b.item(), ItemId::for_tests(2)),
            other => panic!("expected buffer, got {:?}", other),
        }
        assert!(matches!(queue.get(false), QueuePull::EndOfPlaylist));
    }

    #[test]
    fn abort_unblocks_waiting_consumer() {
        let queue = Arc::new(BufferQueue::new());
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.get(true))
        };
        std::thread::sleep(Duration::from_millis(50));
        queue.abort();
        assert!(matches!(consumer.join().unwrap(), QueuePull::Empty));
    }

    #[test]
    fn put_fails_after_abort_until_reset() {
        let queue = BufferQueue::new();
        queue.abort();
        assert!(queue.put(buffer(1)).is_err());
        assert!(queue.put_end().is_err());
        queue.reset();
        assert!(queue.put(buffer(1)).is_ok());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn blocking_get_sees_later_put() {
        let queue = Arc::new(BufferQueue::new());
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.get(true))
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.put(buffer(7)).unwrap();
        match consumer.join().unwrap() {
            QueuePull::Buffer(b) => assert_eq!(b.item(), ItemId::for_tests(7)),
            other => panic!("expected buffer, got {:?}", other),
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let queue = BufferQueue::new();
        queue.put(buffer(3)).unwrap();
        assert!(matches!(queue.peek(false), QueuePull::Buffer(_)));
        assert!(matches!(queue.peek(false), QueuePull::Buffer(_)));
        assert!(matches!(queue.get(false), QueuePull::Buffer(_)));
        assert!(matches!(queue.peek(false), QueuePull::Empty));
    }
}
