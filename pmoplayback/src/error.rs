//! Types d'erreurs pour pmoplayback

/// Erreurs de l'API du moteur de lecture
///
/// Les erreurs du thread de décodage ne passent jamais par ici : elles
/// sont journalisées et se traduisent pour les consommateurs par la fin
/// du flux.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Item not found in playlist")]
    ItemNotFound,

    #[error("Sink is already attached to a playlist")]
    SinkAlreadyAttached,

    #[error("Sink is not attached to any playlist")]
    SinkNotAttached,

    #[error("Sink not found in sink map")]
    SinkNotFound,
}

/// Type Result spécialisé pour pmoplayback
pub type Result<T> = std::result::Result<T, Error>;
