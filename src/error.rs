//! Типы ошибок подписки, публикации и отписки.

use thiserror::Error;

/// Ошибка регистрации подписки.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("subscription request failed: missing channel name")]
    MissingChannel,

    #[error("subscription request failed: missing message handler")]
    MissingHandler,
}

/// Ошибка публикации сообщения.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Локальная маршрутизация не нашла ни одного подписчика.
    #[error("no subscribers matched the channel")]
    NoSubscribers,

    /// Движок не смог доставить сообщение (заглушка кластера либо
    /// отказ внешнего транспорта).
    #[error("engine cannot route the message")]
    Unroutable,
}

/// Ошибка отписки.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsubscribeError {
    /// Подписка уже была снята: отписываться чаще, чем подписывались, нельзя.
    #[error("subscription already cancelled")]
    AlreadyUnsubscribed,
}
