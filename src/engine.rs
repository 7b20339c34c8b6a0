//! Транспортные движки: куда на самом деле уходит публикация.
//!
//! Брокер маршрутизирует локально сам; движок — это точка расширения для
//! межпроцессной доставки (кластер, внешняя шина). Зарегистрированные
//! движки получают уведомления о создании и уничтожении каналов и могут
//! зеркалировать подписки наружу.

use bytes::Bytes;

use crate::{broker::Broker, error::PublishError, name::Name};

/// Контракт транспортного движка.
///
/// `subscribe`/`unsubscribe` вызываются **под блокировкой брокера**:
/// обратный вход в API брокера из них запрещён (нужно — откладывайте
/// работу через свой исполнитель). `publish` вызывается без блокировки.
pub trait Engine: Send + Sync {
    /// Канал появился (первая подписка). Ошибки движка — его личное дело.
    fn subscribe(&self, channel: &Name, use_pattern: bool);

    /// Канал исчез (снята последняя подписка).
    fn unsubscribe(&self, channel: &Name, use_pattern: bool);

    /// Доставить публикацию. Локальный движок раздаёт по индексам брокера,
    /// внешний — отправляет в свой транспорт.
    fn publish(&self, broker: &Broker, channel: &Name, payload: Bytes)
        -> Result<(), PublishError>;
}

/// Внутрипроцессный движок: вся маршрутизация — по индексам брокера,
/// состояния своего не имеет, поэтому уведомления — no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngine;

impl Engine for LocalEngine {
    fn subscribe(&self, _channel: &Name, _use_pattern: bool) {}

    fn unsubscribe(&self, _channel: &Name, _use_pattern: bool) {}

    fn publish(
        &self,
        broker: &Broker,
        channel: &Name,
        payload: Bytes,
    ) -> Result<(), PublishError> {
        broker.fan_out(channel, payload)
    }
}

/// Заглушка кластерного транспорта: завершает цепочку выбора движка
/// по умолчанию. Реальный транспорт подключается через
/// [`Broker::engine_register`] и замещает её.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterEngine;

impl Engine for ClusterEngine {
    fn subscribe(&self, _channel: &Name, _use_pattern: bool) {}

    fn unsubscribe(&self, _channel: &Name, _use_pattern: bool) {}

    fn publish(
        &self,
        _broker: &Broker,
        channel: &Name,
        _payload: Bytes,
    ) -> Result<(), PublishError> {
        tracing::trace!(channel = %channel, "cluster transport is not wired, dropping publish");
        Err(PublishError::Unroutable)
    }
}
