//! Zvon — встраиваемое ядро pub/sub: конкурентная маршрутизация публикаций
//! по именованным каналам с точным и шаблонным (glob) совпадением.
//!
//! Основные модули:
//! - `broker` — индексы каналов/шаблонов/клиентов под одной блокировкой,
//!   публикация и fan-out, реестр транспортных движков
//! - `engine` — контракт движка, локальная маршрутизация и кластерная заглушка
//! - `error` — типы ошибок подписки, публикации и отписки
//! - `glob` — побайтовый glob-матчер (`?`, `*`, `[...]`, `\`)
//! - `message` — refcounted конверт публикации и представление доставки
//! - `name` — interned имена каналов с 64-битными символьными id
//! - `runner` — контракт исполнителя отложенных задач (tokio / явная очередь)
//! - `subscription` — модель подписки и параметры регистрации
//!
//! Каждая публикация доставляется каждой совпавшей подписке ровно один раз
//! на регистрацию, асинхронно и без копирования полезной нагрузки.

/// Индексы, публикация, fan-out и реестр движков.
pub mod broker;
/// Контракт транспортного движка, локальный движок и кластерная заглушка.
pub mod engine;
/// Типы ошибок.
pub mod error;
/// Побайтовый glob-матчер.
pub mod glob;
/// Конверт публикации и представление доставки.
pub mod message;
/// Interned имена каналов.
pub mod name;
/// Исполнители отложенных задач.
pub mod runner;
/// Модель подписки.
pub mod subscription;

// -----------------------------------------------------------------------------
//  Часто используемые публичные типы
// -----------------------------------------------------------------------------

pub use broker::{Broker, BrokerConfig, BrokerStats};
pub use engine::{ClusterEngine, Engine, LocalEngine};
pub use error::{PublishError, SubscribeError, UnsubscribeError};
pub use glob::glob_match;
pub use message::Message;
pub use name::Name;
pub use runner::{QueueRunner, Task, TaskRunner, TokioRunner};
pub use subscription::{
    MessageHandler, SubscribeArgs, Subscription, UnsubscribeHandler,
};
