//! Модель подписки: канал, клиент (подписка) и параметры регистрации.

use std::{
    fmt,
    hash::Hasher,
    sync::{atomic::AtomicBool, Arc},
};

use siphasher::sip::SipHasher;

use crate::{message::Message, name::Name};

/// Обработчик входящего сообщения. Вызывается исполнителем задач вне
/// блокировки брокера; ссылка на сообщение живёт только на время вызова
/// (продлить доставку можно через [`Message::defer`]).
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Обработчик полного снятия подписки. Получает оба пользовательских слова.
pub type UnsubscribeHandler = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Параметры `subscribe`/`find_subscription`.
///
/// Заполняются через `..Default::default()`:
///
/// ```ignore
/// broker.subscribe(SubscribeArgs {
///     channel: Some(Name::new("news")),
///     on_message: Some(handler.clone()),
///     ..Default::default()
/// })?;
/// ```
#[derive(Clone, Default)]
pub struct SubscribeArgs {
    /// Имя канала (обязательное).
    pub channel: Option<Name>,
    /// Трактовать имя как glob-шаблон.
    pub use_pattern: bool,
    /// Обработчик сообщений (обязательный).
    pub on_message: Option<MessageHandler>,
    /// Необязательный обработчик снятия подписки. Вызывается ровно один
    /// раз за время жизни принятой регистрации; для отклонённой — один
    /// раз синхронно до возврата ошибки.
    pub on_unsubscribe: Option<UnsubscribeHandler>,
    /// Непрозрачное пользовательское слово №1.
    pub udata1: u64,
    /// Непрозрачное пользовательское слово №2. Два слова позволяют часто
    /// обходиться без дополнительной аллокации.
    pub udata2: u64,
}

impl fmt::Debug for SubscribeArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeArgs")
            .field("channel", &self.channel)
            .field("use_pattern", &self.use_pattern)
            .field("on_message", &self.on_message.as_ref().map(|_| "<fn>"))
            .field("on_unsubscribe", &self.on_unsubscribe.as_ref().map(|_| "<fn>"))
            .field("udata1", &self.udata1)
            .field("udata2", &self.udata2)
            .finish()
    }
}

/// Одна принятая регистрация: обработчики, пользовательские данные и
/// обратная ссылка на канал (пара `(use_pattern, name)`, разрешается
/// только под блокировкой брокера).
///
/// Живёт в `Arc`: членство в индексах держит подписку, каждая доставка в
/// полёте и отложенный `on_unsubscribe` держат свои клоны; память
/// освобождается, когда падает последний.
pub struct Subscription {
    pub(crate) on_message: MessageHandler,
    pub(crate) on_unsubscribe: Option<UnsubscribeHandler>,
    pub(crate) udata1: u64,
    pub(crate) udata2: u64,
    pub(crate) channel: Name,
    pub(crate) use_pattern: bool,
    /// Клиентский хеш, посчитанный при регистрации (ключ dedup-индекса).
    pub(crate) key_hash: u64,
    /// Защита от повторной отписки. Меняется только под блокировкой
    /// брокера — вместе с удалением записей из индексов.
    pub(crate) detached: AtomicBool,
}

impl Subscription {
    /// Имя канала, на который оформлена подписка.
    pub fn channel(&self) -> &Name {
        &self.channel
    }

    /// Является ли подписка шаблонной.
    pub fn is_pattern(&self) -> bool {
        self.use_pattern
    }

    pub fn udata1(&self) -> u64 {
        self.udata1
    }

    pub fn udata2(&self) -> u64 {
        self.udata2
    }

    pub(crate) fn invoke_message(&self, msg: &Message) {
        (*self.on_message)(msg);
    }

    pub(crate) fn invoke_unsubscribe(&self) {
        if let Some(cb) = &self.on_unsubscribe {
            (**cb)(self.udata1, self.udata2);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("use_pattern", &self.use_pattern)
            .field("udata1", &self.udata1)
            .field("udata2", &self.udata2)
            .finish()
    }
}

/// Канал: именованная точка маршрутизации со списком подписчиков.
/// Хранится по значению в своём индексе; список сохраняет порядок
/// регистрации — в этом порядке раздаются задачи доставки.
#[derive(Debug)]
pub(crate) struct Channel {
    pub(crate) name: Name,
    pub(crate) use_pattern: bool,
    pub(crate) clients: Vec<Arc<Subscription>>,
}

/// Детеминированный хеш идентичности клиента: одинаковые обработчики с
/// одинаковыми пользовательскими данными сталкиваются намеренно — так
/// работает дедупликация подписок. Имя канала в хеш не входит, оно
/// участвует в равенстве ключа dedup-индекса.
pub(crate) fn client_key_hash(
    on_message: &MessageHandler,
    on_unsubscribe: Option<&UnsubscribeHandler>,
    udata1: u64,
    udata2: u64,
) -> u64 {
    let mut hasher = SipHasher::new();
    hasher.write_usize(Arc::as_ptr(on_message) as *const () as usize);
    hasher.write_usize(
        on_unsubscribe
            .map(|cb| Arc::as_ptr(cb) as *const () as usize)
            .unwrap_or(0),
    );
    hasher.write_u64(udata1);
    hasher.write_u64(udata2);
    hasher.finish()
}
