//! Брокер: три индекса маршрутизации, реестр движков и публикация с
//! раздачей по подписчикам.
//!
//! Всё изменяемое состояние лежит под одной блокировкой («блокировка
//! брокера»): поиски по индексам, мутации списков подписчиков,
//! уведомления движков и цикл раздачи задач доставки. Пользовательские
//! колбэки под блокировкой не выполняются никогда — они уходят в
//! исполнитель задач.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    engine::{ClusterEngine, Engine, LocalEngine},
    error::{PublishError, SubscribeError, UnsubscribeError},
    glob::glob_match,
    message::{submit_delivery, MsgWrapper},
    name::Name,
    runner::{TaskRunner, TokioRunner},
    subscription::{client_key_hash, Channel, SubscribeArgs, Subscription},
};

/// Конфигурация брокера.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Исполнитель отложенных задач (доставки и `on_unsubscribe`).
    pub runner: Arc<dyn TaskRunner>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            runner: Arc::new(TokioRunner),
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("runner", &"<dyn TaskRunner>")
            .finish()
    }
}

/// Снимок счётчиков брокера.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Всего вызовов публикации.
    pub publishes: u64,
    /// Всего поставленных задач доставки.
    pub deliveries: u64,
    /// Публикации, завершившиеся ошибкой (нет подписчиков либо отказ движка).
    pub failed_publishes: u64,
}

/// Ключ dedup-индекса подписок: клиентский хеш + имя канала. В хеш-таблицу
/// уходит только число, имя участвует в проверке равенства — разные каналы
/// с одинаковыми обработчиками не пересекаются.
#[derive(Clone, PartialEq, Eq)]
struct ClientKey {
    hash: u64,
    name: Name,
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Изменяемое состояние под блокировкой брокера.
struct BrokerState {
    /// Точные подписки: имя → канал.
    channels: HashMap<Name, Channel>,
    /// Шаблонные подписки: шаблон → канал.
    patterns: HashMap<Name, Channel>,
    /// Dedup-индекс зарегистрированных клиентов.
    clients: HashMap<ClientKey, Arc<Subscription>>,
    /// Реестр транспортных движков, ключ — адрес движка.
    engines: HashMap<usize, Arc<dyn Engine>>,
    /// Движок по умолчанию для `publish` без явного движка.
    default_engine: Arc<dyn Engine>,
}

/// Внутрипроцессный pub/sub-брокер.
///
/// Одно значение на процесс; потребители и поставщики обращаются к нему
/// через общий `Arc<Broker>`.
pub struct Broker {
    state: Mutex<BrokerState>,
    runner: Arc<dyn TaskRunner>,
    local: Arc<dyn Engine>,
    cluster: Arc<dyn Engine>,
    /// Счётчик всех вызовов публикации.
    publish_count: AtomicU64,
    /// Счётчик поставленных задач доставки.
    delivery_count: AtomicU64,
    /// Счётчик неудачных публикаций.
    send_error_count: AtomicU64,
}

impl Broker {
    /// Создаёт брокер с исполнителем по умолчанию (`tokio::spawn`).
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Создаёт брокер с заданной конфигурацией.
    pub fn with_config(config: BrokerConfig) -> Self {
        let local: Arc<dyn Engine> = Arc::new(LocalEngine);
        let cluster: Arc<dyn Engine> = Arc::new(ClusterEngine);
        Self {
            state: Mutex::new(BrokerState {
                channels: HashMap::new(),
                patterns: HashMap::new(),
                clients: HashMap::new(),
                engines: HashMap::new(),
                default_engine: local.clone(),
            }),
            runner: config.runner,
            local,
            cluster,
            publish_count: AtomicU64::new(0),
            delivery_count: AtomicU64::new(0),
            send_error_count: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    //  Подписки
    // ------------------------------------------------------------------

    /// Регистрирует подписку на канал (точный или шаблонный).
    ///
    /// Повторная регистрация с теми же обработчиками, данными и каналом
    /// возвращает уже существующую подписку: одна `unsubscribe` снимает
    /// одну регистрацию. Нужна множественность — варьируйте udata.
    ///
    /// При отклонении запроса (нет канала или обработчика) переданный
    /// `on_unsubscribe` вызывается один раз до возврата ошибки.
    pub fn subscribe(&self, args: SubscribeArgs) -> Result<Arc<Subscription>, SubscribeError> {
        let SubscribeArgs {
            channel,
            use_pattern,
            on_message,
            on_unsubscribe,
            udata1,
            udata2,
        } = args;

        let (channel, on_message) = match (channel, on_message) {
            (Some(channel), Some(on_message)) => (channel, on_message),
            (channel, _) => {
                let err = if channel.is_none() {
                    SubscribeError::MissingChannel
                } else {
                    SubscribeError::MissingHandler
                };
                tracing::error!("{err}");
                // симметрия: отклонённая регистрация тоже видит свой колбэк
                if let Some(cb) = on_unsubscribe {
                    (*cb)(udata1, udata2);
                }
                return Err(err);
            }
        };

        let key_hash =
            client_key_hash(&on_message, on_unsubscribe.as_ref(), udata1, udata2);
        let key = ClientKey {
            hash: key_hash,
            name: channel.clone(),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;

        // идентичная регистрация уже есть — отдаём её же
        if let Some(existing) = state.clients.get(&key) {
            return Ok(existing.clone());
        }

        let subscription = Arc::new(Subscription {
            on_message,
            on_unsubscribe,
            udata1,
            udata2,
            channel: channel.clone(),
            use_pattern,
            key_hash,
            detached: AtomicBool::new(false),
        });
        state.clients.insert(key, subscription.clone());

        let index = if use_pattern {
            &mut state.patterns
        } else {
            &mut state.channels
        };
        let created = match index.get_mut(&channel) {
            Some(ch) => {
                ch.clients.push(subscription.clone());
                false
            }
            None => {
                index.insert(
                    channel.clone(),
                    Channel {
                        name: channel.clone(),
                        use_pattern,
                        clients: vec![subscription.clone()],
                    },
                );
                true
            }
        };

        if created {
            tracing::debug!(channel = %channel, use_pattern, "channel opened");
            for engine in state.engines.values() {
                engine.subscribe(&channel, use_pattern);
            }
        }
        Ok(subscription)
    }

    /// Ищет существующую подписку по тем же параметрам, что и `subscribe`.
    /// Только поиск: колбэки не вызываются, состояние не меняется.
    ///
    /// Найденный хендл не даёт права на лишнюю `unsubscribe`: отписываться
    /// чаще, чем подписывались, нельзя.
    pub fn find_subscription(&self, args: &SubscribeArgs) -> Option<Arc<Subscription>> {
        let channel = args.channel.as_ref()?;
        let on_message = args.on_message.as_ref()?;
        let hash = client_key_hash(
            on_message,
            args.on_unsubscribe.as_ref(),
            args.udata1,
            args.udata2,
        );
        let key = ClientKey {
            hash,
            name: channel.clone(),
        };
        self.state.lock().clients.get(&key).cloned()
    }

    /// Снимает подписку.
    ///
    /// Доставки в полёте не отменяются — они доработают до конца, у них
    /// свои ссылки. `on_unsubscribe` (если был задан) выполнится ровно один
    /// раз, отложенно, после упорядочивания отписки в брокере.
    pub fn unsubscribe(&self, subscription: &Arc<Subscription>) -> Result<(), UnsubscribeError> {
        let destroyed = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            // переход Live → Detached сериализуется блокировкой брокера:
            // dedup-поиск в subscribe видит либо живую регистрацию, либо
            // уже снятую, промежуточных состояний нет
            if subscription.detached.swap(true, Ordering::Relaxed) {
                return Err(UnsubscribeError::AlreadyUnsubscribed);
            }

            let key = ClientKey {
                hash: subscription.key_hash,
                name: subscription.channel.clone(),
            };
            match state.clients.remove(&key) {
                Some(entry) if Arc::ptr_eq(&entry, subscription) => {}
                _ => {
                    tracing::error!(channel = %subscription.channel, "client index corruption detected");
                    panic!("(zvon) client index corruption detected");
                }
            }

            let index = if subscription.use_pattern {
                &mut state.patterns
            } else {
                &mut state.channels
            };
            let became_empty = {
                let Some(ch) = index.get_mut(&subscription.channel) else {
                    tracing::error!(channel = %subscription.channel, "channel index corruption detected");
                    panic!("(zvon) channel index corruption detected");
                };
                let Some(pos) = ch
                    .clients
                    .iter()
                    .position(|client| Arc::ptr_eq(client, subscription))
                else {
                    tracing::error!(channel = %subscription.channel, "channel index corruption detected");
                    panic!("(zvon) channel index corruption detected");
                };
                ch.clients.remove(pos);
                ch.clients.is_empty()
            };

            if became_empty {
                let Some(ch) = index.remove(&subscription.channel) else {
                    tracing::error!(channel = %subscription.channel, "channel index corruption detected");
                    panic!("(zvon) channel index corruption detected");
                };
                tracing::debug!(channel = %ch.name, use_pattern = ch.use_pattern, "channel destroyed");
                for engine in state.engines.values() {
                    engine.unsubscribe(&ch.name, ch.use_pattern);
                }
                Some(ch)
            } else {
                None
            }
        };

        if subscription.on_unsubscribe.is_some() {
            let client = subscription.clone();
            self.runner.defer(Box::new(move || client.invoke_unsubscribe()));
        }

        // опустевший канал освобождается уже после снятия блокировки
        drop(destroyed);
        Ok(())
    }

    // ------------------------------------------------------------------
    //  Публикация
    // ------------------------------------------------------------------

    /// Публикует сообщение через движок по умолчанию.
    pub fn publish(&self, channel: &Name, payload: Bytes) -> Result<(), PublishError> {
        let engine = { self.state.lock().default_engine.clone() };
        self.dispatch(&engine, channel, payload)
    }

    /// Публикует сообщение через указанный движок.
    pub fn publish_via(
        &self,
        engine: &Arc<dyn Engine>,
        channel: &Name,
        payload: Bytes,
    ) -> Result<(), PublishError> {
        self.dispatch(engine, channel, payload)
    }

    fn dispatch(
        &self,
        engine: &Arc<dyn Engine>,
        channel: &Name,
        payload: Bytes,
    ) -> Result<(), PublishError> {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        let result = engine.publish(self, channel, payload);
        if result.is_err() {
            self.send_error_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Локальная раздача: точное совпадение плюс прогон всех шаблонов через
    /// glob-матчер. На каждую совпавшую подписку под блокировкой ставится
    /// задача доставки с общим конвертом; сами обработчики выполняются уже
    /// без блокировки.
    pub(crate) fn fan_out(&self, channel: &Name, payload: Bytes) -> Result<(), PublishError> {
        let wrapper = Arc::new(MsgWrapper {
            channel: channel.clone(),
            payload,
        });
        let mut scheduled = 0u64;
        {
            let state = self.state.lock();

            if let Some(ch) = state.channels.get(channel) {
                for client in &ch.clients {
                    submit_delivery(self.runner.clone(), client.clone(), wrapper.clone());
                    scheduled += 1;
                }
            }

            for ch in state.patterns.values() {
                if glob_match(channel.as_bytes(), ch.name.as_bytes()) {
                    for client in &ch.clients {
                        submit_delivery(self.runner.clone(), client.clone(), wrapper.clone());
                        scheduled += 1;
                    }
                }
            }
        }
        // начальная ссылка публикации отпускается здесь: если доставок не
        // было, конверт освобождается сразу
        if scheduled == 0 {
            return Err(PublishError::NoSubscribers);
        }
        self.delivery_count.fetch_add(scheduled, Ordering::Relaxed);
        Ok(())
    }

    // ------------------------------------------------------------------
    //  Движки
    // ------------------------------------------------------------------

    /// Регистрирует транспортный движок: с этого момента он получает
    /// уведомления о создании и уничтожении каналов. Повторная регистрация
    /// того же движка — no-op.
    pub fn engine_register(&self, engine: Arc<dyn Engine>) {
        let key = engine_key(&engine);
        self.state.lock().engines.insert(key, engine);
    }

    /// Снимает движок с учёта. Если он был движком по умолчанию, по
    /// умолчанию становится кластерная заглушка — установить новый дефолт
    /// должен сам вызывающий.
    pub fn engine_deregister(&self, engine: &Arc<dyn Engine>) {
        let mut state = self.state.lock();
        state.engines.remove(&engine_key(engine));
        if Arc::ptr_eq(&state.default_engine, engine) {
            state.default_engine = self.cluster.clone();
        }
    }

    /// Назначает движок по умолчанию; `None` возвращает локальную
    /// маршрутизацию.
    pub fn set_default_engine(&self, engine: Option<Arc<dyn Engine>>) {
        let engine = engine.unwrap_or_else(|| self.local.clone());
        self.state.lock().default_engine = engine;
    }

    /// Локальный внутрипроцессный движок этого брокера.
    pub fn local_engine(&self) -> Arc<dyn Engine> {
        self.local.clone()
    }

    /// Кластерная заглушка этого брокера.
    pub fn cluster_engine(&self) -> Arc<dyn Engine> {
        self.cluster.clone()
    }

    // ------------------------------------------------------------------
    //  Наблюдаемость
    // ------------------------------------------------------------------

    /// Текущие значения счётчиков.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            publishes: self.publish_count.load(Ordering::Relaxed),
            deliveries: self.delivery_count.load(Ordering::Relaxed),
            failed_publishes: self.send_error_count.load(Ordering::Relaxed),
        }
    }

    /// Число открытых точных каналов.
    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Число открытых шаблонных каналов.
    pub fn pattern_count(&self) -> usize {
        self.state.lock().patterns.len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Broker")
            .field("channels", &state.channels.len())
            .field("patterns", &state.patterns.len())
            .field("clients", &state.clients.len())
            .field("engines", &state.engines.len())
            .finish()
    }
}

fn engine_key(engine: &Arc<dyn Engine>) -> usize {
    Arc::as_ptr(engine) as *const () as usize
}
