//! Сообщение в полёте: общий refcounted конверт одной публикации и
//! переходное представление, которое видит обработчик.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    name::Name,
    runner::{Task, TaskRunner},
    subscription::Subscription,
};

/// Тело одной локальной публикации, разделяемое всеми её доставками.
/// Имя канала и полезная нагрузка держатся по ссылке — fan-out не копирует
/// байты ни разу.
#[derive(Debug)]
pub(crate) struct MsgWrapper {
    pub(crate) channel: Name,
    pub(crate) payload: Bytes,
}

/// Представление доставки, передаваемое в `on_message`.
///
/// Живёт только на время вызова обработчика; удерживать его дольше нельзя.
/// Единственный способ продлить доставку — [`Message::defer`].
pub struct Message {
    pub(crate) wrapper: Arc<MsgWrapper>,
    pub(crate) subscription: Arc<Subscription>,
    pub(crate) runner: Arc<dyn TaskRunner>,
}

impl Message {
    /// Канал, в который было опубликовано сообщение.
    pub fn channel(&self) -> &Name {
        &self.wrapper.channel
    }

    /// Полезная нагрузка. Клонирование `Bytes` — это +1 к счётчику ссылок,
    /// байты не копируются.
    pub fn payload(&self) -> &Bytes {
        &self.wrapper.payload
    }

    /// Подписка, которой адресована эта доставка.
    pub fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }

    /// Пользовательское слово №1 подписки.
    pub fn udata1(&self) -> u64 {
        self.subscription.udata1
    }

    /// Пользовательское слово №2 подписки.
    pub fn udata2(&self) -> u64 {
        self.subscription.udata2
    }

    /// Ставит эту же доставку в очередь ещё раз: ровно один дополнительный
    /// вызов обработчика с тем же конвертом.
    ///
    /// Допустимо только изнутри `on_message`; после вызова обработчик
    /// должен сразу вернуть управление — повторный вызов может идти
    /// параллельно.
    pub fn defer(&self) {
        submit_delivery(
            self.runner.clone(),
            self.subscription.clone(),
            self.wrapper.clone(),
        );
    }
}

/// Собирает задачу доставки и отдаёт её исполнителю. Клоны `Arc`
/// внутри задачи — это и есть ссылки доставки на конверт и подписку;
/// обе отпускаются по завершении обработчика.
pub(crate) fn submit_delivery(
    runner: Arc<dyn TaskRunner>,
    subscription: Arc<Subscription>,
    wrapper: Arc<MsgWrapper>,
) {
    let task_runner = runner.clone();
    let task: Task = Box::new(move || {
        let msg = Message {
            wrapper,
            subscription,
            runner: task_runner,
        };
        msg.subscription.invoke_message(&msg);
    });
    runner.defer(task);
}
