//! Механизм отложенного выполнения: каждая доставка и каждый
//! `on_unsubscribe`-колбэк уходят во внешний исполнитель задач и никогда
//! не выполняются под блокировкой брокера.

use std::{collections::VecDeque, fmt};

use parking_lot::Mutex;

/// Отложенная задача.
pub type Task = Box<dyn FnOnce() + Send>;

/// Контракт исполнителя: поставить задачу в очередь на асинхронное
/// выполнение. Гарантия одна — задача когда-нибудь выполнится ровно один
/// раз; порядок между задачами исполнитель выбирает сам.
pub trait TaskRunner: Send + Sync {
    fn defer(&self, task: Task);
}

/// Исполнитель по умолчанию: `tokio::spawn`.
///
/// Требует запущенного tokio-рантайма в момент доставки (то есть при
/// `publish`/`unsubscribe`), иначе `tokio::spawn` паникует.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TaskRunner for TokioRunner {
    fn defer(&self, task: Task) {
        tokio::spawn(async move { task() });
    }
}

/// Исполнитель с явной FIFO-очередью: задачи копятся до вызова
/// [`QueueRunner::run_pending`]. Детерминирован, не требует рантайма —
/// удобен в тестах и у встраивающих без tokio.
#[derive(Default)]
pub struct QueueRunner {
    queue: Mutex<VecDeque<Task>>,
}

impl QueueRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Выполняет все накопленные задачи (включая те, что поставили сами
    /// задачи, например через `defer` доставки). Возвращает число
    /// выполненных задач.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // очередь отпускается перед запуском: задача может ставить новые
            let task = self.queue.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Число задач, ожидающих выполнения.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl TaskRunner for QueueRunner {
    fn defer(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

impl fmt::Debug for QueueRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueRunner")
            .field("pending", &self.pending())
            .finish()
    }
}
