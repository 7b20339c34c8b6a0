use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use tokio::{
    sync::mpsc,
    time::{timeout, Duration},
};

use zvon::{Broker, Message, MessageHandler, Name, PublishError, SubscribeArgs};

/// Включает захват логов брокера в тестовом выводе (повторные вызовы — no-op).
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn forwarding_handler(tx: mpsc::UnboundedSender<(Name, Bytes)>) -> MessageHandler {
    Arc::new(move |msg: &Message| {
        let _ = tx.send((msg.channel().clone(), msg.payload().clone()));
    })
}

async fn recv_one(rx: &mut mpsc::UnboundedReceiver<(Name, Bytes)>) -> (Name, Bytes) {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

/// Тест проверяет реальный сценарий использования: точная подписка на
/// пользовательские уведомления и шаблонная на админские события, доставка
/// через настоящий tokio-исполнитель.
#[tokio::test]
async fn test_exact_and_pattern_end_to_end() {
    init_tracing();
    let broker = Broker::new();

    let (user_tx, mut user_rx) = mpsc::unbounded_channel();
    let (admin_tx, mut admin_rx) = mpsc::unbounded_channel();

    broker
        .subscribe(SubscribeArgs {
            channel: Some(Name::new("user.notifications")),
            on_message: Some(forwarding_handler(user_tx)),
            ..Default::default()
        })
        .unwrap();
    broker
        .subscribe(SubscribeArgs {
            channel: Some(Name::new("admin.*")),
            use_pattern: true,
            on_message: Some(forwarding_handler(admin_tx)),
            ..Default::default()
        })
        .unwrap();

    broker
        .publish(
            &Name::new("user.notifications"),
            Bytes::from_static(b"New message arrived"),
        )
        .unwrap();
    broker
        .publish(
            &Name::new("admin.security"),
            Bytes::from_static(b"Failed login attempt"),
        )
        .unwrap();
    broker
        .publish(
            &Name::new("admin.audit"),
            Bytes::from_static(b"User data accessed"),
        )
        .unwrap();

    let (channel, payload) = recv_one(&mut user_rx).await;
    assert_eq!(channel, Name::new("user.notifications"));
    assert_eq!(payload.as_ref(), b"New message arrived");

    let (c1, _) = recv_one(&mut admin_rx).await;
    let (c2, _) = recv_one(&mut admin_rx).await;
    assert_eq!(c1, Name::new("admin.security"));
    assert_eq!(c2, Name::new("admin.audit"));

    // канал без подписчиков — публикация отвергается
    assert_eq!(
        broker.publish(&Name::new("nobody.home"), Bytes::from_static(b"x")),
        Err(PublishError::NoSubscribers)
    );
}

/// Тест проверяет `defer` на настоящем исполнителе: обработчик, один раз
/// перепоставивший доставку, выполняется ровно дважды.
#[tokio::test]
async fn test_defer_end_to_end() {
    init_tracing();
    let broker = Broker::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_in = calls.clone();
    broker
        .subscribe(SubscribeArgs {
            channel: Some(Name::new("jobs")),
            on_message: Some(Arc::new(move |msg: &Message| {
                let call = calls_in.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    msg.defer();
                }
                let _ = tx.send(call);
            })),
            ..Default::default()
        })
        .unwrap();

    broker
        .publish(&Name::new("jobs"), Bytes::from_static(b"payload"))
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let call = timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timed out")
            .expect("closed");
        seen.push(call);
    }
    assert_eq!(seen, vec![0, 1]);

    // третьего вызова нет
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Тест проверяет, что `on_unsubscribe` выполняется ровно один раз и уже
/// после отписки, с теми же пользовательскими словами.
#[tokio::test]
async fn test_unsubscribe_callback_end_to_end() {
    init_tracing();
    let broker = Broker::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sub = broker
        .subscribe(SubscribeArgs {
            channel: Some(Name::new("ephemeral")),
            on_message: Some(Arc::new(|_msg: &Message| {})),
            on_unsubscribe: Some(Arc::new(move |u1, u2| {
                let _ = tx.send((u1, u2));
            })),
            udata1: 11,
            udata2: 22,
            ..Default::default()
        })
        .unwrap();

    broker.unsubscribe(&sub).unwrap();

    let fired = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("timed out")
        .expect("closed");
    assert_eq!(fired, (11, 22));
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    assert_eq!(broker.channel_count(), 0);
}

/// Тест проверяет доставку под конкуренцией: несколько задач публикуют в
/// один канал, каждая публикация доставляется ровно один раз.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers() {
    init_tracing();
    let broker = Arc::new(Broker::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    broker
        .subscribe(SubscribeArgs {
            channel: Some(Name::new("firehose")),
            on_message: Some(forwarding_handler(tx)),
            ..Default::default()
        })
        .unwrap();

    let publishers: Vec<_> = (0..8)
        .map(|i| {
            let broker = broker.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    broker
                        .publish(&Name::new("firehose"), Bytes::from(vec![i as u8]))
                        .unwrap();
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let mut received = 0;
    while received < 200 {
        recv_one(&mut rx).await;
        received += 1;
    }
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    assert_eq!(broker.stats().deliveries, 200);
}
