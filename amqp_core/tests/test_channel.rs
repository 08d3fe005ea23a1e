use std::{fmt, future::Future, pin::Pin, time::Duration};

use amqp_core::{
    frame::{
        BindOk, BindQueueOk, CloseChannel, CloseChannelOk, ContentHeader, DeclareOk,
        DeclareQueueOk, Deliver, DeleteOk, DeleteQueueOk, Flow, FlowOk, Frame, Method,
        PurgeQueueOk, QosOk, UnbindOk, UnbindQueueOk,
    },
    transport::TransportStatus,
    BasicAckArguments, BasicNackArguments, BasicProperties, BasicRejectArguments, Channel,
    ChannelConfig, Error, ExchangeBindArguments, ExchangeDeclareArguments,
    ExchangeDeleteArguments, QueueBindArguments, QueueDeclareArguments, QueueDeleteArguments,
    QueuePurgeArguments, QueueUnbindArguments,
};
mod common;

use common::{expect_method, setup, WAIT};

type Call = Pin<Box<dyn Future<Output = amqp_core::Result<String>> + Send>>;

/// Box a channel operation, rendering its result with `Debug`.
fn call<F, T>(operation: F) -> Call
where
    F: Future<Output = amqp_core::Result<T>> + Send + 'static,
    T: fmt::Debug + Send + 'static,
{
    Box::pin(async move { operation.await.map(|value| format!("{:?}", value)) })
}

/// One operation, the method it must put on the wire and the broker's answer.
struct Operation {
    call: Call,
    sent: fn(&Method) -> bool,
    reply: Option<Method>,
    expected: &'static str,
}

#[tokio::test]
async fn test_queue_declare() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;
    assert!(channel.is_open());

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            let args = QueueDeclareArguments::new("q1")
                .exclusive(true)
                .auto_delete(true)
                .finish();
            channel.queue_declare(args).await
        })
    };

    let (channel_id, method) = expect_method(&broker).await;
    assert_eq!(channel.channel_id(), channel_id);
    match method {
        Method::DeclareQueue(declare) => {
            assert_eq!("q1", declare.queue.to_string());
            assert!(!declare.durable());
            assert!(declare.exclusive());
            assert!(declare.auto_delete());
        }
        other => panic!("unexpected {}", other),
    }
    broker
        .send_method(
            channel_id,
            DeclareQueueOk {
                queue: "q1".try_into().unwrap(),
                message_count: 0,
                consumer_count: 0,
            },
        )
        .unwrap();

    let (queue, message_count, consumer_count) = declare.await.unwrap().unwrap().unwrap();
    assert_eq!("q1", queue);
    assert_eq!(0, message_count);
    assert_eq!(0, consumer_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_synchronous_methods_are_serialized() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;

    let first = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .queue_declare(QueueDeclareArguments::new("first"))
                .await
        })
    };
    let (channel_id, method) = expect_method(&broker).await;
    assert!(matches!(method, Method::DeclareQueue(_)));

    let second = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .exchange_declare(ExchangeDeclareArguments::new("x1", "fanout"))
                .await
        })
    };
    // the second request waits for the reply of the first one
    assert!(broker.is_idle(Duration::from_millis(200)).await);

    broker
        .send_method(
            channel_id,
            DeclareQueueOk {
                queue: "first".try_into().unwrap(),
                message_count: 3,
                consumer_count: 1,
            },
        )
        .unwrap();
    let (queue, message_count, consumer_count) = first.await.unwrap().unwrap().unwrap();
    assert_eq!(("first", 3, 1), (queue.as_str(), message_count, consumer_count));

    let (_, method) = expect_method(&broker).await;
    match method {
        Method::Declare(declare) => {
            assert_eq!("x1", declare.exchange.to_string());
            assert_eq!("fanout", declare.typ.to_string());
        }
        other => panic!("unexpected {}", other),
    }
    broker.send_method(channel_id, DeclareOk).unwrap();
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_close_then_use() {
    let (manager, broker, channel) = setup(ChannelConfig::default()).await;
    let channel_id = channel.channel_id();

    let server = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let (id, method) = expect_method(&broker).await;
            match method {
                Method::CloseChannel(close) => assert_eq!(200, close.reply_code),
                other => panic!("unexpected {}", other),
            }
            broker.send_method(id, CloseChannelOk).unwrap();
        })
    };
    channel.close().await.unwrap();
    server.await.unwrap();

    assert!(!channel.is_open());
    assert!(!broker.is_channel_open(channel_id));
    assert!(manager.is_empty());

    assert!(matches!(
        channel.basic_ack(BasicAckArguments::new(1, false)).await,
        Err(Error::ChannelClosed(_))
    ));
    assert!(matches!(
        channel.queue_declare(QueueDeclareArguments::new("q1")).await,
        Err(Error::ChannelClosed(_))
    ));
    // second close is a no-op
    channel.close().await.unwrap();
    assert!(broker.is_idle(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_server_close_unblocks_outstanding_request() {
    let (manager, broker, channel) = setup(ChannelConfig::default()).await;

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .queue_declare(QueueDeclareArguments::new("q1").passive(true).finish())
                .await
        })
    };
    let (channel_id, method) = expect_method(&broker).await;
    assert!(matches!(method, Method::DeclareQueue(_)));

    broker
        .send_method(
            channel_id,
            CloseChannel::new(404, "NOT_FOUND - no queue 'q1'".try_into().unwrap(), 50, 10),
        )
        .unwrap();

    match declare.await.unwrap() {
        Err(Error::ChannelClosedByServer {
            reply_code,
            class_id,
            method_id,
            ..
        }) => assert_eq!((404, 50, 10), (reply_code, class_id, method_id)),
        other => panic!("unexpected {:?}", other),
    }
    let (_, method) = expect_method(&broker).await;
    assert!(matches!(method, Method::CloseChannelOk(_)));
    assert!(!channel.is_open());

    // teardown finishes on the frame task
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.is_empty());
    assert!(!broker.is_channel_open(channel_id));
}

#[tokio::test]
async fn test_unexpected_reply() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .queue_declare(QueueDeclareArguments::new("q1"))
                .await
        })
    };
    let (channel_id, _) = expect_method(&broker).await;
    broker.send_method(channel_id, BindQueueOk).unwrap();

    match declare.await.unwrap() {
        Err(Error::UnexpectedReply(name)) => assert_eq!("queue.bind-ok", name),
        other => panic!("unexpected {:?}", other),
    }
    // the channel stays usable
    assert!(channel.is_open());
    let qos = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.basic_qos(Default::default()).await })
    };
    let (_, method) = expect_method(&broker).await;
    assert!(matches!(method, Method::Qos(_)));
    broker.send_method(channel_id, QosOk).unwrap();
    qos.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reply_without_outstanding_request_is_discarded() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;
    let channel_id = channel.channel_id();

    broker.send_method(channel_id, QosOk).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(channel.is_open());

    let purge = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.queue_purge(QueuePurgeArguments::new("q1")).await })
    };
    let (_, method) = expect_method(&broker).await;
    assert!(matches!(method, Method::PurgeQueue(_)));
    broker
        .send_method(channel_id, PurgeQueueOk { message_count: 7 })
        .unwrap();
    assert_eq!(Some(7), purge.await.unwrap().unwrap());
}

#[tokio::test]
async fn test_rpc_timeout_shuts_channel_down() {
    let config = ChannelConfig::default()
        .rpc_timeout(Some(Duration::from_millis(200)))
        .finish();
    let (manager, broker, channel) = setup(config).await;
    let channel_id = channel.channel_id();

    let result = channel.queue_declare(QueueDeclareArguments::new("q1")).await;
    assert!(matches!(result, Err(Error::RpcTimeout(_))), "{:?}", result);

    // a late reply has nowhere to go
    assert!(!channel.is_open());
    assert!(!broker.is_channel_open(channel_id));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_server_flow_is_acknowledged() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;
    let channel_id = channel.channel_id();

    broker.send_method(channel_id, Flow { active: false }).unwrap();
    let (_, method) = expect_method(&broker).await;
    match method {
        Method::FlowOk(flow_ok) => assert!(!flow_ok.active),
        other => panic!("unexpected {}", other),
    }

    let flow = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.channel_flow(true).await })
    };
    let (_, method) = expect_method(&broker).await;
    assert!(matches!(method, Method::Flow(Flow { active: true })));
    broker.send_method(channel_id, FlowOk { active: true }).unwrap();
    assert!(flow.await.unwrap().unwrap());
}

#[tokio::test]
async fn test_receive_error_fails_outstanding_request() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;
    let channel_id = channel.channel_id();

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .queue_declare(QueueDeclareArguments::new("q1"))
                .await
        })
    };
    expect_method(&broker).await;
    broker
        .inject_status(channel_id, TransportStatus::IoError)
        .unwrap();
    assert!(matches!(
        declare.await.unwrap(),
        Err(Error::Transport(TransportStatus::IoError))
    ));
    assert!(channel.is_open());

    // a lost handle takes the channel down
    broker
        .inject_status(channel_id, TransportStatus::InvalidHandle)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!channel.is_open());
}

#[tokio::test]
async fn test_send_failure_is_returned() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;

    broker.fail_sends(Some(TransportStatus::QueueFull));
    assert!(matches!(
        channel.basic_ack(BasicAckArguments::new(1, true)).await,
        Err(Error::Transport(TransportStatus::QueueFull))
    ));
    assert!(matches!(
        channel.queue_declare(QueueDeclareArguments::new("q1")).await,
        Err(Error::Transport(TransportStatus::QueueFull))
    ));

    broker.fail_sends(None);
    channel
        .basic_ack(BasicAckArguments::new(1, true))
        .await
        .unwrap();
    let (_, method) = expect_method(&broker).await;
    match method {
        Method::Ack(ack) => assert_eq!((1, true), (ack.delivery_tag, ack.multiple)),
        other => panic!("unexpected {}", other),
    }
}

fn operations(channel: &Channel) -> Vec<Operation> {
    vec![
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .queue_bind(QueueBindArguments::new("q1", "amq.topic", "a.*"))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::BindQueue(bind)
                    if bind.queue.to_string() == "q1"
                        && bind.exchange.to_string() == "amq.topic"
                        && bind.routing_key.to_string() == "a.*")
            },
            reply: Some(BindQueueOk.into()),
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .queue_unbind(QueueUnbindArguments::new("q1", "amq.topic", "a.*"))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::UnbindQueue(unbind)
                    if unbind.queue.to_string() == "q1"
                        && unbind.routing_key.to_string() == "a.*")
            },
            reply: Some(UnbindQueueOk.into()),
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move { channel.queue_delete(QueueDeleteArguments::new("q1")).await }
            }),
            sent: |method: &Method| {
                matches!(method, Method::DeleteQueue(delete) if delete.queue.to_string() == "q1")
            },
            reply: Some(DeleteQueueOk { message_count: 5 }.into()),
            expected: "Some(5)",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move { channel.queue_declare_passive("q1").await }
            }),
            sent: |method: &Method| {
                matches!(method, Method::DeclareQueue(declare)
                    if declare.queue.to_string() == "q1" && declare.passive())
            },
            reply: Some(
                DeclareQueueOk {
                    queue: "q1".try_into().unwrap(),
                    message_count: 2,
                    consumer_count: 1,
                }
                .into(),
            ),
            expected: "(\"q1\", 2, 1)",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .exchange_delete(ExchangeDeleteArguments::new("x1"))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::Delete(delete) if delete.exchange.to_string() == "x1")
            },
            reply: Some(DeleteOk.into()),
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .exchange_bind(ExchangeBindArguments::new("x2", "x1", "k"))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::Bind(bind)
                    if bind.destination.to_string() == "x2"
                        && bind.source.to_string() == "x1"
                        && bind.routing_key.to_string() == "k")
            },
            reply: Some(BindOk.into()),
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .exchange_unbind(ExchangeBindArguments::new("x2", "x1", "k"))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::Unbind(unbind)
                    if unbind.destination.to_string() == "x2"
                        && unbind.source.to_string() == "x1")
            },
            reply: Some(UnbindOk.into()),
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move { channel.channel_flow(false).await }
            }),
            sent: |method: &Method| matches!(method, Method::Flow(Flow { active: false })),
            reply: Some(FlowOk { active: false }.into()),
            expected: "false",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .basic_reject(BasicRejectArguments::new(3, false))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::Reject(reject)
                    if reject.delivery_tag == 3 && !reject.requeue)
            },
            reply: None,
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move {
                    channel
                        .basic_nack(BasicNackArguments::new(4, true, true))
                        .await
                }
            }),
            sent: |method: &Method| {
                matches!(method, Method::Nack(nack)
                    if nack.delivery_tag == 4 && nack.multiple() && nack.requeue())
            },
            reply: None,
            expected: "()",
        },
        Operation {
            call: call({
                let channel = channel.clone();
                async move { channel.basic_recover_async(true).await }
            }),
            sent: |method: &Method| matches!(method, Method::RecoverAsync(recover) if recover.requeue),
            reply: None,
            expected: "()",
        },
    ]
}

#[tokio::test]
async fn test_operations_on_the_wire() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;

    for (index, operation) in operations(&channel).into_iter().enumerate() {
        let handle = tokio::spawn(operation.call);
        let (channel_id, method) = expect_method(&broker).await;
        assert!((operation.sent)(&method), "operation {} sent {}", index, method);
        if let Some(reply) = operation.reply {
            broker.send_method(channel_id, reply).unwrap();
        }
        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(Ok(operation.expected.to_string()), result.map_err(|err| err.to_string()));
    }
    assert!(channel.is_open());
    assert!(broker.is_idle(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_mismatched_reply_names_the_received_method() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;
    let cases: Vec<(Call, Method, &str)> = vec![
        (
            call({
                let channel = channel.clone();
                async move {
                    channel
                        .queue_bind(QueueBindArguments::new("q1", "amq.topic", "a.*"))
                        .await
                }
            }),
            DeleteOk.into(),
            "exchange.delete-ok",
        ),
        (
            call({
                let channel = channel.clone();
                async move {
                    channel
                        .exchange_bind(ExchangeBindArguments::new("x2", "x1", "k"))
                        .await
                }
            }),
            UnbindQueueOk.into(),
            "queue.unbind-ok",
        ),
        (
            call({
                let channel = channel.clone();
                async move { channel.channel_flow(true).await }
            }),
            QosOk.into(),
            "basic.qos-ok",
        ),
    ];

    for (operation, reply, expected) in cases {
        let handle = tokio::spawn(operation);
        let (channel_id, _) = expect_method(&broker).await;
        broker.send_method(channel_id, reply).unwrap();
        match tokio::time::timeout(WAIT, handle).await.unwrap().unwrap() {
            Err(Error::UnexpectedReply(name)) => assert_eq!(expected, name),
            other => panic!("unexpected {:?}", other),
        }
        assert!(channel.is_open());
    }
}

#[tokio::test]
async fn test_huge_body_size_fails_outstanding_request() {
    let (_manager, broker, channel) = setup(ChannelConfig::default()).await;

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .queue_declare(QueueDeclareArguments::new("q1"))
                .await
        })
    };
    let (channel_id, _) = expect_method(&broker).await;

    broker.send_method(channel_id, Deliver::default()).unwrap();
    let header = ContentHeader::new(u64::MAX, BasicProperties::default());
    broker
        .send_frame(channel_id, Frame::from_content_header(&header).unwrap())
        .unwrap();
    // arrives while the body is still expected
    broker
        .send_method(
            channel_id,
            DeclareQueueOk {
                queue: "q1".try_into().unwrap(),
                message_count: 0,
                consumer_count: 0,
            },
        )
        .unwrap();

    match tokio::time::timeout(WAIT, declare).await.unwrap().unwrap() {
        Err(Error::UnexpectedFrame(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(channel.is_open());

    // the frame task keeps serving the channel
    let purge = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.queue_purge(QueuePurgeArguments::new("q1")).await })
    };
    expect_method(&broker).await;
    broker
        .send_method(channel_id, PurgeQueueOk { message_count: 1 })
        .unwrap();
    assert_eq!(Some(1), purge.await.unwrap().unwrap());
}
