//! Drive a channel against a scripted in-process broker.
use std::sync::Arc;

use amqp_core::{
    frame::{CloseChannelOk, ConsumeOk, DeclareQueueOk, Deliver, Method, OpenChannelOk},
    transport::mem::{BrokerHandle, MemoryTransport},
    BasicConsumeArguments, BasicProperties, ChannelConfig, ChannelManager, DefaultConsumer,
    QueueDeclareArguments, WorkService,
};
use tokio::time;
use tracing::Level;

/// Answer every synchronous method the demo sends, then deliver one message.
async fn serve(broker: BrokerHandle) {
    let wait = time::Duration::from_secs(5);
    while let Some((channel_id, method)) = broker.recv_method(wait).await {
        let sent = match method {
            Method::OpenChannel(_) => broker.send_method(channel_id, OpenChannelOk::default()),
            Method::DeclareQueue(declare) => broker.send_method(
                channel_id,
                DeclareQueueOk {
                    queue: declare.queue,
                    message_count: 0,
                    consumer_count: 0,
                },
            ),
            Method::Consume(consume) => {
                let consumer_tag = consume.consumer_tag;
                broker
                    .send_method(
                        channel_id,
                        ConsumeOk {
                            consumer_tag: consumer_tag.clone(),
                        },
                    )
                    .and_then(|_| {
                        broker.send_content(
                            channel_id,
                            Deliver {
                                consumer_tag,
                                delivery_tag: 1,
                                redelivered: false,
                                exchange: "amq.direct".try_into().unwrap(),
                                routing_key: "demo".try_into().unwrap(),
                            },
                            BasicProperties::default()
                                .with_content_type("text/plain")
                                .finish(),
                            b"hello from the loopback broker",
                        )
                    })
            }
            Method::CloseChannel(_) => broker.send_method(channel_id, CloseChannelOk),
            _ => Ok(()),
        };
        sent.unwrap();
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() {
    // construct a subscriber that prints formatted traces to stdout
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let (transport, broker) = MemoryTransport::new(2047);
    tokio::spawn(serve(broker));

    let manager = ChannelManager::new(
        Arc::new(transport),
        WorkService::new().unwrap(),
        ChannelConfig::default(),
    );
    let channel = manager.create_channel().await.unwrap();

    let (queue_name, _, _) = channel
        .queue_declare(QueueDeclareArguments::new("demo"))
        .await
        .unwrap()
        .unwrap();

    let args = BasicConsumeArguments::new(&queue_name, "demo_consumer")
        .no_ack(true)
        .finish();
    channel
        .basic_consume(Arc::new(DefaultConsumer), args)
        .await
        .unwrap();

    // let the consumer log the delivery
    time::sleep(time::Duration::from_millis(500)).await;

    channel.close().await.unwrap();
}
