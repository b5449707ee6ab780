//! AmqpClient tests against a real RabbitMQ broker
//!
//! Each test starts its own broker container, so Docker must be available.
//! They are ignored by default:
//!
//! ```bash
//! cargo test -p csv2db-queue --test amqp_tests -- --ignored --nocapture
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use csv2db_queue::{AmqpClient, Delivery, QueueClient, QueueConfig};
use futures::StreamExt;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::rabbitmq::RabbitMq;
use tokio::time::timeout;
use tracing::info;

const QUEUE: &str = "csv2db-test";
const PAYLOAD: &[u8] = br#"{"name":"Alice","email":"alice@example.com"}"#;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,csv2db_queue=debug,lapin=warn")),
        )
        .with_test_writer()
        .try_init();
}

async fn start_broker() -> Result<(ContainerAsync<RabbitMq>, QueueConfig)> {
    let container = RabbitMq::default().start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5672).await?;
    info!(%host, port, "RabbitMQ container started");

    let config = QueueConfig {
        addr: format!("{host}:{port}"),
        user: "guest".to_string(),
        pass: "guest".to_string(),
        queue_name: QUEUE.to_string(),
        prefetch: 1,
    };
    Ok((container, config))
}

async fn next_delivery<D: Delivery>(
    deliveries: &mut csv2db_queue::DeliveryStream<D>,
) -> Result<D> {
    let delivery = timeout(Duration::from_secs(10), deliveries.next())
        .await?
        .expect("consumer closed")?;
    Ok(delivery)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rejected_delivery_is_redelivered() -> Result<()> {
    init_tracing();
    let (_container, config) = start_broker().await?;

    let client = AmqpClient::connect(&config).await?;
    client.declare(QUEUE).await?;
    // Declaring again with the same options is accepted
    client.declare(QUEUE).await?;
    client.publish(QUEUE, PAYLOAD).await?;

    let mut deliveries = client.consume(QUEUE).await?;

    let first = next_delivery(&mut deliveries).await?;
    assert_eq!(first.payload(), PAYLOAD);
    assert!(!first.redelivered());
    first.reject(true).await?;

    let second = next_delivery(&mut deliveries).await?;
    assert_eq!(second.payload(), PAYLOAD);
    assert!(second.redelivered());
    second.ack().await?;

    client.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unacked_delivery_returns_after_disconnect() -> Result<()> {
    init_tracing();
    let (_container, config) = start_broker().await?;

    let producer = AmqpClient::connect(&config).await?;
    producer.declare(QUEUE).await?;
    producer.publish(QUEUE, PAYLOAD).await?;
    producer.close().await?;

    let first_consumer = AmqpClient::connect(&config).await?;
    let mut deliveries = first_consumer.consume(QUEUE).await?;
    let held = next_delivery(&mut deliveries).await?;
    assert!(!held.redelivered());
    drop(held);
    drop(deliveries);
    first_consumer.close().await?;

    let second_consumer = AmqpClient::connect(&config).await?;
    let mut deliveries = second_consumer.consume(QUEUE).await?;
    let delivery = next_delivery(&mut deliveries).await?;
    assert_eq!(delivery.payload(), PAYLOAD);
    assert!(delivery.redelivered());
    delivery.ack().await?;
    second_consumer.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rejected_without_requeue_is_dropped() -> Result<()> {
    init_tracing();
    let (_container, config) = start_broker().await?;

    let client = AmqpClient::connect(&config).await?;
    client.declare(QUEUE).await?;
    client.publish(QUEUE, PAYLOAD).await?;
    client.publish(QUEUE, b"second").await?;

    let mut deliveries = client.consume(QUEUE).await?;
    let first = next_delivery(&mut deliveries).await?;
    assert_eq!(first.payload(), PAYLOAD);
    first.reject(false).await?;

    // The next delivery is the second message, not a retry of the first
    let second = next_delivery(&mut deliveries).await?;
    assert_eq!(second.payload(), b"second");
    assert!(!second.redelivered());
    second.ack().await?;

    client.close().await?;
    Ok(())
}
