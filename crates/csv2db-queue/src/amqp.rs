//! RabbitMQ client over lapin
//!
//! One connection and one channel per process. The channel is shared by all
//! workers; lapin serializes frames internally, so concurrent publishes and
//! a shared consumer stream are safe.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, info};

use csv2db_common::message::CONTENT_TYPE;

use crate::client::{Delivery, DeliveryStream, QueueClient};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// AMQP delivery mode 2: the broker writes the message to disk.
const PERSISTENT: u8 = 2;

/// Reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

pub struct AmqpClient {
    connection: Connection,
    channel: Channel,
    consumer_tag: String,
}

impl AmqpClient {
    /// Dial the broker and open the shared channel.
    ///
    /// Applies `config.prefetch` as the channel QoS when it is non-zero.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let connection =
            Connection::connect(&config.connection_string(), ConnectionProperties::default())
                .await
                .map_err(QueueError::Connect)?;

        let channel = connection.create_channel().await?;

        if config.prefetch > 0 {
            channel
                .basic_qos(config.prefetch, BasicQosOptions::default())
                .await?;
        }

        info!(addr = %config.addr, prefetch = config.prefetch, "Connected to queue service");

        Ok(Self {
            connection,
            channel,
            consumer_tag: format!("csv2db-{}", std::process::id()),
        })
    }

    /// Close the channel, then the connection.
    ///
    /// Deliveries still unacknowledged at this point are redelivered by the broker.
    pub async fn close(&self) -> QueueResult<()> {
        self.channel.close(REPLY_SUCCESS, "shutdown").await?;
        self.connection.close(REPLY_SUCCESS, "shutdown").await?;
        debug!("Queue connection closed");
        Ok(())
    }
}

/// Durable, shared and kept when the last consumer leaves.
fn declare_options() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        exclusive: false,
        auto_delete: false,
        ..QueueDeclareOptions::default()
    }
}

fn publish_properties() -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(PERSISTENT)
        .with_content_type(CONTENT_TYPE.into())
}

/// Manual acknowledgement: deliveries stay unacked until terminated.
fn consume_options() -> BasicConsumeOptions {
    BasicConsumeOptions {
        no_ack: false,
        ..BasicConsumeOptions::default()
    }
}

#[async_trait]
impl QueueClient for AmqpClient {
    type Delivery = AmqpDelivery;

    async fn declare(&self, queue: &str) -> QueueResult<()> {
        let declared = self
            .channel
            .queue_declare(queue, declare_options(), FieldTable::default())
            .await?;

        info!(
            queue = declared.name().as_str(),
            messages = declared.message_count(),
            consumers = declared.consumer_count(),
            "Queue declared"
        );
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()> {
        // Default exchange routes by queue name. Publisher confirms are not
        // enabled, so the returned confirmation resolves immediately.
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                publish_properties(),
            )
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> QueueResult<DeliveryStream<AmqpDelivery>> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                consume_options(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag = %self.consumer_tag, "Consuming queue");

        Ok(consumer
            .map(|delivery| delivery.map(AmqpDelivery).map_err(QueueError::from))
            .boxed())
    }
}

/// Delivery received over AMQP.
pub struct AmqpDelivery(lapin::message::Delivery);

#[async_trait]
impl Delivery for AmqpDelivery {
    fn tag(&self) -> u64 {
        self.0.delivery_tag
    }

    fn payload(&self) -> &[u8] {
        &self.0.data
    }

    fn redelivered(&self) -> bool {
        self.0.redelivered
    }

    async fn ack(self) -> QueueResult<()> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(self, requeue: bool) -> QueueResult<()> {
        self.0.reject(BasicRejectOptions { requeue }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_queue_survives_restarts_and_consumers() {
        let options = declare_options();
        assert!(options.durable);
        assert!(!options.exclusive);
        assert!(!options.auto_delete);
        assert!(!options.passive);
    }

    #[test]
    fn test_published_messages_are_persistent_json() {
        let properties = publish_properties();
        assert_eq!(*properties.delivery_mode(), Some(2));
        assert_eq!(
            properties.content_type().as_ref().map(|t| t.as_str()),
            Some("application/json")
        );
    }

    #[test]
    fn test_consumer_acknowledges_manually() {
        let options = consume_options();
        assert!(!options.no_ack);
        assert!(!options.exclusive);
    }
}
