//! RabbitMQ broker connection using lapin.
//!
//! A single `AmqpConnection` owns one AMQP connection and one channel shared
//! by every queue the worker consumes.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, ChannelState, Connection, ConnectionProperties,
};
use tracing::{error, info, warn};

use super::{Broker, BrokerError, Delivery, DeliveryStream};

/// RabbitMQ connection with its single channel.
pub struct AmqpConnection {
    connection: Connection,
    channel: Channel,
    closed: AtomicBool,
}

impl AmqpConnection {
    /// Connect to RabbitMQ and open the channel.
    ///
    /// If the channel cannot be created the connection is closed before the
    /// error is returned.
    pub async fn open(url: &str) -> Result<Self, BrokerError> {
        info!(url_length = url.len(), "rabbitmq_connecting");

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(BrokerError::Connect)?;

        info!("rabbitmq_connected");

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close(200, "Channel open failed").await {
                    warn!(error = %close_err, "rabbitmq_connection_close_error");
                }
                return Err(BrokerError::Channel(e));
            }
        };

        info!("rabbitmq_channel_created");

        Ok(Self {
            connection,
            channel,
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Broker for AmqpConnection {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Declare {
                queue: queue.to_owned(),
                source: lapin::Error::InvalidChannelState(ChannelState::Closed),
            });
        }

        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Declare {
                queue: queue.to_owned(),
                source,
            })?;

        info!(queue = queue, "rabbitmq_queue_declared");
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Subscribe {
                queue: queue.to_owned(),
                source: lapin::Error::InvalidChannelState(ChannelState::Closed),
            });
        }

        // no_ack: the broker settles each delivery as soon as it is handed over
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Subscribe {
                queue: queue.to_owned(),
                source,
            })?;

        info!(queue = queue, "rabbitmq_consumer_started");

        let queue = queue.to_owned();
        let stream = consumer.filter_map(move |delivery| {
            let queue = queue.clone();
            async move {
                match delivery {
                    Ok(delivery) => Some(Delivery {
                        queue,
                        data: delivery.data,
                    }),
                    Err(e) => {
                        error!(queue = %queue, error = %e, "rabbitmq_delivery_error");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = self.channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }

        if let Err(e) = self.connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }

        info!("rabbitmq_connection_closed");
    }
}
